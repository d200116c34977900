use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};

use am7link_transport::UsbHost;
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::scheduler::Scheduler;
use crate::state::LinkState;
use crate::store::{LinkShared, LinkSnapshot, ReadingHandle};

/// A running sensor link: the scheduler on its own worker thread plus the
/// shared reading store.
///
/// Dropping the link stops the worker and closes the device.
pub struct SensorLink {
    handle: ReadingHandle,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SensorLink {
    /// Spawn the worker and start discovering the sensor.
    pub fn start<H>(host: H, config: LinkConfig) -> Result<Self>
    where
        H: UsbHost + 'static,
    {
        let shared = LinkShared::new(config.verbose);
        let handle = ReadingHandle::new(shared.clone());
        let mut scheduler = Scheduler::new(host, &config, shared);
        let period = config.tick;
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let worker = thread::Builder::new()
            .name("am7-link".into())
            .spawn(move || {
                info!(id = %scheduler.session().config().device_id, "sensor link started");
                let mut last = LinkState::Idle;
                loop {
                    let state = scheduler.tick();
                    if state != last {
                        debug!(from = %last, to = %state, "link state changed");
                        last = state;
                    }
                    match shutdown_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                scheduler.shutdown();
                info!("sensor link stopped");
            })
            .map_err(LinkError::Spawn)?;

        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        })
    }

    /// A read-only handle for consumers.
    pub fn handle(&self) -> ReadingHandle {
        self.handle.clone()
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        self.handle.snapshot()
    }

    /// Toggle verbose frame diagnostics at runtime.
    pub fn set_verbose(&self, verbose: bool) {
        self.handle.set_verbose(verbose);
    }

    /// Stop the worker and wait for it to close the device.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| LinkError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for SensorLink {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
