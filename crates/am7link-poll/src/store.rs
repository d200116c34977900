//! The state shared between the scheduler and the reception context.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use am7link_frame::{DecoderStats, FrameDecoder, SensorReading};
use am7link_transport::RxHandler;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::state::LinkState;

/// Everything guarded by the link's single lock.
#[derive(Debug)]
pub(crate) struct LinkInner {
    pub(crate) decoder: FrameDecoder,
    pub(crate) reading: Option<SensorReading>,
    pub(crate) connected: bool,
    pub(crate) seconds_since_last_frame: u32,
    pub(crate) state: LinkState,
    /// Set by the reception context when the device goes away; the scheduler
    /// closes the session on its next tick.
    pub(crate) detach_pending: bool,
}

impl LinkInner {
    fn new(verbose: bool) -> Self {
        let mut decoder = FrameDecoder::new();
        decoder.set_verbose(verbose);
        Self {
            decoder,
            reading: None,
            connected: false,
            seconds_since_last_frame: 0,
            state: LinkState::Idle,
            detach_pending: false,
        }
    }

    /// Record an accepted frame.
    fn accept(&mut self, reading: SensorReading) {
        self.reading = Some(reading);
        self.seconds_since_last_frame = 0;
        if !self.connected {
            info!(co2 = reading.co2(), "sensor data flowing");
        }
        self.connected = true;
        if self.state == LinkState::Stale {
            info!("link fresh again");
            self.state = LinkState::Polling;
        }
    }

    /// Forget the transport: back to `Idle`, partial frame dropped.
    pub(crate) fn drop_link(&mut self) {
        self.decoder.reset();
        self.connected = false;
        self.state = LinkState::Idle;
    }
}

/// Shared link state. Implements [`RxHandler`] so the transport can deliver
/// bytes straight into the decoder.
#[derive(Debug)]
pub(crate) struct LinkShared {
    inner: Mutex<LinkInner>,
}

impl LinkShared {
    pub(crate) fn new(verbose: bool) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(LinkInner::new(verbose)),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, LinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RxHandler for LinkShared {
    fn on_bytes(&self, bytes: &[u8]) {
        let mut inner = self.lock();
        let readings = inner.decoder.feed(bytes);
        // Only the newest reading matters; earlier ones in the same chunk are superseded.
        if let Some(reading) = readings.last() {
            inner.accept(*reading);
        }
    }

    fn on_detached(&self) {
        let mut inner = self.lock();
        warn!(state = %inner.state, "sensor detached");
        inner.drop_link();
        inner.detach_pending = true;
    }
}

/// Everything a status consumer might want, read under one lock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkSnapshot {
    /// Last accepted reading, if any frame has ever been accepted.
    pub reading: Option<SensorReading>,
    pub connected: bool,
    pub seconds_since_last_frame: u32,
    pub state: LinkState,
    pub stats: DecoderStats,
}

/// Read-only view of the link for consumers (status pages, publishers).
///
/// Cloning is cheap; every clone observes the same link.
#[derive(Debug, Clone)]
pub struct ReadingHandle {
    shared: Arc<LinkShared>,
}

impl ReadingHandle {
    pub(crate) fn new(shared: Arc<LinkShared>) -> Self {
        Self { shared }
    }

    /// The latest reading, whether the link is live, and its age in seconds.
    ///
    /// All three values come from the same instant; a reading is never
    /// observed half-updated.
    pub fn get_current_reading(&self) -> (Option<SensorReading>, bool, u32) {
        let inner = self.shared.lock();
        (
            inner.reading,
            inner.connected,
            inner.seconds_since_last_frame,
        )
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        let inner = self.shared.lock();
        LinkSnapshot {
            reading: inner.reading,
            connected: inner.connected,
            seconds_since_last_frame: inner.seconds_since_last_frame,
            state: inner.state,
            stats: inner.decoder.stats(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.shared.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    pub(crate) fn set_verbose(&self, verbose: bool) {
        let mut inner = self.shared.lock();
        if inner.decoder.is_verbose() != verbose {
            debug!(verbose, "frame diagnostics toggled");
        }
        inner.decoder.set_verbose(verbose);
    }
}
