//! In-memory USB host for tests and the simulated sensor.
//!
//! A [`MockHost`] and every [`MockDevice`] it opens share one state block, so
//! a test can keep a clone of the host and plug, unplug, inject bytes and
//! inspect the recorded requests after the device has been moved into a
//! session.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{
    ControlLines, LineCoding, RxHandler, UsbHost, UsbId, UsbSerialDevice, VendorRequest,
};

/// Requests kept in the event log; older ones are discarded first.
pub const EVENT_LOG_CAPACITY: usize = 1024;

/// Produces the device's answer to bytes written by the host.
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// A request observed by a mock device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    LineCoding(LineCoding),
    ControlLines(ControlLines),
    Vendor {
        request: VendorRequest,
        data: Vec<u8>,
    },
    Write(Vec<u8>),
}

struct MockState {
    id: UsbId,
    present: bool,
    attached: bool,
    standard_supported: bool,
    vendor_supported: bool,
    fail_writes: bool,
    open_attempts: usize,
    opens: usize,
    events: VecDeque<MockEvent>,
    handler: Option<Arc<dyn RxHandler>>,
    responder: Option<Responder>,
}

impl MockState {
    fn new(id: UsbId) -> Self {
        Self {
            id,
            present: false,
            attached: false,
            standard_supported: true,
            vendor_supported: true,
            fail_writes: false,
            open_attempts: 0,
            opens: 0,
            events: VecDeque::with_capacity(64),
            handler: None,
            responder: None,
        }
    }

    fn record(&mut self, event: MockEvent) {
        if self.events.len() == EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

#[derive(Clone)]
struct Shared(Arc<Mutex<MockState>>);

impl Shared {
    fn new(id: UsbId) -> Self {
        Self(Arc::new(Mutex::new(MockState::new(id))))
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scriptable USB host exposing at most one device.
#[derive(Clone)]
pub struct MockHost {
    shared: Shared,
}

impl MockHost {
    /// A host whose single device carries `id`. The device starts unplugged.
    pub fn new(id: UsbId) -> Self {
        Self {
            shared: Shared::new(id),
        }
    }

    /// Plug the device in (or unplug it without a detach notification).
    pub fn set_present(&self, present: bool) {
        self.shared.lock().present = present;
    }

    /// Whether the bridge accepts the standard CDC requests.
    pub fn set_standard_supported(&self, supported: bool) {
        self.shared.lock().standard_supported = supported;
    }

    /// Whether the bridge accepts CP210x vendor requests.
    pub fn set_vendor_supported(&self, supported: bool) {
        self.shared.lock().vendor_supported = supported;
    }

    /// Make every subsequent write fail with a broken pipe.
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.lock().fail_writes = fail;
    }

    /// Install the device-side answer to host writes.
    pub fn set_responder(&self, responder: Responder) {
        self.shared.lock().responder = Some(responder);
    }

    /// Deliver bytes to the registered receiver, as the bridge would.
    ///
    /// Returns false when nothing is receiving.
    pub fn inject(&self, bytes: &[u8]) -> bool {
        let handler = {
            let state = self.shared.lock();
            if !state.attached {
                return false;
            }
            state.handler.clone()
        };
        match handler {
            Some(handler) => {
                handler.on_bytes(bytes);
                true
            }
            None => false,
        }
    }

    /// Unplug the device and notify the receiver.
    pub fn detach(&self) {
        let handler = {
            let mut state = self.shared.lock();
            state.present = false;
            state.attached = false;
            state.handler.take()
        };
        if let Some(handler) = handler {
            handler.on_detached();
        }
    }

    /// Number of `open` calls, successful or not.
    pub fn open_attempts(&self) -> usize {
        self.shared.lock().open_attempts
    }

    /// Number of successful opens.
    pub fn opens(&self) -> usize {
        self.shared.lock().opens
    }

    /// Whether a receiver is currently registered.
    pub fn is_receiving(&self) -> bool {
        self.shared.lock().handler.is_some()
    }

    /// The most recent requests, oldest first, up to [`EVENT_LOG_CAPACITY`].
    pub fn events(&self) -> Vec<MockEvent> {
        self.shared.lock().events.iter().cloned().collect()
    }

    /// Payloads of the writes still in the event log.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MockEvent::Write(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }
}

impl UsbHost for MockHost {
    type Device = MockDevice;

    fn open(&mut self, id: UsbId, _timeout: Duration) -> Result<MockDevice> {
        let mut state = self.shared.lock();
        state.open_attempts += 1;
        if !state.present || state.id != id {
            return Err(TransportError::NotFound { id });
        }
        state.opens += 1;
        state.attached = true;
        Ok(MockDevice {
            shared: self.shared.clone(),
        })
    }
}

/// Device handle returned by [`MockHost::open`].
pub struct MockDevice {
    shared: Shared,
}

impl MockDevice {
    /// An attached device not owned by any host.
    pub fn standalone() -> Self {
        let shared = Shared::new(UsbId::CP2102);
        {
            let mut state = shared.lock();
            state.present = true;
            state.attached = true;
        }
        Self { shared }
    }

    /// The most recent requests, oldest first.
    pub fn events(&self) -> Vec<MockEvent> {
        self.shared.lock().events.iter().cloned().collect()
    }

    fn checked(&self) -> Result<MutexGuard<'_, MockState>> {
        let state = self.shared.lock();
        if state.attached {
            Ok(state)
        } else {
            Err(TransportError::Detached)
        }
    }
}

impl UsbSerialDevice for MockDevice {
    fn set_line_coding(&mut self, coding: &LineCoding, _timeout: Duration) -> Result<()> {
        let mut state = self.checked()?;
        if !state.standard_supported {
            return Err(TransportError::Unsupported("SET_LINE_CODING"));
        }
        state.record(MockEvent::LineCoding(*coding));
        Ok(())
    }

    fn set_control_lines(&mut self, lines: ControlLines, _timeout: Duration) -> Result<()> {
        let mut state = self.checked()?;
        if !state.standard_supported {
            return Err(TransportError::Unsupported("SET_CONTROL_LINE_STATE"));
        }
        state.record(MockEvent::ControlLines(lines));
        Ok(())
    }

    fn vendor_control(
        &mut self,
        request: VendorRequest,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<()> {
        let mut state = self.checked()?;
        if !state.vendor_supported {
            return Err(TransportError::Unsupported("vendor request"));
        }
        state.record(MockEvent::Vendor {
            request,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn write(&mut self, bytes: &[u8], _timeout: Duration) -> Result<()> {
        let (reply, handler) = {
            let mut state = self.checked()?;
            if state.fail_writes {
                return Err(TransportError::Io(std::io::Error::from(
                    std::io::ErrorKind::BrokenPipe,
                )));
            }
            state.record(MockEvent::Write(bytes.to_vec()));
            let reply = state.responder.as_mut().and_then(|respond| respond(bytes));
            (reply, state.handler.clone())
        };

        if let (Some(reply), Some(handler)) = (reply, handler) {
            trace!(len = reply.len(), "mock device replying");
            handler.on_bytes(&reply);
        }
        Ok(())
    }

    fn start_receiving(&mut self, handler: Arc<dyn RxHandler>) -> Result<()> {
        let mut state = self.checked()?;
        state.handler = Some(handler);
        Ok(())
    }

    fn is_attached(&self) -> bool {
        self.shared.lock().attached
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.attached = false;
        state.handler = None;
    }
}
