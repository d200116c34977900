use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cp210x;
use crate::error::{Result, TransportError};
use crate::traits::{ControlLines, LineCoding, RxHandler, UsbHost, UsbId, UsbSerialDevice};

/// Configuration for a transport session.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Identifier the sensor's bridge enumerates with.
    pub device_id: UsbId,
    /// Interface number addressed by vendor requests.
    pub interface: u16,
    /// Line parameters applied during configuration.
    pub line_coding: LineCoding,
    /// Upper bound for opening the device.
    pub open_timeout: Duration,
    /// Upper bound for each control transfer.
    pub control_timeout: Duration,
    /// Upper bound for each write.
    pub write_timeout: Duration,
    /// Pause between dropping and raising the modem lines in the vendor path.
    pub settle_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            device_id: UsbId::CP2102,
            interface: 0,
            line_coding: LineCoding::default(),
            open_timeout: Duration::from_secs(2),
            control_timeout: Duration::from_millis(500),
            write_timeout: Duration::from_secs(1),
            settle_delay: cp210x::LINE_SETTLE_DELAY,
        }
    }
}

/// Which configuration path the bridge accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureOutcome {
    /// Standard line coding and control line requests.
    Standard,
    /// CP210x vendor request sequence.
    VendorFallback,
}

/// Owns the host capability and, while connected, the open device.
///
/// The host is created once; discovery only ever opens a device when none
/// is held, so retries never leak handles.
pub struct TransportSession<H: UsbHost> {
    host: H,
    config: TransportConfig,
    device: Option<H::Device>,
}

impl<H: UsbHost> TransportSession<H> {
    pub fn new(host: H, config: TransportConfig) -> Self {
        Self {
            host,
            config,
            device: None,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Whether a device handle is currently held.
    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Whether the held device still reports itself attached.
    pub fn is_attached(&self) -> bool {
        self.device.as_ref().is_some_and(|d| d.is_attached())
    }

    /// Find and open the sensor's bridge.
    pub fn discover(&mut self) -> Result<()> {
        if self.device.is_some() {
            return Ok(());
        }
        let id = self.config.device_id;
        let device = self.host.open(id, self.config.open_timeout)?;
        info!(%id, "sensor bridge opened");
        self.device = Some(device);
        Ok(())
    }

    /// Apply line settings, falling back to the vendor sequence when the
    /// standard requests are unsupported.
    pub fn configure(&mut self) -> Result<ConfigureOutcome> {
        let config = &self.config;
        let device = self.device.as_mut().ok_or(TransportError::NotOpen)?;

        match configure_standard(device, config) {
            Ok(()) => {
                debug!(baud = config.line_coding.baud_rate, "standard line coding applied");
                Ok(ConfigureOutcome::Standard)
            }
            Err(TransportError::Unsupported(what)) => {
                debug!(request = what, "standard request rejected, using vendor sequence");
                cp210x::configure(
                    device,
                    config.interface,
                    &config.line_coding,
                    config.control_timeout,
                    config.settle_delay,
                )
                .map(|()| ConfigureOutcome::VendorFallback)
                .map_err(|err| {
                    if err.is_link_loss() {
                        err
                    } else {
                        TransportError::ConfigFailed(err.to_string())
                    }
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Route received bytes and detach events to `handler`.
    pub fn start_receiving(&mut self, handler: Arc<dyn RxHandler>) -> Result<()> {
        let device = self.device.as_mut().ok_or(TransportError::NotOpen)?;
        device.start_receiving(handler)
    }

    /// Write `bytes` within the configured write timeout.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let timeout = self.config.write_timeout;
        let device = self.device.as_mut().ok_or(TransportError::NotOpen)?;
        device.write(bytes, timeout)?;
        debug!(len = bytes.len(), bytes = %hex::encode(bytes), "request sent");
        Ok(())
    }

    /// Drop the device handle. Returns whether one was held.
    pub fn close(&mut self) -> bool {
        match self.device.take() {
            Some(_) => {
                warn!(id = %self.config.device_id, "sensor bridge closed");
                true
            }
            None => false,
        }
    }

    /// Borrow the host capability.
    pub fn host(&self) -> &H {
        &self.host
    }
}

fn configure_standard<D: UsbSerialDevice>(device: &mut D, config: &TransportConfig) -> Result<()> {
    device.set_line_coding(&config.line_coding, config.control_timeout)?;
    device.set_control_lines(ControlLines::HIGH, config.control_timeout)
}
