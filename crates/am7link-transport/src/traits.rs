use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// USB vendor/product identifier pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl UsbId {
    /// Silicon Labs CP2102, the bridge fitted to the AM7.
    pub const CP2102: UsbId = UsbId::new(0x10C4, 0xEA60);

    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

impl fmt::Display for UsbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vid, self.pid)
    }
}

/// Parity setting of a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Stop-bit setting of a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Serial line parameters (CDC `SET_LINE_CODING` semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCoding {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl LineCoding {
    /// Encode as the 7-byte CDC line coding structure.
    ///
    /// ```text
    /// ┌──────────────────┬─────────────┬────────────┬───────────┐
    /// │ dwDTERate (4B LE)│ bCharFormat │ bParityType│ bDataBits │
    /// └──────────────────┴─────────────┴────────────┴───────────┘
    /// ```
    pub fn to_cdc_bytes(&self) -> [u8; 7] {
        let rate = self.baud_rate.to_le_bytes();
        let char_format = match self.stop_bits {
            StopBits::One => 0,
            StopBits::Two => 2,
        };
        let parity = match self.parity {
            Parity::None => 0,
            Parity::Odd => 1,
            Parity::Even => 2,
        };
        [
            rate[0],
            rate[1],
            rate[2],
            rate[3],
            char_format,
            parity,
            self.data_bits,
        ]
    }
}

impl Default for LineCoding {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Modem control line levels driven by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlLines {
    pub dtr: bool,
    pub rts: bool,
}

impl ControlLines {
    pub const HIGH: ControlLines = ControlLines {
        dtr: true,
        rts: true,
    };
    pub const LOW: ControlLines = ControlLines {
        dtr: false,
        rts: false,
    };
}

/// A vendor-class, interface-recipient OUT control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorRequest {
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

/// Receives bytes and link events from the transport's reception context.
///
/// Implementations run concurrently with the polling worker and must do
/// their own locking.
pub trait RxHandler: Send + Sync + 'static {
    /// Bytes arrived from the device, in arbitrary-sized chunks.
    fn on_bytes(&self, bytes: &[u8]);

    /// The device went away. No further callbacks follow.
    fn on_detached(&self);
}

/// An opened USB-serial bridge.
///
/// Every call is bounded by the timeout it is given.
pub trait UsbSerialDevice: Send {
    /// Issue the standard line coding request.
    ///
    /// Returns `TransportError::Unsupported` when the bridge stalls it.
    fn set_line_coding(&mut self, coding: &LineCoding, timeout: Duration) -> Result<()>;

    /// Drive DTR/RTS with the standard control line request.
    fn set_control_lines(&mut self, lines: ControlLines, timeout: Duration) -> Result<()>;

    /// Issue a vendor-specific control transfer.
    fn vendor_control(
        &mut self,
        request: VendorRequest,
        data: &[u8],
        timeout: Duration,
    ) -> Result<()>;

    /// Write bytes to the bulk OUT endpoint.
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<()>;

    /// Start delivering received bytes to `handler`.
    fn start_receiving(&mut self, handler: Arc<dyn RxHandler>) -> Result<()>;

    /// Whether the device is still attached.
    fn is_attached(&self) -> bool;
}

/// The platform's USB host capability.
///
/// A host is created once and reused for every discovery attempt.
pub trait UsbHost: Send {
    type Device: UsbSerialDevice;

    /// Find and open the first attached device matching `id`.
    ///
    /// Returns `TransportError::NotFound` when nothing matches.
    fn open(&mut self, id: UsbId, timeout: Duration) -> Result<Self::Device>;
}
