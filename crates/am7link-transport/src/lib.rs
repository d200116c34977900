//! USB-serial transport for the AM7 air-quality sensor.
//!
//! Discovers the sensor's bridge by vendor/product identifier, configures
//! the serial line (standard CDC requests with a CP210x vendor fallback),
//! writes requests with bounded timeouts and hands received bytes to an
//! [`RxHandler`].
//!
//! This is the lowest layer of am7link. The platform's USB capability is the
//! [`UsbHost`] seam; [`mock::MockHost`] and (with the `serial` feature)
//! [`serial::SerialPortHost`] implement it.

pub mod cp210x;
pub mod error;
pub mod mock;
pub mod session;
pub mod traits;

#[cfg(feature = "serial")]
pub mod serial;

pub use error::{Result, TransportError};
pub use session::{ConfigureOutcome, TransportConfig, TransportSession};
pub use traits::{
    ControlLines, LineCoding, Parity, RxHandler, StopBits, UsbHost, UsbId, UsbSerialDevice,
    VendorRequest,
};

#[cfg(feature = "serial")]
pub use serial::SerialPortHost;
