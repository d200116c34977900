//! USB-serial link engine for the AM7 air-quality sensor.
//!
//! am7link discovers the sensor's USB-serial bridge, configures the line,
//! polls for readings, decodes the sensor's binary frames out of the raw
//! byte stream and tracks whether data is still fresh.
//!
//! # Crate Structure
//!
//! - [`transport`]: USB identifiers, line configuration, host backends
//! - [`frame`]: wire format, checksum and the incremental frame decoder
//! - [`poll`]: the link state machine and the shared reading store
//! - [`telemetry`]: state, status and Home Assistant discovery documents
//! - [`simulator`]: a simulated sensor on the mock host

pub mod simulator;
pub mod telemetry;

/// Re-export transport types.
pub mod transport {
    pub use am7link_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use am7link_frame::*;
}

/// Re-export link engine types.
pub mod poll {
    pub use am7link_poll::*;
}

pub use am7link_frame::SensorReading;
pub use am7link_poll::{LinkConfig, LinkError, LinkSnapshot, LinkState, ReadingHandle, SensorLink};
