//! The AM7 sensor link engine.
//!
//! [`SensorLink`] runs a one-second scheduler on a worker thread. Each tick
//! moves the link through discovery and configuration, sends read requests
//! while polling and ages the last reading. Bytes from the transport are
//! decoded under the same lock that guards the reading, so consumers holding
//! a [`ReadingHandle`] always see a whole reading together with its
//! freshness.
//!
//! ```no_run
//! use am7link_poll::{LinkConfig, SensorLink};
//! use am7link_transport::mock::MockHost;
//! use am7link_transport::UsbId;
//!
//! let link = SensorLink::start(MockHost::new(UsbId::CP2102), LinkConfig::default())?;
//! let (reading, connected, age) = link.handle().get_current_reading();
//! # let _ = (reading, connected, age);
//! # Ok::<(), am7link_poll::LinkError>(())
//! ```

pub mod config;
pub mod error;
pub mod link;
mod scheduler;
pub mod state;
pub mod store;

pub use config::LinkConfig;
pub use error::{LinkError, Result};
pub use link::SensorLink;
pub use state::LinkState;
pub use store::{LinkSnapshot, ReadingHandle};
