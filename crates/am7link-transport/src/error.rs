use std::time::Duration;

use crate::traits::UsbId;

/// Errors that can occur in USB-serial transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No attached device matches the configured identifier.
    #[error("no device matching {id} is attached")]
    NotFound { id: UsbId },

    /// The bridge rejected a request it does not implement (USB stall).
    #[error("request not supported by the bridge: {0}")]
    Unsupported(&'static str),

    /// Line configuration failed on both the standard and vendor paths.
    #[error("line configuration failed: {0}")]
    ConfigFailed(String),

    /// A bounded transport call did not complete in time.
    #[error("transport call timed out after {0:?}")]
    Timeout(Duration),

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device was unplugged or stopped responding.
    #[error("device detached")]
    Detached,

    /// An operation required an open device but none is held.
    #[error("no device is open")]
    NotOpen,

    /// The platform backend reported an error it could not classify.
    #[error("backend error: {0}")]
    Backend(String),
}

impl TransportError {
    /// Whether this error means the device handle is no longer usable.
    ///
    /// Discovery and configuration errors are retried in place; everything
    /// else forces the session back to a closed state.
    pub fn is_link_loss(&self) -> bool {
        matches!(
            self,
            TransportError::Io(_)
                | TransportError::Detached
                | TransportError::NotOpen
                | TransportError::Timeout(_)
                | TransportError::Backend(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
