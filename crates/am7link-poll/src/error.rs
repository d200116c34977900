/// Errors surfaced by the link engine and its callers.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] am7link_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] am7link_frame::FrameError),

    /// The worker thread could not be started.
    #[error("failed to spawn link worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The worker thread panicked.
    #[error("link worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, LinkError>;
