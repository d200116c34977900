/// Reasons a candidate frame is discarded.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame does not begin with the start marker.
    #[error("frame does not begin with start marker 0xAA")]
    Malformed,

    /// The frame is shorter than the short (checksum-less) layout.
    #[error("frame too short ({len} bytes, min {min})")]
    TooShort { len: usize, min: usize },

    /// No terminator arrived before the accumulator bound.
    #[error("no terminator within {max} bytes ({len} buffered)")]
    Overflow { len: usize, max: usize },

    /// The stored checksum does not match the computed sum.
    #[error("checksum mismatch (frame 0x{expected:04x}, computed 0x{actual:04x})")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// CO2 reads zero, which the sensor emits while warming up.
    #[error("CO2 is zero (sensor not ready)")]
    ZeroCo2,

    /// An I/O error occurred on a framed stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
