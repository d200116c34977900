//! Binary frame handling for the AM7 air-quality sensor.
//!
//! The sensor answers each read request with a frame:
//! - a start marker (`0xAA`)
//! - seven big-endian measurement fields
//! - on newer firmware, an extended region and a 16-bit checksum
//! - a `\r\n` terminator
//!
//! [`FrameDecoder`] turns an arbitrarily chunked byte stream into validated
//! [`SensorReading`]s, discarding noise and corrupt candidates without ever
//! buffering more than a bounded number of bytes.

pub mod decoder;
pub mod error;
pub mod reading;
pub mod wire;

#[cfg(feature = "async")]
pub mod codec;

pub use decoder::{DecoderStats, FrameDecoder};
pub use error::{FrameError, Result};
pub use reading::{ExtendedTelemetry, ParticleCounts, RawFrame, SensorReading};
pub use wire::{
    checksum, encode_frame, parse_frame, LONG_FRAME_LEN, MAX_FRAME_LEN, REQUEST_COMMAND,
    SHORT_FRAME_LEN, START_MARKER, TERMINATOR,
};

#[cfg(feature = "async")]
pub use codec::{Am7Codec, ReadRequest};
