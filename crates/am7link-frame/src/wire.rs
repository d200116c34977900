use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::reading::{ExtendedTelemetry, ParticleCounts, RawFrame, SensorReading};

/// First byte of every frame.
pub const START_MARKER: u8 = 0xAA;

/// Frame terminator: carriage return, line feed.
pub const TERMINATOR: [u8; 2] = *b"\r\n";

/// Marker plus seven big-endian `u16` fields.
pub const SHORT_FRAME_LEN: usize = 15;

/// Marker, fields, extended region and checksum.
pub const LONG_FRAME_LEN: usize = 38;

/// Offset of the big-endian checksum in a long frame; it covers every byte before it.
pub const CHECKSUM_OFFSET: usize = 36;

/// Upper bound on buffered bytes (terminator included) before a candidate is discarded.
pub const MAX_FRAME_LEN: usize = 64;

/// The sensor's "send one reading" request.
pub const REQUEST_COMMAND: [u8; 13] = [
    0x55, 0xCD, 0x47, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x69, 0x0D, 0x0A,
];

const EXTENDED_OFFSET: usize = SHORT_FRAME_LEN;
const RESERVED_LEN: usize = CHECKSUM_OFFSET - (EXTENDED_OFFSET + 4 + 12);

/// 16-bit wrapping sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)))
}

/// Encode a frame into the wire format, terminator included.
///
/// Wire format (offsets within the frame):
/// ```text
/// ┌────┬──────┬──────┬──────┬──────┬─────┬──────┬──────┬──────────────────┬──────────┬──────┐
/// │ 0  │ 1-2  │ 3-4  │ 5-6  │ 7-8  │ 9-10│ 11-12│ 13-14│ 15-35 (long only)│ 36-37    │ CRLF │
/// │0xAA│ PM2.5│ PM10 │ HCHO │ TVOC │ CO2 │ Temp │ Hum  │ extended region  │ checksum │      │
/// └────┴──────┴──────┴──────┴──────┴─────┴──────┴──────┴──────────────────┴──────────┴──────┘
/// ```
/// Extended region: battery status (1B), battery level (1B), runtime hours
/// (2B), six particle bins (2B each), five reserved zero bytes. All
/// multi-byte values are big-endian. Frames without `extended` are written
/// in the short layout, which carries no checksum.
pub fn encode_frame(frame: &RawFrame, dst: &mut BytesMut) {
    let start = dst.len();
    dst.reserve(LONG_FRAME_LEN + TERMINATOR.len());

    dst.put_u8(START_MARKER);
    dst.put_u16(frame.pm25);
    dst.put_u16(frame.pm10);
    dst.put_u16(frame.hcho);
    dst.put_u16(frame.tvoc);
    dst.put_u16(frame.co2);
    dst.put_i16(frame.temperature);
    dst.put_u16(frame.humidity);

    if let Some(ext) = &frame.extended {
        dst.put_u8(ext.battery_status);
        dst.put_u8(ext.battery_level);
        dst.put_u16(ext.runtime_hours);
        for bin in ext.particle_counts.to_array() {
            dst.put_u16(bin);
        }
        dst.put_bytes(0, RESERVED_LEN);
        let sum = checksum(&dst[start..]);
        dst.put_u16(sum);
    }

    dst.put_slice(&TERMINATOR);
}

/// Validate and parse one frame with its terminator already removed.
pub fn parse_frame(frame: &[u8]) -> Result<SensorReading> {
    if frame.first() != Some(&START_MARKER) {
        return Err(FrameError::Malformed);
    }
    if frame.len() < SHORT_FRAME_LEN {
        return Err(FrameError::TooShort {
            len: frame.len(),
            min: SHORT_FRAME_LEN,
        });
    }

    let extended = if frame.len() >= LONG_FRAME_LEN {
        let expected = u16::from_be_bytes([frame[CHECKSUM_OFFSET], frame[CHECKSUM_OFFSET + 1]]);
        let actual = checksum(&frame[..CHECKSUM_OFFSET]);
        if expected != actual {
            return Err(FrameError::ChecksumMismatch { expected, actual });
        }
        Some(parse_extended(&frame[EXTENDED_OFFSET..CHECKSUM_OFFSET]))
    } else {
        None
    };

    let mut fields = &frame[1..SHORT_FRAME_LEN];
    let raw = RawFrame {
        pm25: fields.get_u16(),
        pm10: fields.get_u16(),
        hcho: fields.get_u16(),
        tvoc: fields.get_u16(),
        co2: fields.get_u16(),
        temperature: fields.get_i16(),
        humidity: fields.get_u16(),
        extended,
    };

    if raw.co2 == 0 {
        return Err(FrameError::ZeroCo2);
    }

    Ok(SensorReading::from_validated(raw))
}

fn parse_extended(mut region: &[u8]) -> ExtendedTelemetry {
    let battery_status = region.get_u8();
    let battery_level = region.get_u8();
    let runtime_hours = region.get_u16();
    let mut bins = [0u16; 6];
    for bin in &mut bins {
        *bin = region.get_u16();
    }
    ExtendedTelemetry {
        battery_status,
        battery_level,
        runtime_hours,
        particle_counts: ParticleCounts::from_array(bins),
    }
}
