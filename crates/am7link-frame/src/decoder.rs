use bytes::{BufMut, BytesMut};
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::error::{FrameError, Result};
use crate::reading::SensorReading;
use crate::wire::{parse_frame, LONG_FRAME_LEN, MAX_FRAME_LEN, START_MARKER, TERMINATOR};

/// Counters describing what the decoder has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    /// Frames accepted.
    pub frames: u64,
    /// Bytes dropped while hunting for a start marker.
    pub noise_bytes: u64,
    /// Candidates discarded for exceeding the buffer bound.
    pub overflows: u64,
    /// Candidates without a start marker.
    pub malformed: u64,
    /// Candidates shorter than a short frame.
    pub too_short: u64,
    pub checksum_mismatches: u64,
    /// Frames reporting CO2 = 0.
    pub zero_co2: u64,
}

impl DecoderStats {
    /// Total candidates discarded for any reason.
    pub fn rejected(&self) -> u64 {
        self.overflows + self.malformed + self.too_short + self.checksum_mismatches + self.zero_co2
    }

    fn record(&mut self, err: &FrameError) {
        match err {
            FrameError::Malformed => self.malformed += 1,
            FrameError::TooShort { .. } => self.too_short += 1,
            FrameError::Overflow { .. } => self.overflows += 1,
            FrameError::ChecksumMismatch { .. } => self.checksum_mismatches += 1,
            FrameError::ZeroCo2 => self.zero_co2 += 1,
            FrameError::Io(_) => {}
        }
    }
}

/// Incremental frame decoder.
///
/// Bytes may arrive in any chunking; the decoder hunts for the start
/// marker, accumulates until `\r\n` and validates the candidate. Malformed
/// input only ever costs the current candidate. The accumulator is owned
/// here and never grows past the configured bound.
#[derive(Debug)]
pub struct FrameDecoder {
    acc: BytesMut,
    max_len: usize,
    stats: DecoderStats,
    verbose: bool,
}

impl FrameDecoder {
    /// Create a decoder with the default bound ([`MAX_FRAME_LEN`]).
    pub fn new() -> Self {
        Self::with_max_len(MAX_FRAME_LEN)
    }

    /// Create a decoder with an explicit bound.
    ///
    /// The bound is raised to fit at least one long frame and its terminator.
    pub fn with_max_len(max_len: usize) -> Self {
        let max_len = max_len.max(LONG_FRAME_LEN + TERMINATOR.len());
        Self {
            acc: BytesMut::with_capacity(max_len + 1),
            max_len,
            stats: DecoderStats::default(),
            verbose: false,
        }
    }

    /// Feed a chunk and collect every reading it completes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SensorReading> {
        let mut readings = Vec::new();
        self.feed_with(bytes, |reading| readings.push(reading));
        readings
    }

    /// Feed a chunk, passing each completed reading to `emit`.
    pub fn feed_with(&mut self, bytes: &[u8], mut emit: impl FnMut(SensorReading)) {
        for &byte in bytes {
            if let Some(Ok(reading)) = self.push(byte) {
                emit(reading);
            }
        }
    }

    /// Advance by one byte.
    ///
    /// Returns `Some` whenever a candidate ends: the reading, or why it was
    /// discarded.
    pub fn push(&mut self, byte: u8) -> Option<Result<SensorReading>> {
        if self.acc.is_empty() {
            if byte == START_MARKER {
                self.acc.put_u8(byte);
            } else {
                self.stats.noise_bytes += 1;
            }
            return None;
        }

        self.acc.put_u8(byte);

        if self.acc.ends_with(&TERMINATOR) {
            let body = &self.acc[..self.acc.len() - TERMINATOR.len()];
            if self.verbose {
                info!(len = body.len(), raw = %hex::encode(body), "frame candidate");
            }
            let result = parse_frame(body);
            self.acc.clear();
            self.observe(&result);
            return Some(result);
        }

        if self.acc.len() > self.max_len {
            let len = self.acc.len();
            self.acc.clear();
            let err = FrameError::Overflow {
                len,
                max: self.max_len,
            };
            self.stats.record(&err);
            debug!(error = %err, "frame candidate discarded");
            return Some(Err(err));
        }

        None
    }

    fn observe(&mut self, result: &Result<SensorReading>) {
        match result {
            Ok(reading) => {
                self.stats.frames += 1;
                if self.verbose {
                    info!(
                        pm25 = reading.pm25(),
                        pm10 = reading.pm10(),
                        hcho = reading.hcho(),
                        tvoc = reading.tvoc(),
                        co2 = reading.co2(),
                        temperature = reading.temperature(),
                        humidity = reading.humidity(),
                        long = reading.is_long_frame(),
                        "frame decoded"
                    );
                } else {
                    trace!(co2 = reading.co2(), "frame decoded");
                }
            }
            Err(err) => {
                self.stats.record(err);
                debug!(error = %err, "frame discarded");
            }
        }
    }

    /// Bytes currently held for an in-progress candidate.
    pub fn buffered(&self) -> usize {
        self.acc.len()
    }

    /// The accumulator bound.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Drop any in-progress candidate (e.g. when the transport closes).
    pub fn reset(&mut self) {
        if !self.acc.is_empty() {
            trace!(len = self.acc.len(), "dropping partial frame");
            self.acc.clear();
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Log raw candidates and decoded fields at `info`.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{ExtendedTelemetry, ParticleCounts, RawFrame};
    use crate::wire::{encode_frame, LONG_FRAME_LEN};

    fn raw(co2: u16) -> RawFrame {
        RawFrame {
            pm25: 8,
            pm10: 11,
            hcho: 20,
            tvoc: 110,
            co2,
            temperature: 2250,
            humidity: 4100,
            extended: Some(ExtendedTelemetry {
                battery_status: 0,
                battery_level: 2,
                runtime_hours: 77,
                particle_counts: ParticleCounts::from_array([500, 200, 60, 9, 2, 0]),
            }),
        }
    }

    fn wire(frame: &RawFrame) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(frame, &mut buf);
        buf.to_vec()
    }

    /// Deterministic xorshift noise with no start marker and no `\r`.
    fn noise(len: usize, mut seed: u32) -> Vec<u8> {
        (0..len)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                let b = (seed & 0xFF) as u8;
                if b == START_MARKER || b == b'\r' {
                    0x00
                } else {
                    b
                }
            })
            .collect()
    }

    #[test]
    fn single_frame_single_chunk() {
        let frame = raw(415);
        let mut decoder = FrameDecoder::new();
        let readings = decoder.feed(&wire(&frame));
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].raw(), &frame);
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.stats().frames, 1);
    }

    #[test]
    fn split_at_every_boundary_matches_single_chunk() {
        let frame = raw(415);
        let bytes = wire(&frame);
        let expected = FrameDecoder::new().feed(&bytes);

        for split in 1..bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut readings = decoder.feed(&bytes[..split]);
            readings.extend(decoder.feed(&bytes[split..]));
            assert_eq!(readings, expected, "split at {split}");
        }
    }

    #[test]
    fn byte_at_a_time() {
        let bytes = wire(&raw(600));
        let mut decoder = FrameDecoder::new();
        let mut readings = Vec::new();
        for b in &bytes {
            readings.extend(decoder.feed(std::slice::from_ref(b)));
        }
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].co2(), 600);
    }

    #[test]
    fn leading_noise_is_skipped() {
        let mut bytes = noise(200, 7);
        bytes.extend(wire(&raw(500)));
        let mut decoder = FrameDecoder::new();
        let readings = decoder.feed(&bytes);
        assert_eq!(readings.len(), 1);
        assert_eq!(decoder.stats().noise_bytes, 200);
    }

    #[test]
    fn noise_never_yields_and_stays_bounded() {
        let mut decoder = FrameDecoder::new();
        for seed in 1..50u32 {
            let mut chunk = noise(97, seed);
            // Sprinkle markers so candidates actually start.
            chunk[seed as usize % 97] = START_MARKER;
            chunk[(seed as usize * 7) % 97] = START_MARKER;
            assert!(decoder.feed(&chunk).is_empty());
            assert!(decoder.buffered() <= decoder.max_len());
        }
        assert_eq!(decoder.stats().frames, 0);
    }

    #[test]
    fn overflow_discards_and_recovers() {
        let mut decoder = FrameDecoder::new();
        let mut bytes = vec![START_MARKER];
        bytes.extend(std::iter::repeat(0x11).take(MAX_FRAME_LEN + 10));
        assert!(decoder.feed(&bytes).is_empty());
        assert_eq!(decoder.stats().overflows, 1);
        assert!(decoder.buffered() <= MAX_FRAME_LEN);

        let readings = decoder.feed(&wire(&raw(430)));
        assert_eq!(readings.len(), 1);
    }

    #[test]
    fn checksum_mismatch_is_dropped_then_recovers() {
        let mut bad = wire(&raw(415));
        bad[5] ^= 0x40;
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&bad).is_empty());
        assert_eq!(decoder.stats().checksum_mismatches, 1);

        assert_eq!(decoder.feed(&wire(&raw(415))).len(), 1);
    }

    #[test]
    fn zero_co2_is_dropped() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&wire(&raw(0))).is_empty());
        assert_eq!(decoder.stats().zero_co2, 1);
    }

    #[test]
    fn terminator_too_early_is_too_short() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&[START_MARKER, 0x00, 0x01, b'\r', b'\n']).is_empty());
        assert_eq!(decoder.stats().too_short, 1);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn short_frame_accepted_without_checksum() {
        let frame = RawFrame {
            extended: None,
            ..raw(480)
        };
        let readings = FrameDecoder::new().feed(&wire(&frame));
        assert_eq!(readings.len(), 1);
        assert!(!readings[0].is_long_frame());
    }

    #[test]
    fn back_to_back_frames() {
        let mut bytes = wire(&raw(401));
        bytes.extend(noise(5, 3));
        bytes.extend(wire(&raw(402)));
        bytes.extend(wire(&raw(403)));
        let co2: Vec<u16> = FrameDecoder::new()
            .feed(&bytes)
            .iter()
            .map(|r| r.co2())
            .collect();
        assert_eq!(co2, vec![401, 402, 403]);
    }

    #[test]
    fn push_reports_rejection_reason() {
        let mut decoder = FrameDecoder::new();
        let bytes = wire(&raw(0));
        let mut outcome = None;
        for &b in &bytes {
            if let Some(result) = decoder.push(b) {
                outcome = Some(result);
            }
        }
        assert!(matches!(outcome, Some(Err(FrameError::ZeroCo2))));
    }

    #[test]
    fn bound_is_at_least_one_long_frame() {
        let decoder = FrameDecoder::with_max_len(4);
        assert_eq!(decoder.max_len(), LONG_FRAME_LEN + 2);
    }

    #[test]
    fn reset_drops_partial_candidate() {
        let bytes = wire(&raw(415));
        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes[..10]);
        assert_eq!(decoder.buffered(), 10);
        decoder.reset();
        assert_eq!(decoder.buffered(), 0);
        assert!(decoder.feed(&bytes[10..]).is_empty());
    }

    #[test]
    fn verbose_does_not_change_results() {
        let bytes = wire(&raw(415));
        let mut quiet = FrameDecoder::new();
        let mut loud = FrameDecoder::new();
        loud.set_verbose(true);
        assert!(loud.is_verbose());
        assert_eq!(quiet.feed(&bytes), loud.feed(&bytes));
    }
}
