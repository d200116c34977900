//! `tokio-util` codec for reading the sensor over async byte streams.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::decoder::{DecoderStats, FrameDecoder};
use crate::error::FrameError;
use crate::reading::{RawFrame, SensorReading};
use crate::wire::{encode_frame, REQUEST_COMMAND};

/// Marker item for the sensor's read request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadRequest;

/// Decodes [`SensorReading`]s and encodes [`ReadRequest`]s.
///
/// Rejected candidates are counted in [`Am7Codec::stats`] and skipped; they
/// never end the stream. Encoding a [`RawFrame`] is also supported, which is
/// what a simulated sensor writes.
#[derive(Debug, Default)]
pub struct Am7Codec {
    decoder: FrameDecoder,
}

impl Am7Codec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            decoder: FrameDecoder::with_max_len(max_len),
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }
}

impl Decoder for Am7Codec {
    type Item = SensorReading;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<SensorReading>, FrameError> {
        while src.has_remaining() {
            if let Some(Ok(reading)) = self.decoder.push(src.get_u8()) {
                return Ok(Some(reading));
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<SensorReading>, FrameError> {
        let reading = self.decode(src)?;
        if reading.is_none() {
            self.decoder.reset();
        }
        Ok(reading)
    }
}

impl Encoder<ReadRequest> for Am7Codec {
    type Error = FrameError;

    fn encode(&mut self, _item: ReadRequest, dst: &mut BytesMut) -> Result<(), FrameError> {
        dst.put_slice(&REQUEST_COMMAND);
        Ok(())
    }
}

impl Encoder<RawFrame> for Am7Codec {
    type Error = FrameError;

    fn encode(&mut self, item: RawFrame, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_frame(&item, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{ExtendedTelemetry, ParticleCounts};
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    fn frame(co2: u16) -> RawFrame {
        RawFrame {
            pm25: 5,
            pm10: 9,
            hcho: 12,
            tvoc: 80,
            co2,
            temperature: -120,
            humidity: 5230,
            extended: Some(ExtendedTelemetry {
                battery_status: 1,
                battery_level: 4,
                runtime_hours: 3,
                particle_counts: ParticleCounts::from_array([300, 120, 40, 6, 1, 0]),
            }),
        }
    }

    fn stream_bytes(frames: &[RawFrame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for f in frames {
            buf.put_slice(b"\x01\x02garbage");
            encode_frame(f, &mut buf);
        }
        buf.to_vec()
    }

    #[tokio::test]
    async fn reads_frames_from_stream() {
        let bytes = stream_bytes(&[frame(410), frame(0), frame(415)]);
        let mut reader = FramedRead::new(&bytes[..], Am7Codec::new());

        let mut co2 = Vec::new();
        while let Some(reading) = reader.next().await {
            co2.push(reading.unwrap().co2());
        }
        assert_eq!(co2, vec![410, 415]);
        assert_eq!(reader.decoder().stats().zero_co2, 1);
    }

    #[tokio::test]
    async fn small_read_buffer_still_decodes() {
        let bytes = stream_bytes(&[frame(777)]);
        let mut reader = FramedRead::with_capacity(&bytes[..], Am7Codec::new(), 3);
        let reading = reader.next().await.unwrap().unwrap();
        assert_eq!(reading.raw(), &frame(777));
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn writes_request_and_frames() {
        let mut writer = FramedWrite::new(Vec::new(), Am7Codec::new());
        writer.send(ReadRequest).await.unwrap();
        writer.send(frame(500)).await.unwrap();

        let written = writer.get_ref();
        assert_eq!(&written[..REQUEST_COMMAND.len()], &REQUEST_COMMAND);

        let readings = FrameDecoder::new().feed(&written[REQUEST_COMMAND.len()..]);
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].co2(), 500);
    }

    #[test]
    fn partial_candidate_cleared_at_eof() {
        let bytes = stream_bytes(&[frame(410)]);
        let mut codec = Am7Codec::new();
        let mut buf = BytesMut::from(&bytes[..bytes.len() - 4]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
        assert_eq!(codec.stats().frames, 0);
    }
}
