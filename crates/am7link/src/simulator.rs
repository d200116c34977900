//! A software stand-in for the sensor, built on the mock USB host.
//!
//! The simulated sensor answers every read request with a long frame whose
//! values drift slowly, so the whole link engine can be exercised without
//! hardware.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use am7link_frame::{
    encode_frame, ExtendedTelemetry, ParticleCounts, RawFrame, REQUEST_COMMAND, SHORT_FRAME_LEN,
    TERMINATOR,
};
use am7link_transport::mock::MockHost;
use am7link_transport::UsbId;
use tracing::trace;

/// Knobs for the simulated sensor.
#[derive(Debug, Clone, Copy)]
pub struct SimulatorConfig {
    /// Identifier the simulated bridge enumerates with.
    pub device_id: UsbId,
    /// Answer with the short, checksum-less layout.
    pub short_frames: bool,
    /// Damage every Nth reply (0 = never) so the decoder rejects it.
    pub corrupt_every: u32,
    /// Report CO2 = 0 for the first N replies, as a warming-up sensor does.
    pub warmup_replies: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            device_id: UsbId::CP2102,
            short_frames: false,
            corrupt_every: 0,
            warmup_replies: 0,
        }
    }
}

/// Frame for the `n`th reply. Deterministic so tests can predict it.
pub fn simulated_frame(n: u32, config: &SimulatorConfig) -> RawFrame {
    // Triangle wave in 0..=20 so values wander without a float dependency.
    let wave = (n % 40).abs_diff(20) as u16;
    let co2 = if n < config.warmup_replies {
        0
    } else {
        410 + wave * 3
    };
    let extended = (!config.short_frames).then(|| ExtendedTelemetry {
        battery_status: u8::from(n % 100 < 50),
        battery_level: 4 - (n / 25 % 4) as u8,
        runtime_hours: (n / 3600) as u16,
        particle_counts: ParticleCounts::from_array([
            800 + wave * 10,
            300 + wave * 4,
            90 + wave,
            12,
            3,
            1,
        ]),
    });

    RawFrame {
        pm25: 8 + wave / 2,
        pm10: 12 + wave / 2,
        hcho: 20 + wave,
        tvoc: 120 + wave * 2,
        co2,
        temperature: 2150 + wave as i16 * 5,
        humidity: 4500 + wave * 10,
        extended,
    }
}

/// Damage an encoded reply so it can never decode.
///
/// Long frames get a flipped PM2.5 bit, caught by the checksum. Short frames
/// carry no checksum, so they are cut below the minimum length instead.
pub fn corrupt_reply(bytes: &mut Vec<u8>) {
    if bytes.len() > SHORT_FRAME_LEN + TERMINATOR.len() {
        bytes[2] ^= 0x01;
    } else {
        bytes.drain(SHORT_FRAME_LEN / 2..SHORT_FRAME_LEN);
    }
}

/// A mock host with the simulated sensor plugged in.
///
/// Returns the host and a counter of replies sent.
pub fn simulated_host(config: SimulatorConfig) -> (MockHost, Arc<AtomicU32>) {
    let host = MockHost::new(config.device_id);
    let replies = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&replies);

    host.set_responder(Box::new(move |written: &[u8]| {
        if written != REQUEST_COMMAND {
            return None;
        }
        let n = counter.fetch_add(1, Ordering::Relaxed);
        let mut buf = Default::default();
        encode_frame(&simulated_frame(n, &config), &mut buf);
        let mut bytes: Vec<u8> = buf.to_vec();
        if config.corrupt_every > 0 && (n + 1) % config.corrupt_every == 0 {
            corrupt_reply(&mut bytes);
        }
        trace!(n, len = bytes.len(), "simulated reply");
        Some(bytes)
    }));
    host.set_present(true);

    (host, replies)
}
