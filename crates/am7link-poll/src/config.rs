use std::time::Duration;

use am7link_transport::{TransportConfig, UsbId};

/// Default number of ticks between read requests.
pub const DEFAULT_POLL_INTERVAL_TICKS: u32 = 3;

/// Default number of ticks between discovery attempts.
pub const DEFAULT_DISCOVERY_INTERVAL_TICKS: u32 = 1;

/// Default liveness window in seconds.
pub const DEFAULT_STALE_AFTER_SECS: u32 = 30;

/// Configuration for a [`SensorLink`](crate::SensorLink).
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Transport identifiers, line settings and timeouts.
    pub transport: TransportConfig,
    /// Send a read request every this many polling ticks. Default: 3.
    pub poll_interval_ticks: u32,
    /// Attempt discovery every this many idle ticks. Default: 1.
    pub discovery_interval_ticks: u32,
    /// Ticks without an accepted frame before the link goes stale. Default: 30.
    pub stale_after_secs: u32,
    /// Scheduler period. Liveness counts ticks, so this should stay at 1 s
    /// outside of tests.
    pub tick: Duration,
    /// Log raw frames and decoded fields at `info`.
    pub verbose: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            poll_interval_ticks: DEFAULT_POLL_INTERVAL_TICKS,
            discovery_interval_ticks: DEFAULT_DISCOVERY_INTERVAL_TICKS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            tick: Duration::from_secs(1),
            verbose: false,
        }
    }
}

impl LinkConfig {
    pub fn with_device_id(mut self, id: UsbId) -> Self {
        self.transport.device_id = id;
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.transport.line_coding.baud_rate = baud_rate;
        self
    }

    /// Override the transport configuration wholesale.
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Values below 1 are raised to 1.
    pub fn with_poll_interval_ticks(mut self, ticks: u32) -> Self {
        self.poll_interval_ticks = ticks.max(1);
        self
    }

    /// Values below 1 are raised to 1.
    pub fn with_discovery_interval_ticks(mut self, ticks: u32) -> Self {
        self.discovery_interval_ticks = ticks.max(1);
        self
    }

    pub fn with_stale_after_secs(mut self, secs: u32) -> Self {
        self.stale_after_secs = secs.max(1);
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.poll_interval_ticks, 3);
        assert_eq!(config.discovery_interval_ticks, 1);
        assert_eq!(config.stale_after_secs, 30);
        assert_eq!(config.tick, Duration::from_secs(1));
        assert_eq!(config.transport.device_id, UsbId::CP2102);
        assert_eq!(config.transport.line_coding.baud_rate, 115_200);
    }

    #[test]
    fn builders_clamp_to_one() {
        let config = LinkConfig::default()
            .with_poll_interval_ticks(0)
            .with_discovery_interval_ticks(0)
            .with_stale_after_secs(0);
        assert_eq!(config.poll_interval_ticks, 1);
        assert_eq!(config.discovery_interval_ticks, 1);
        assert_eq!(config.stale_after_secs, 1);
    }

    #[test]
    fn transport_overrides() {
        let config = LinkConfig::default()
            .with_device_id(UsbId::new(0x1A86, 0x7523))
            .with_baud_rate(9600);
        assert_eq!(config.transport.device_id, UsbId::new(0x1A86, 0x7523));
        assert_eq!(config.transport.line_coding.baud_rate, 9600);
    }
}
