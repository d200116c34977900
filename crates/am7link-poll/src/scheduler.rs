use std::sync::Arc;

use am7link_frame::REQUEST_COMMAND;
use am7link_transport::{RxHandler, TransportError, TransportSession, UsbHost};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::state::LinkState;
use crate::store::LinkShared;

/// The link state machine. One call to [`tick`](Scheduler::tick) per second.
///
/// The shared lock is only held to read or write link state, never across a
/// transport call, so byte arrival can run while a request is in flight.
pub(crate) struct Scheduler<H: UsbHost> {
    session: TransportSession<H>,
    shared: Arc<LinkShared>,
    poll_interval_ticks: u32,
    discovery_interval_ticks: u32,
    stale_after_secs: u32,
    discovery_countdown: u32,
    poll_countdown: u32,
    /// Ticks since the link last entered `Polling`. A reading older than the
    /// current connection still gets a full window before going stale.
    ticks_polling: u32,
}

impl<H: UsbHost> Scheduler<H> {
    pub(crate) fn new(host: H, config: &LinkConfig, shared: Arc<LinkShared>) -> Self {
        Self {
            session: TransportSession::new(host, config.transport.clone()),
            shared,
            poll_interval_ticks: config.poll_interval_ticks.max(1),
            discovery_interval_ticks: config.discovery_interval_ticks.max(1),
            stale_after_secs: config.stale_after_secs.max(1),
            discovery_countdown: 0,
            poll_countdown: 0,
            ticks_polling: 0,
        }
    }

    /// Advance the state machine by one tick and return the resulting state.
    ///
    /// The age of the last reading advances on every tick, whatever the state;
    /// only an accepted frame resets it.
    pub(crate) fn tick(&mut self) -> LinkState {
        let (state, detached) = {
            let mut inner = self.shared.lock();
            inner.seconds_since_last_frame = inner.seconds_since_last_frame.saturating_add(1);
            let detached = std::mem::take(&mut inner.detach_pending);
            (inner.state, detached)
        };

        if detached || (self.session.is_open() && !self.session.is_attached()) {
            self.lose_link("device detached");
            return LinkState::Idle;
        }

        match state {
            LinkState::Idle | LinkState::Discovering => self.tick_idle(),
            LinkState::Configuring => self.tick_configuring(),
            LinkState::Polling | LinkState::Stale => self.tick_polling(),
        }
    }

    fn tick_idle(&mut self) -> LinkState {
        if self.discovery_countdown > 0 {
            self.discovery_countdown -= 1;
            return LinkState::Idle;
        }

        self.set_state(LinkState::Discovering);
        match self.session.discover() {
            Ok(()) => self.set_state(LinkState::Configuring),
            Err(err) => {
                if is_transient(&err) {
                    debug!(error = %err, "sensor not found");
                } else {
                    warn!(error = %err, "discovery failed");
                }
                self.discovery_countdown = self.discovery_interval_ticks - 1;
                self.set_state(LinkState::Idle)
            }
        }
    }

    fn tick_configuring(&mut self) -> LinkState {
        match self.session.configure() {
            Ok(outcome) => debug!(?outcome, "line configured"),
            Err(err) if err.is_link_loss() => {
                self.lose_link(&format!("configuration failed: {err}"));
                return LinkState::Idle;
            }
            // The sensor often works with the bridge's power-on defaults.
            Err(err) => warn!(error = %err, "line configuration failed, polling anyway"),
        }

        let handler: Arc<dyn RxHandler> = self.shared.clone();
        if let Err(err) = self.session.start_receiving(handler) {
            self.lose_link(&format!("failed to start reception: {err}"));
            return LinkState::Idle;
        }

        self.poll_countdown = 0;
        self.ticks_polling = 0;
        {
            let mut inner = self.shared.lock();
            // A frame may already have been accepted; keep its state untouched.
            if inner.state == LinkState::Configuring {
                inner.state = LinkState::Polling;
            }
        }
        info!(id = %self.session.config().device_id, "polling sensor");
        LinkState::Polling
    }

    fn tick_polling(&mut self) -> LinkState {
        if self.poll_countdown == 0 {
            if let Err(err) = self.send_request() {
                self.lose_link(&format!("request failed: {err}"));
                return LinkState::Idle;
            }
            self.poll_countdown = self.poll_interval_ticks - 1;
        } else {
            self.poll_countdown -= 1;
        }

        self.ticks_polling = self.ticks_polling.saturating_add(1);
        let mut inner = self.shared.lock();
        // A detach reported during the send wins over this tick.
        if inner.state == LinkState::Idle {
            return LinkState::Idle;
        }
        let quiet = inner.seconds_since_last_frame.min(self.ticks_polling);
        if inner.state == LinkState::Polling && quiet >= self.stale_after_secs {
            warn!(
                seconds = inner.seconds_since_last_frame,
                "no valid frame within liveness window"
            );
            inner.state = LinkState::Stale;
            inner.connected = false;
        }
        inner.state
    }

    /// Ask the sensor for one reading.
    fn send_request(&mut self) -> am7link_transport::Result<()> {
        self.session.send(&REQUEST_COMMAND)
    }

    fn set_state(&self, state: LinkState) -> LinkState {
        self.shared.lock().state = state;
        state
    }

    fn lose_link(&mut self, reason: &str) {
        warn!(reason, "sensor link lost");
        self.session.close();
        self.discovery_countdown = 0;
        let mut inner = self.shared.lock();
        inner.drop_link();
        inner.detach_pending = false;
    }

    /// Close the device, if open. Called when the worker stops.
    pub(crate) fn shutdown(&mut self) {
        if self.session.close() {
            self.shared.lock().drop_link();
        }
    }

    /// The transport session this scheduler drives.
    pub(crate) fn session(&self) -> &TransportSession<H> {
        &self.session
    }
}

/// Errors expected while the sensor is simply unplugged or slow.
pub(crate) fn is_transient(err: &TransportError) -> bool {
    matches!(err, TransportError::NotFound { .. } | TransportError::Timeout(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use am7link_frame::{encode_frame, ExtendedTelemetry, RawFrame};
    use am7link_transport::mock::{MockEvent, MockHost};
    use am7link_transport::{UsbId, VendorRequest};

    use crate::store::ReadingHandle;

    fn config() -> LinkConfig {
        let mut config = LinkConfig::default();
        config.transport.settle_delay = Duration::ZERO;
        config
    }

    fn scheduler(host: &MockHost, config: &LinkConfig) -> (Scheduler<MockHost>, ReadingHandle) {
        let shared = LinkShared::new(false);
        let handle = ReadingHandle::new(Arc::clone(&shared));
        (Scheduler::new(host.clone(), config, shared), handle)
    }

    fn frame(co2: u16) -> Vec<u8> {
        let mut buf = Default::default();
        encode_frame(
            &RawFrame {
                pm25: 7,
                pm10: 9,
                hcho: 15,
                tvoc: 90,
                co2,
                temperature: 2310,
                humidity: 4800,
                extended: Some(ExtendedTelemetry::default()),
            },
            &mut buf,
        );
        buf.to_vec()
    }

    fn present_host() -> MockHost {
        let host = MockHost::new(UsbId::CP2102);
        host.set_present(true);
        host
    }

    fn requests(host: &MockHost) -> usize {
        host.writes()
            .iter()
            .filter(|w| w.as_slice() == REQUEST_COMMAND)
            .count()
    }

    /// Tick until the link is polling.
    fn bring_up(scheduler: &mut Scheduler<MockHost>) {
        assert_eq!(scheduler.tick(), LinkState::Configuring);
        assert_eq!(scheduler.tick(), LinkState::Polling);
    }

    #[test]
    fn absent_device_stays_idle() {
        let host = MockHost::new(UsbId::CP2102);
        let (mut scheduler, handle) = scheduler(&host, &config());

        for _ in 0..100 {
            assert_eq!(scheduler.tick(), LinkState::Idle);
        }
        assert_eq!(host.open_attempts(), 100);
        assert_eq!(host.opens(), 0);
        assert!(!handle.is_connected());
    }

    #[test]
    fn discovery_interval_spaces_attempts() {
        let host = MockHost::new(UsbId::CP2102);
        let config = config().with_discovery_interval_ticks(5);
        let (mut scheduler, _handle) = scheduler(&host, &config);

        for _ in 0..20 {
            scheduler.tick();
        }
        // Ticks 1, 6, 11, 16.
        assert_eq!(host.open_attempts(), 4);
    }

    #[test]
    fn device_appearing_later_is_picked_up() {
        let host = MockHost::new(UsbId::CP2102);
        let (mut scheduler, _handle) = scheduler(&host, &config());
        scheduler.tick();
        scheduler.tick();
        host.set_present(true);
        bring_up(&mut scheduler);
        assert_eq!(host.opens(), 1);
    }

    #[test]
    fn standard_configuration_then_first_request() {
        let host = present_host();
        let (mut scheduler, _handle) = scheduler(&host, &config());
        bring_up(&mut scheduler);
        assert!(host.is_receiving());
        assert_eq!(requests(&host), 0);

        scheduler.tick();
        assert_eq!(requests(&host), 1);
    }

    #[test]
    fn vendor_fallback_when_standard_unsupported() {
        let host = present_host();
        host.set_standard_supported(false);
        let (mut scheduler, _handle) = scheduler(&host, &config());
        bring_up(&mut scheduler);

        let vendor: Vec<VendorRequest> = host
            .events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Vendor { request, .. } => Some(request),
                _ => None,
            })
            .collect();
        assert_eq!(vendor.len(), 5);
    }

    #[test]
    fn configuration_failure_still_polls() {
        let host = present_host();
        host.set_standard_supported(false);
        host.set_vendor_supported(false);
        let (mut scheduler, _handle) = scheduler(&host, &config());
        bring_up(&mut scheduler);
        scheduler.tick();
        assert_eq!(requests(&host), 1);
    }

    #[test]
    fn requests_every_poll_interval() {
        let host = present_host();
        let (mut scheduler, _handle) = scheduler(&host, &config());
        bring_up(&mut scheduler);

        for _ in 0..9 {
            scheduler.tick();
        }
        assert_eq!(requests(&host), 3);
    }

    #[test]
    fn liveness_threshold_exact() {
        let host = present_host();
        let (mut scheduler, handle) = scheduler(&host, &config());
        bring_up(&mut scheduler);

        host.inject(&frame(420));
        assert!(handle.is_connected());

        for tick in 1..30 {
            assert_eq!(scheduler.tick(), LinkState::Polling, "tick {tick}");
            assert_eq!(handle.get_current_reading().2, tick);
        }
        assert_eq!(scheduler.tick(), LinkState::Stale);
        let (reading, connected, age) = handle.get_current_reading();
        assert_eq!(age, 30);
        assert!(!connected);
        assert_eq!(reading.map(|r| r.co2()), Some(420));
    }

    #[test]
    fn rejected_frames_do_not_reset_liveness() {
        let host = present_host();
        let (mut scheduler, handle) = scheduler(&host, &config());
        bring_up(&mut scheduler);
        host.inject(&frame(420));

        for _ in 0..10 {
            scheduler.tick();
        }
        let mut corrupt = frame(430);
        corrupt[4] ^= 0x01;
        host.inject(&corrupt);
        host.inject(&frame(0));

        assert_eq!(handle.get_current_reading().2, 10);
        assert_eq!(handle.state(), LinkState::Polling);
        assert_eq!(handle.snapshot().stats.rejected(), 2);
    }

    #[test]
    fn stale_link_keeps_polling_and_recovers() {
        let host = present_host();
        let config = config().with_stale_after_secs(3).with_poll_interval_ticks(1);
        let (mut scheduler, handle) = scheduler(&host, &config);
        bring_up(&mut scheduler);

        for _ in 0..3 {
            scheduler.tick();
        }
        assert_eq!(handle.state(), LinkState::Stale);
        let sent = requests(&host);
        assert_eq!(scheduler.tick(), LinkState::Stale);
        assert_eq!(requests(&host), sent + 1);

        host.inject(&frame(415));
        assert_eq!(handle.state(), LinkState::Polling);
        assert!(handle.is_connected());
        assert_eq!(scheduler.tick(), LinkState::Polling);
    }

    #[test]
    fn detach_returns_to_idle_and_rediscovers() {
        let host = present_host();
        let (mut scheduler, handle) = scheduler(&host, &config());
        bring_up(&mut scheduler);
        host.inject(&frame(420));

        host.detach();
        assert_eq!(handle.state(), LinkState::Idle);
        assert!(!handle.is_connected());

        assert_eq!(scheduler.tick(), LinkState::Idle);
        assert!(!scheduler.session().is_open());

        host.set_present(true);
        bring_up(&mut scheduler);
        assert_eq!(host.opens(), 2);
    }

    #[test]
    fn reading_age_survives_disconnect_and_reconnect() {
        let host = present_host();
        let (mut scheduler, handle) = scheduler(&host, &config());
        bring_up(&mut scheduler);
        host.inject(&frame(420));

        for _ in 0..20 {
            scheduler.tick();
        }
        assert_eq!(handle.get_current_reading().2, 20);

        host.detach();
        for _ in 0..100 {
            assert_eq!(scheduler.tick(), LinkState::Idle);
        }
        let (reading, connected, age) = handle.get_current_reading();
        assert_eq!(reading.map(|r| r.co2()), Some(420));
        assert!(!connected);
        assert_eq!(age, 120);

        host.set_present(true);
        bring_up(&mut scheduler);
        let (_, connected, age) = handle.get_current_reading();
        assert!(!connected);
        assert_eq!(age, 122);

        // The new connection gets its own liveness window.
        for tick in 1..30 {
            assert_eq!(scheduler.tick(), LinkState::Polling, "tick {tick}");
        }
        assert_eq!(scheduler.tick(), LinkState::Stale);
        assert_eq!(handle.get_current_reading().2, 152);

        host.inject(&frame(433));
        let (reading, connected, age) = handle.get_current_reading();
        assert_eq!(reading.map(|r| r.co2()), Some(433));
        assert!(connected);
        assert_eq!(age, 0);
    }

    #[test]
    fn age_advances_before_first_connection() {
        let host = MockHost::new(UsbId::CP2102);
        let (mut scheduler, handle) = scheduler(&host, &config());
        for _ in 0..5 {
            scheduler.tick();
        }
        assert_eq!(handle.get_current_reading(), (None, false, 5));
    }

    #[test]
    fn write_failure_returns_to_idle() {
        let host = present_host();
        let (mut scheduler, handle) = scheduler(&host, &config());
        bring_up(&mut scheduler);
        host.inject(&frame(420));

        host.set_fail_writes(true);
        assert_eq!(scheduler.tick(), LinkState::Idle);
        assert!(!handle.is_connected());
        assert!(!scheduler.session().is_open());
    }

    #[test]
    fn responder_frames_keep_link_fresh() {
        let host = present_host();
        let reply = frame(555);
        host.set_responder(Box::new(move |written: &[u8]| {
            (written == REQUEST_COMMAND).then(|| reply.clone())
        }));
        let config = config().with_stale_after_secs(5);
        let (mut scheduler, handle) = scheduler(&host, &config);
        bring_up(&mut scheduler);

        for _ in 0..40 {
            assert_eq!(scheduler.tick(), LinkState::Polling);
        }
        let (reading, connected, age) = handle.get_current_reading();
        assert!(connected);
        assert!(age < 3);
        assert_eq!(reading.map(|r| r.co2()), Some(555));
    }

    #[test]
    fn shutdown_closes_device() {
        let host = present_host();
        let (mut scheduler, handle) = scheduler(&host, &config());
        bring_up(&mut scheduler);
        scheduler.shutdown();
        assert!(!scheduler.session().is_open());
        assert_eq!(handle.state(), LinkState::Idle);
    }

    #[test]
    fn transient_errors() {
        assert!(is_transient(&TransportError::NotFound {
            id: UsbId::CP2102
        }));
        assert!(!is_transient(&TransportError::Detached));
    }
}
