//! The report loop shared by `run` and `simulate`.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use am7link::telemetry::{announce, publish_current, state_topic, LineSink, StatusDocument};
use am7link::transport::UsbHost;
use am7link::SensorLink;
use tracing::info;

use crate::cmd::{parse_duration, LinkArgs};
use crate::exit::{link_error, telemetry_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_status, OutputFormat};

/// Upper bound on how long Ctrl-C waits to be noticed.
const STOP_POLL: Duration = Duration::from_millis(50);

pub fn monitor<H: UsbHost + 'static>(host: H, args: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link_config()?;
    let report_every = parse_duration(&args.report_every)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let link = SensorLink::start(host, config).map_err(|err| link_error("link start failed", err))?;
    let handle = link.handle();

    let topic = state_topic(&args.device_id);
    let mut sink = args.telemetry.then(|| LineSink::new(io::stdout()));
    if let Some(sink) = sink.as_mut() {
        announce(&args.device_id, &topic, sink)
            .map_err(|err| telemetry_error("discovery publish failed", err))?;
    }

    let mut reports = 0usize;
    while running.load(Ordering::SeqCst) {
        if !wait(report_every, &running) {
            break;
        }

        match sink.as_mut() {
            Some(sink) => {
                publish_current(&handle, &topic, sink)
                    .map_err(|err| telemetry_error("publish failed", err))?;
            }
            None => {
                let snapshot = handle.snapshot();
                print_status(
                    &StatusDocument::from(&snapshot),
                    snapshot.reading.as_ref(),
                    format,
                );
            }
        }

        reports = reports.saturating_add(1);
        if args.count.is_some_and(|count| reports >= count) {
            break;
        }
    }

    info!(reports, "stopping");
    link.shutdown()
        .map_err(|err| link_error("link shutdown failed", err))?;
    Ok(SUCCESS)
}

/// Sleep for `period` unless asked to stop first. Returns whether still running.
fn wait(period: Duration, running: &AtomicBool) -> bool {
    let deadline = Instant::now() + period;
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(STOP_POLL.min(deadline - now));
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
