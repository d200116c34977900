use am7link::simulator::{simulated_host, SimulatorConfig};

use crate::cmd::monitor::monitor;
use crate::cmd::SimulateArgs;
use crate::exit::CliResult;
use crate::output::OutputFormat;

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let config = SimulatorConfig {
        device_id: args.link.usb_id(),
        short_frames: args.short_frames,
        corrupt_every: args.corrupt_every,
        warmup_replies: args.warmup,
    };
    let (host, replies) = simulated_host(config);

    let code = monitor(host, &args.link, format)?;
    tracing::info!(
        replies = replies.load(std::sync::atomic::Ordering::Relaxed),
        "simulation finished"
    );
    Ok(code)
}
