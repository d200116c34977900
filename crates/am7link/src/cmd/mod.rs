use std::time::Duration;

use am7link::transport::UsbId;
use am7link::LinkConfig;
use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod monitor;
pub mod request;
pub mod run;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll a sensor attached over USB serial.
    Run(RunArgs),
    /// Run the link engine against a simulated sensor.
    Simulate(SimulateArgs),
    /// Decode hex-encoded bytes into readings.
    Decode(DecodeArgs),
    /// Print the read request command.
    Request(RequestArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Request(args) => request::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

impl Command {
    /// Whether the command asked for verbose frame diagnostics.
    pub fn verbose(&self) -> bool {
        match self {
            Command::Run(args) => args.link.verbose,
            Command::Simulate(args) => args.link.verbose,
            Command::Decode(args) => args.verbose,
            Command::Request(_) | Command::Version(_) => false,
        }
    }
}

/// Link settings shared by `run` and `simulate`.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// USB vendor id of the sensor's bridge (hex).
    #[arg(long, env = "AM7LINK_VID", default_value = "10c4", value_parser = parse_hex_u16)]
    pub vid: u16,
    /// USB product id of the sensor's bridge (hex).
    #[arg(long, env = "AM7LINK_PID", default_value = "ea60", value_parser = parse_hex_u16)]
    pub pid: u16,
    /// Line speed.
    #[arg(long, env = "AM7LINK_BAUD", default_value_t = 115_200)]
    pub baud: u32,
    /// Send a read request every N ticks.
    #[arg(long, default_value_t = 3)]
    pub poll_interval: u32,
    /// Attempt discovery every N ticks while idle.
    #[arg(long, default_value_t = 1)]
    pub discovery_interval: u32,
    /// Ticks without a valid frame before the link is stale.
    #[arg(long, default_value_t = 30)]
    pub stale_after: u32,
    /// Scheduler tick (e.g. 1s, 100ms).
    #[arg(long, default_value = "1s")]
    pub tick: String,
    /// How often to report (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub report_every: String,
    /// Exit after N reports.
    #[arg(long)]
    pub count: Option<usize>,
    /// Device id used in telemetry topics.
    #[arg(long, env = "AM7LINK_DEVICE_ID", default_value = "am7-gateway")]
    pub device_id: String,
    /// Print telemetry-bus messages instead of status reports.
    #[arg(long)]
    pub telemetry: bool,
    /// Log raw frames and decoded fields.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl LinkArgs {
    pub fn usb_id(&self) -> UsbId {
        UsbId::new(self.vid, self.pid)
    }

    pub fn link_config(&self) -> CliResult<LinkConfig> {
        Ok(LinkConfig::default()
            .with_device_id(self.usb_id())
            .with_baud_rate(self.baud)
            .with_poll_interval_ticks(self.poll_interval)
            .with_discovery_interval_ticks(self.discovery_interval)
            .with_stale_after_secs(self.stale_after)
            .with_tick(parse_duration(&self.tick)?)
            .with_verbose(self.verbose))
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Answer with short, checksum-less frames.
    #[arg(long)]
    pub short_frames: bool,
    /// Corrupt every Nth reply.
    #[arg(long, default_value_t = 0)]
    pub corrupt_every: u32,
    /// Report CO2 = 0 for the first N replies.
    #[arg(long, default_value_t = 0)]
    pub warmup: u32,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex-encoded bytes; arguments are concatenated.
    #[arg(required = true)]
    pub hex: Vec<String>,
    /// Log raw frames and decoded fields.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Args, Debug, Default)]
pub struct RequestArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_hex_u16(input: &str) -> Result<u16, String> {
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    u16::from_str_radix(digits, 16).map_err(|err| format!("invalid hex id {input:?}: {err}"))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
