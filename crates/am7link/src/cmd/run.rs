use crate::cmd::RunArgs;
use crate::exit::CliResult;
use crate::output::OutputFormat;

#[cfg(feature = "serial")]
pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    use am7link::transport::SerialPortHost;

    tracing::info!(id = %args.link.usb_id(), "looking for sensor on USB serial");
    crate::cmd::monitor::monitor(SerialPortHost::new(), &args.link, format)
}

#[cfg(not(feature = "serial"))]
pub fn run(_args: RunArgs, _format: OutputFormat) -> CliResult<i32> {
    Err(crate::exit::CliError::new(
        crate::exit::USAGE,
        "built without serial support; rebuild with `--features serial`",
    ))
}
