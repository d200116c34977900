use am7link::frame::FrameDecoder;

use crate::cmd::DecodeArgs;
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_readings, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex)?;

    let mut decoder = FrameDecoder::new();
    decoder.set_verbose(args.verbose);
    let readings = decoder.feed(&bytes);
    let stats = decoder.stats();

    print_readings(&readings, &stats, format);

    if readings.is_empty() {
        return Ok(DATA_INVALID);
    }
    Ok(SUCCESS)
}

/// Join the arguments and decode them as hex, ignoring whitespace, `:` and `-`.
fn parse_hex(parts: &[String]) -> CliResult<Vec<u8>> {
    let digits: String = parts
        .iter()
        .flat_map(|part| part.chars())
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    hex::decode(&digits).map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex input: {err}")))
}
