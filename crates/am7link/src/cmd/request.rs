use am7link::frame::REQUEST_COMMAND;

use crate::cmd::RequestArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_request, OutputFormat};

pub fn run(_args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    print_request(&REQUEST_COMMAND, format);
    Ok(SUCCESS)
}
