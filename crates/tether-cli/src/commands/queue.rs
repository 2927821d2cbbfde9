//! Run one Redis command

use super::run::run_request;
use crate::cli::OutputFormat;
use crate::error::CliResult;
use tether_core::{Request, Target};

pub struct QueueCommand;

impl QueueCommand {
    pub async fn run(
        config_file: &str,
        device: &str,
        command: String,
        args: Vec<String>,
        format: OutputFormat,
    ) -> CliResult<()> {
        let request = Request::queue(command.to_uppercase(), args);
        run_request(config_file, Target::Redis, device, request, format).await
    }
}
