//! Run one SQL query

use super::run::run_request;
use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};
use tether_core::{Request, Target};

pub struct SqlCommand;

impl SqlCommand {
    pub async fn run(
        config_file: &str,
        device: &str,
        query: String,
        format: OutputFormat,
    ) -> CliResult<()> {
        if query.trim().is_empty() {
            return Err(CliError::InvalidArgument("Query is empty".to_string()));
        }
        run_request(config_file, Target::PostgreSql, device, Request::sql(query), format).await
    }
}
