//! Tether CLI main entry point

use clap::Parser;
use tether_cli::{
    cli::{Cli, Commands},
    commands::{CheckCommand, HttpCommand, QueueCommand, SqlCommand},
    error::CliResult,
    utils::{init_tracing, ColoredOutput},
};
use tracing::debug;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let exit_code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{} {}", ColoredOutput::error("Error:"), e);
            1
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    if cli.no_color {
        colored::control::set_override(false);
    }

    debug!("Tether CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Check { config } => CheckCommand::run(&config),

        Commands::Http {
            config,
            device,
            url,
            method,
            headers,
            body,
            timeout_ms,
        } => {
            HttpCommand::run(
                &config, &device, url, method, headers, body, timeout_ms, cli.format,
            )
            .await
        }

        Commands::Sql {
            config,
            device,
            query,
        } => SqlCommand::run(&config, &device, query, cli.format).await,

        Commands::Queue {
            config,
            device,
            command,
            args,
        } => QueueCommand::run(&config, &device, command, args, cli.format).await,
    }
}
