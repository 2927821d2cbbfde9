//! CLI argument definitions using clap

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "tether",
    about = "Tether - run requests through reactor-driven devices",
    version,
    author = "Tether Team"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,

    /// Output format for replies
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a configuration file and list its devices
    Check {
        #[arg(help = "Configuration file (YAML or JSON)")]
        config: String,
    },

    /// Send one HTTP request through an HTTP device
    Http {
        #[arg(help = "Configuration file (YAML or JSON)")]
        config: String,

        #[arg(help = "HTTP device name")]
        device: String,

        #[arg(help = "Request URL")]
        url: String,

        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Repeatable `Name: value` header
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        #[arg(short, long)]
        body: Option<String>,

        /// Per-request timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Run one SQL query through a PostgreSQL device
    Sql {
        #[arg(help = "Configuration file (YAML or JSON)")]
        config: String,

        #[arg(help = "PostgreSQL device name")]
        device: String,

        #[arg(help = "Query text; several statements may be separated by ';'")]
        query: String,
    },

    /// Run one command through a Redis device
    Queue {
        #[arg(help = "Configuration file (YAML or JSON)")]
        config: String,

        #[arg(help = "Redis device name")]
        device: String,

        #[arg(help = "Command name, e.g. LPUSH")]
        command: String,

        #[arg(help = "Command arguments")]
        args: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_command_parsing() {
        let cli = Cli::try_parse_from([
            "tether",
            "http",
            "tether.yaml",
            "api",
            "https://example.com/jobs",
            "-X",
            "POST",
            "-H",
            "Content-Type: application/json",
            "-H",
            "X-Trace: 1",
            "--body",
            "{}",
        ])
        .unwrap();

        match cli.command {
            Commands::Http {
                config,
                device,
                method,
                headers,
                body,
                timeout_ms,
                ..
            } => {
                assert_eq!(config, "tether.yaml");
                assert_eq!(device, "api");
                assert_eq!(method, "POST");
                assert_eq!(headers.len(), 2);
                assert_eq!(body.as_deref(), Some("{}"));
                assert_eq!(timeout_ms, None);
            }
            _ => panic!("expected the http command"),
        }
    }

    #[test]
    fn test_queue_command_parsing() {
        let cli = Cli::try_parse_from([
            "tether", "queue", "tether.yaml", "jobs", "LPUSH", "pending", "42", "--format", "json",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Queue { command, args, .. } => {
                assert_eq!(command, "LPUSH");
                assert_eq!(args, vec!["pending", "42"]);
            }
            _ => panic!("expected the queue command"),
        }
    }

    #[test]
    fn test_missing_arguments_rejected() {
        assert!(Cli::try_parse_from(["tether", "sql", "tether.yaml"]).is_err());
    }
}
