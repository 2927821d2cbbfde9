//! Validate a configuration file

use crate::error::CliResult;
use crate::utils::ColoredOutput;
use std::path::Path;
use tether_config::ConfigLoader;
use tracing::info;

pub struct CheckCommand;

impl CheckCommand {
    pub fn run(config_file: &str) -> CliResult<()> {
        let manifest = ConfigLoader::new().load_from_file(Path::new(config_file))?;
        info!(config = %config_file, "configuration is valid");

        println!(
            "{} {} (version {})",
            ColoredOutput::success("Valid:"),
            config_file,
            manifest.version
        );
        let names = manifest.devices.names();
        if names.is_empty() {
            println!("{}", ColoredOutput::dim("  no devices configured"));
        }
        for (protocol, name) in names {
            println!("  {:<12} {}", protocol, ColoredOutput::highlight(name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_check_valid_and_invalid_files() {
        let mut valid = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        valid
            .write_all(b"version: v1\ndevices:\n  redis:\n    jobs:\n      url: redis://127.0.0.1/\n")
            .unwrap();
        assert!(CheckCommand::run(valid.path().to_str().unwrap()).is_ok());

        let mut invalid = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        invalid
            .write_all(b"version: v1\ndevices:\n  redis:\n    jobs:\n      url: \"\"\n")
            .unwrap();
        assert!(CheckCommand::run(invalid.path().to_str().unwrap()).is_err());
    }
}
