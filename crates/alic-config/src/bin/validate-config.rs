//! Config validation CLI tool
//!
//! Validates an alicd configuration file and reports any errors.

use alic_config::{ConfigError, DirectoryConfig, CURRENT_CONFIG_VERSION};
use alic_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates an alicd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match alic_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!("  Listen: {}", settings.server.listen);
            println!(
                "  Session alive period: {}",
                format_duration(settings.sessions.alive_period)
            );
            println!(
                "  Store timeout: {}ms",
                settings.sessions.store_timeout.as_millis()
            );
            println!("  Database: {}", settings.database.path.display());
            match &settings.directory {
                DirectoryConfig::Redis(redis) => {
                    println!(
                        "  Directory: redis://{}:{}/{}",
                        redis.host, redis.port, redis.db
                    );
                }
                DirectoryConfig::Memory => println!("  Directory: in-process"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
