//! Configuration parsing and validation for alicd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Listener, session window and store timeout settings
//! - Entitlement database location
//! - Session directory backend (Redis or in-process)
//!
//! Command-line and environment values are applied on top of the file
//! through [`ConfigOverrides`] before validation.

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Settings> {
    build_settings(parse_raw(content)?, &ConfigOverrides::default())
}

/// Parse TOML and check its version without validating values
pub fn parse_raw(content: &str) -> ConfigResult<RawConfig> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    Ok(raw)
}

/// Read the config file if it exists, otherwise start from defaults
pub fn load_raw_or_default(path: impl AsRef<Path>) -> ConfigResult<RawConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!(path = %path.display(), "No config file, using defaults");
        return Ok(RawConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    parse_raw(&content)
}

/// Apply overrides, validate, and produce the final settings
pub fn build_settings(mut raw: RawConfig, overrides: &ConfigOverrides) -> ConfigResult<Settings> {
    overrides.apply(&mut raw);

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Settings::from_raw(raw))
}
