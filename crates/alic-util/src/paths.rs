//! Default paths for alicd components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/alicd/config.toml` or `~/.config/alicd/config.toml`
//! - Data: `$XDG_DATA_HOME/alicd` or `~/.local/share/alicd`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const ALIC_CONFIG_ENV: &str = "ALIC_CONFIG";

/// Environment variable for overriding the data directory
pub const ALIC_DATA_DIR_ENV: &str = "ALIC_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "alicd";

const CONFIG_FILENAME: &str = "config.toml";

const DATABASE_FILENAME: &str = "entitlements.db";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$ALIC_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/alicd/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/alicd/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(ALIC_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$ALIC_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/alicd` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/alicd` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(ALIC_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking ALIC_DATA_DIR env var.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Default location of the entitlement database
pub fn default_database_path() -> PathBuf {
    default_data_dir().join(DATABASE_FILENAME)
}
