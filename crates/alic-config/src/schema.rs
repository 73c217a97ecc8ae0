//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// HTTP listener settings
    #[serde(default)]
    pub server: RawServerConfig,

    /// Session lifetime settings
    #[serde(default)]
    pub sessions: RawSessionConfig,

    /// Entitlement database settings
    #[serde(default)]
    pub database: RawDatabaseConfig,

    /// Session directory backend
    #[serde(default)]
    pub directory: RawDirectoryConfig,
}

impl Default for RawConfig {
    /// An empty config at the current version; every field falls back to its default
    fn default() -> Self {
        Self {
            config_version: crate::CURRENT_CONFIG_VERSION,
            server: RawServerConfig::default(),
            sessions: RawSessionConfig::default(),
            database: RawDatabaseConfig::default(),
            directory: RawDirectoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServerConfig {
    /// Socket address to bind (default: 0.0.0.0:8000)
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSessionConfig {
    /// Heartbeat window in seconds (default: 4)
    pub alive_period_seconds: Option<u64>,

    /// Upper bound on a single store call in milliseconds (default: 2000)
    pub store_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDatabaseConfig {
    /// SQLite file (default: data dir/entitlements.db)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDirectoryConfig {
    /// "redis" or "memory" (default: redis)
    pub backend: Option<String>,

    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub db: Option<i64>,
}
