//! Validated settings and startup overrides

use crate::schema::RawConfig;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

pub const BACKEND_REDIS: &str = "redis";
pub const BACKEND_MEMORY: &str = "memory";

pub const DEFAULT_LISTEN: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8000));
pub const DEFAULT_ALIVE_PERIOD_SECONDS: u64 = 4;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Validated settings, fixed for the lifetime of the process
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub sessions: SessionConfig,
    pub database: DatabaseConfig,
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle window a session survives without a heartbeat
    pub alive_period: Duration,
    /// Bound on each entitlement store or directory call
    pub store_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Session directory backend
#[derive(Debug, Clone)]
pub enum DirectoryConfig {
    Redis(RedisConfig),
    /// In-process directory; sessions do not survive a restart
    Memory,
}

#[derive(Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("db", &self.db)
            .finish()
    }
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let listen = raw
            .server
            .listen
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_LISTEN);

        let sessions = SessionConfig {
            alive_period: Duration::from_secs(
                raw.sessions
                    .alive_period_seconds
                    .unwrap_or(DEFAULT_ALIVE_PERIOD_SECONDS),
            ),
            store_timeout: Duration::from_millis(
                raw.sessions
                    .store_timeout_ms
                    .unwrap_or(DEFAULT_STORE_TIMEOUT_MS),
            ),
        };

        let database = DatabaseConfig {
            path: raw
                .database
                .path
                .unwrap_or_else(alic_util::default_database_path),
        };

        let directory = match raw.directory.backend.as_deref() {
            Some(BACKEND_MEMORY) => DirectoryConfig::Memory,
            _ => DirectoryConfig::Redis(RedisConfig {
                host: raw
                    .directory
                    .host
                    .unwrap_or_else(|| DEFAULT_REDIS_HOST.to_string()),
                port: raw.directory.port.unwrap_or(DEFAULT_REDIS_PORT),
                password: raw.directory.password.filter(|p| !p.is_empty()),
                db: raw.directory.db.unwrap_or(0),
            }),
        };

        Self {
            server: ServerConfig { listen },
            sessions,
            database,
            directory,
        }
    }
}

/// Values supplied on the command line or through the environment.
///
/// Each one that is set replaces the corresponding file value before
/// validation runs.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<String>,
    pub alive_period_seconds: Option<u64>,
    pub store_timeout_ms: Option<u64>,
    pub database_path: Option<PathBuf>,
    pub directory_backend: Option<String>,
    pub redis_host: Option<String>,
    pub redis_port: Option<u16>,
    pub redis_password: Option<String>,
    pub redis_db: Option<i64>,
}

impl ConfigOverrides {
    pub fn apply(&self, raw: &mut RawConfig) {
        fn set<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *target = Some(v.clone());
            }
        }

        set(&mut raw.server.listen, &self.listen);
        set(
            &mut raw.sessions.alive_period_seconds,
            &self.alive_period_seconds,
        );
        set(&mut raw.sessions.store_timeout_ms, &self.store_timeout_ms);
        set(&mut raw.database.path, &self.database_path);
        set(&mut raw.directory.backend, &self.directory_backend);
        set(&mut raw.directory.host, &self.redis_host);
        set(&mut raw.directory.port, &self.redis_port);
        set(&mut raw.directory.password, &self.redis_password);
        set(&mut raw.directory.db, &self.redis_db);
    }
}
