//! alicd - license check and session lifecycle service
//!
//! Wires together:
//! - Configuration loading and environment overrides
//! - The SQLite entitlement store
//! - The session directory (Redis or in-process)
//! - The licensing engine
//! - The HTTP server

use alic_config::{
    build_settings, load_raw_or_default, ConfigOverrides, DirectoryConfig, Settings,
};
use alic_core::{LicensingEngine, SessionManager};
use alic_directory::{MemoryDirectory, RedisDirectory, RedisTarget, SessionDirectory};
use alic_store::{EntitlementStore, SqliteStore};
use alic_util::{default_config_path, format_duration, Clock, SystemClock};
use alicd::{build_router, AppState};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// alicd - License checks and session lifecycle over HTTP
#[derive(Parser, Debug)]
#[command(name = "alicd")]
#[command(about = "License checks and session lifecycle over HTTP", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/alicd/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Listen address, e.g. 0.0.0.0:8000
    #[arg(long, env = "ALIC_LISTEN")]
    listen: Option<String>,

    /// Seconds a session survives without a heartbeat
    #[arg(long, env = "SESSION_ALIVE_PERIOD")]
    alive_period: Option<u64>,

    /// Bound on each store call, in milliseconds
    #[arg(long, env = "ALIC_STORE_TIMEOUT_MS")]
    store_timeout_ms: Option<u64>,

    /// Entitlement database path
    #[arg(long, env = "ALIC_DATABASE")]
    database: Option<PathBuf>,

    /// Session directory backend: redis or memory
    #[arg(long, env = "ALIC_DIRECTORY_BACKEND")]
    directory: Option<String>,

    #[arg(long, env = "REDIS_HOST")]
    redis_host: Option<String>,

    #[arg(long, env = "REDIS_PORT")]
    redis_port: Option<u16>,

    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    redis_password: Option<String>,

    #[arg(long, env = "REDIS_DB")]
    redis_db: Option<i64>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen: self.listen.clone(),
            alive_period_seconds: self.alive_period,
            store_timeout_ms: self.store_timeout_ms,
            database_path: self.database.clone(),
            directory_backend: self.directory.clone(),
            redis_host: self.redis_host.clone(),
            redis_port: self.redis_port,
            redis_password: self.redis_password.clone(),
            redis_db: self.redis_db,
        }
    }
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    let raw = load_raw_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    let settings = build_settings(raw, &args.overrides()).context("Invalid configuration")?;

    info!(
        config_path = %args.config.display(),
        listen = %settings.server.listen,
        alive_period = %format_duration(settings.sessions.alive_period),
        "Configuration loaded"
    );
    Ok(settings)
}

async fn open_directory(
    settings: &Settings,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn SessionDirectory>> {
    match &settings.directory {
        DirectoryConfig::Redis(redis) => {
            let target = RedisTarget {
                host: redis.host.clone(),
                port: redis.port,
                password: redis.password.clone(),
                db: redis.db,
            };
            let directory = RedisDirectory::connect(target, settings.sessions.store_timeout)
                .await
                .with_context(|| {
                    format!("Failed to connect to Redis at {}:{}", redis.host, redis.port)
                })?;
            Ok(Arc::new(directory))
        }
        DirectoryConfig::Memory => {
            info!("Using in-process session directory");
            Ok(Arc::new(MemoryDirectory::new(clock)))
        }
    }
}

async fn shutdown_signal() {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "Failed to install signal handlers");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!(version = env!("CARGO_PKG_VERSION"), "alicd starting");

    let settings = load_settings(&args)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let db_path = &settings.database.path;
    let store: Arc<dyn EntitlementStore> = Arc::new(
        SqliteStore::open(db_path)
            .and_then(|store| store.with_busy_timeout(settings.sessions.store_timeout))
            .with_context(|| format!("Failed to open database {:?}", db_path))?,
    );
    info!(db_path = %db_path.display(), "Store initialized");

    let directory = open_directory(&settings, clock.clone()).await?;
    let sessions = SessionManager::new(directory, settings.sessions.alive_period);
    let engine = Arc::new(LicensingEngine::new(store, sessions));

    let app = build_router(AppState::new(engine, clock));
    let listener = tokio::net::TcpListener::bind(settings.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.listen))?;

    info!(listen = %settings.server.listen, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutdown complete");
    Ok(())
}
