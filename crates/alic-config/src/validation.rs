//! Configuration validation

use crate::schema::RawConfig;
use crate::settings::{BACKEND_MEMORY, BACKEND_REDIS};
use std::net::SocketAddr;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("Unknown directory backend '{0}' (expected \"redis\" or \"memory\")")]
    UnknownBackend(String),
}

impl ValidationError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

/// Validate a raw configuration, collecting every problem found
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(listen) = &config.server.listen {
        if listen.trim().is_empty() {
            errors.push(ValidationError::invalid("server.listen", "cannot be empty"));
        } else if listen.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::invalid(
                "server.listen",
                format!("'{}' is not a socket address", listen),
            ));
        }
    }

    if config.sessions.alive_period_seconds == Some(0) {
        errors.push(ValidationError::invalid(
            "sessions.alive_period_seconds",
            "must be greater than zero",
        ));
    }

    if config.sessions.store_timeout_ms == Some(0) {
        errors.push(ValidationError::invalid(
            "sessions.store_timeout_ms",
            "must be greater than zero",
        ));
    }

    if let Some(path) = &config.database.path
        && path.as_os_str().is_empty()
    {
        errors.push(ValidationError::invalid("database.path", "cannot be empty"));
    }

    let backend = config.directory.backend.as_deref().unwrap_or(BACKEND_REDIS);
    match backend {
        BACKEND_REDIS => {
            if let Some(host) = &config.directory.host
                && host.trim().is_empty()
            {
                errors.push(ValidationError::invalid("directory.host", "cannot be empty"));
            }
            if config.directory.port == Some(0) {
                errors.push(ValidationError::invalid("directory.port", "cannot be zero"));
            }
            if let Some(db) = config.directory.db
                && db < 0
            {
                errors.push(ValidationError::invalid(
                    "directory.db",
                    format!("{} is negative", db),
                ));
            }
        }
        BACKEND_MEMORY => {}
        other => errors.push(ValidationError::UnknownBackend(other.to_string())),
    }

    errors
}
