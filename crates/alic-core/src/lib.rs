//! Licensing engine and session lifecycle for alicd
//!
//! This crate is the heart of alicd, containing:
//! - License checks (key lookup, period, installation and session limits)
//! - The session key format and its create/renew/end/count operations
//! - TTL selection so a session never outlives its license

mod engine;
mod session;

pub use engine::*;
pub use session::*;

use alic_directory::DirectoryError;
use alic_store::StoreError;
use thiserror::Error;

/// Infrastructure faults. Business denials are never errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Entitlement store failed during {op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Session directory failed during {op}: {source}")]
    Directory {
        op: &'static str,
        #[source]
        source: DirectoryError,
    },

    #[error("Entitlement store task failed during {op}: {source}")]
    StoreTask {
        op: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("No unique session key after {attempts} attempts")]
    KeyCollision { attempts: u32 },
}

impl CoreError {
    /// Name of the operation that failed
    pub fn op(&self) -> &'static str {
        match self {
            CoreError::Store { op, .. }
            | CoreError::Directory { op, .. }
            | CoreError::StoreTask { op, .. } => op,
            CoreError::KeyCollision { .. } => "create_session",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
