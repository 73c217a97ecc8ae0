//! Entitlement store for alicd
//!
//! Provides:
//! - Products (license policy templates with optional limits and period)
//! - Signatures (one per license key, activated on first accepted check)
//! - Installations (fingerprints bound to a signature)
//! - The atomic commit that follows an accepted check

mod models;
mod sqlite;
mod traits;

pub use models::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
