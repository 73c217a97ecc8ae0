//! Session directory trait

use async_trait::async_trait;
use thiserror::Error;

use crate::Ttl;

/// Errors from directory operations
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Directory call '{op}' timed out")]
    Timeout { op: &'static str },

    #[error("Directory unavailable")]
    Unavailable,
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Key space of live sessions.
///
/// Every key expires on its own; implementations must never return a key
/// whose expiry has been reached.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// Write `key` only if absent. Returns false if it already existed.
    async fn insert(&self, key: &str, ttl: Ttl) -> DirectoryResult<bool>;

    /// Re-arm `key` only if present. Returns false if it was gone.
    async fn refresh(&self, key: &str, ttl: Ttl) -> DirectoryResult<bool>;

    async fn exists(&self, key: &str) -> DirectoryResult<bool>;

    /// Remove `key`. Returns false if it was gone.
    async fn delete(&self, key: &str) -> DirectoryResult<bool>;

    /// Live keys matching a glob pattern (`*` wildcards)
    async fn scan(&self, pattern: &str) -> DirectoryResult<Vec<String>>;

    async fn is_healthy(&self) -> bool;
}
