//! Session directory for alicd
//!
//! A key-value namespace where each session key carries its own expiry.
//! The backend's expiry is the only cleanup mechanism: there is no reaper.
//!
//! - [`SessionDirectory`]: async trait the lifecycle manager talks to
//! - [`effective_ttl`]: reconciles the heartbeat window with license expiry
//! - [`RedisDirectory`]: production backend
//! - [`MemoryDirectory`]: in-process backend for tests and single-node use

mod memory;
mod redis_directory;
mod traits;
mod ttl;

pub use memory::*;
pub use redis_directory::*;
pub use traits::*;
pub use ttl::*;
