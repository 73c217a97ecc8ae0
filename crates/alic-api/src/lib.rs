//! Protocol types for the alicd HTTP API
//!
//! This crate defines the stable contract between alicd and licensed clients:
//! - Request bodies
//! - Success and failure responses
//! - Denial reasons
//! - Route paths and versioning

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;

/// Route for checking a license and opening a session
pub const CHECK_LICENSE_PATH: &str = "/check_license";

/// Route for session heartbeats
pub const KEEPALIVE_PATH: &str = "/keepalive";

/// Route for explicit session termination
pub const END_SESSION_PATH: &str = "/end_session";

/// Route for liveness/readiness probes
pub const HEALTH_PATH: &str = "/health";
