//! Shared utilities for alicd
//!
//! This crate provides:
//! - ID types (ProductId, SignatureId, InstallationId, LicenseKey, Fingerprint)
//! - Time utilities (wall clock, injectable clocks, epoch conversion)
//! - Default paths for config and data directories

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
