//! Client for alicd
//!
//! Wraps the HTTP API in typed calls. Transport failures, undecodable
//! bodies and 5xx responses are retried under a [`RetryPolicy`]; denials
//! and unknown sessions come back as values, not errors.

mod client;
mod fingerprint;
mod keepalive;
mod retry;

pub use client::*;
pub use fingerprint::*;
pub use keepalive::*;
pub use retry::*;
