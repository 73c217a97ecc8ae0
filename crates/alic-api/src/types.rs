//! Shared types for the alicd API

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a license check was refused.
///
/// These are expected business outcomes, not faults: clients branch on them
/// to pick a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DenialReason {
    /// No signature matches the license key
    InvalidKey,
    /// The product period has elapsed since first activation
    LicenseExpired,
    /// A new fingerprint would exceed the product's install limit
    InstallationsLimitExceeded,
    /// The signature already has as many live sessions as allowed
    SessionsLimitExceeded,
}

impl DenialReason {
    pub const ALL: [DenialReason; 4] = [
        DenialReason::InvalidKey,
        DenialReason::LicenseExpired,
        DenialReason::InstallationsLimitExceeded,
        DenialReason::SessionsLimitExceeded,
    ];

    /// Human-readable explanation
    pub fn message(&self) -> &'static str {
        match self {
            DenialReason::InvalidKey => "Invalid license key",
            DenialReason::LicenseExpired => "License expired",
            DenialReason::InstallationsLimitExceeded => "Installations limit exceeded",
            DenialReason::SessionsLimitExceeded => "Sessions limit exceeded",
        }
    }

    /// Stable identifier as it appears on the wire
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::InvalidKey => "InvalidKey",
            DenialReason::LicenseExpired => "LicenseExpired",
            DenialReason::InstallationsLimitExceeded => "InstallationsLimitExceeded",
            DenialReason::SessionsLimitExceeded => "SessionsLimitExceeded",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub api_version: u32,
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub directory_ok: bool,
}

impl HealthStatus {
    pub fn new(store_ok: bool, directory_ok: bool) -> Self {
        Self {
            api_version: crate::API_VERSION,
            live: true,
            ready: store_ok && directory_ok,
            store_ok,
            directory_ok,
        }
    }
}
