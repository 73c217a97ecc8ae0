//! Request and response bodies for the alicd HTTP API

use serde::{Deserialize, Serialize};

use crate::DenialReason;

/// Body of a license check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckLicenseRequest {
    pub license_key: String,
    pub fingerprint: String,
}

impl CheckLicenseRequest {
    pub fn new(license_key: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            license_key: license_key.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

/// Body of keepalive and end-session calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdRequest {
    pub session_id: String,
}

impl SessionIdRequest {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

/// Granted license check (HTTP 200)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodLicense {
    pub success: bool,
    pub session_id: String,
    pub additional_content_signature: String,
    pub additional_content_product: String,
}

impl GoodLicense {
    pub fn new(
        session_id: impl Into<String>,
        additional_content_signature: impl Into<String>,
        additional_content_product: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            session_id: session_id.into(),
            additional_content_signature: additional_content_signature.into(),
            additional_content_product: additional_content_product.into(),
        }
    }
}

/// Refused license check (HTTP 403)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadLicense {
    pub success: bool,
    pub error: DenialReason,
    #[serde(default)]
    pub message: String,
}

impl BadLicense {
    pub fn new(error: DenialReason) -> Self {
        Self {
            success: false,
            error,
            message: error.message().to_string(),
        }
    }
}

/// `{"success": true}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Successful {
    pub success: bool,
}

impl Default for Successful {
    fn default() -> Self {
        Self { success: true }
    }
}

/// Error body for non-business failures (404, 5xx)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ErrorDetail {
    pub const SESSION_NOT_FOUND: &'static str = "Session not found";
    pub const INTERNAL: &'static str = "Internal server error";

    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    pub fn session_not_found() -> Self {
        Self::new(Self::SESSION_NOT_FOUND)
    }

    pub fn internal() -> Self {
        Self::new(Self::INTERNAL)
    }
}
