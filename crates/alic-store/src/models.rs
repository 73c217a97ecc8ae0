//! Entitlement records

use alic_util::{Fingerprint, InstallationId, LicenseKey, ProductId, SignatureId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// License policy shared by many signatures.
///
/// `None` on a limit means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Max distinct fingerprints per signature
    pub install_limit: Option<u32>,
    /// Max concurrently live sessions per signature
    pub session_limit: Option<u32>,
    /// Validity from first activation
    pub period: Option<Duration>,
    pub additional_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub id: SignatureId,
    pub license_key: LicenseKey,
    pub product_id: ProductId,
    /// Null until the first accepted check, immutable afterwards
    pub activation_date: Option<DateTime<Utc>>,
    pub additional_content: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub id: InstallationId,
    pub signature_id: SignatureId,
    pub fingerprint: Fingerprint,
}

/// A signature with its product and installations, loaded together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    pub signature: Signature,
    pub product: Product,
    pub installations: Vec<Installation>,
}

impl SignatureRecord {
    pub fn installation_for(&self, fingerprint: &Fingerprint) -> Option<&Installation> {
        self.installations
            .iter()
            .find(|i| &i.fingerprint == fingerprint)
    }
}

/// Fields for a new product
#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub name: String,
    pub install_limit: Option<u32>,
    pub session_limit: Option<u32>,
    pub period: Option<Duration>,
    pub additional_content: String,
}

impl NewProduct {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn install_limit(mut self, limit: u32) -> Self {
        self.install_limit = Some(limit);
        self
    }

    pub fn session_limit(mut self, limit: u32) -> Self {
        self.session_limit = Some(limit);
        self
    }

    pub fn period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    pub fn additional_content(mut self, content: impl Into<String>) -> Self {
        self.additional_content = content.into();
        self
    }
}

/// Fields for a new signature
#[derive(Debug, Clone)]
pub struct NewSignature {
    pub license_key: LicenseKey,
    pub product_id: ProductId,
    pub additional_content: String,
    pub comment: String,
    /// Pre-activated signatures start their period immediately
    pub activation_date: Option<DateTime<Utc>>,
}

impl NewSignature {
    pub fn new(license_key: impl Into<LicenseKey>, product_id: ProductId) -> Self {
        Self {
            license_key: license_key.into(),
            product_id,
            additional_content: String::new(),
            comment: String::new(),
            activation_date: None,
        }
    }

    pub fn additional_content(mut self, content: impl Into<String>) -> Self {
        self.additional_content = content.into();
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn activated_at(mut self, at: DateTime<Utc>) -> Self {
        self.activation_date = Some(at);
        self
    }
}

/// Writes that follow an accepted check, applied in one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckCommit {
    pub signature_id: SignatureId,
    /// Set as activation date only if the signature has none yet
    pub activate_at: Option<DateTime<Utc>>,
    /// Fingerprint to bind, if it is not bound already
    pub new_installation: Option<Fingerprint>,
    /// Limit re-checked inside the transaction before binding
    pub install_limit: Option<u32>,
}

/// Result of [`crate::EntitlementStore::commit_check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Writes applied; carries the activation date now on record
    Committed {
        activation_date: Option<DateTime<Utc>>,
    },
    /// A concurrent check took the last installation slot; nothing was written
    InstallLimitReached,
}
