//! Store trait definitions

use alic_util::{LicenseKey, SignatureId};

use crate::{
    CheckCommit, CommitOutcome, NewProduct, NewSignature, Product, Signature, SignatureRecord,
    StoreResult,
};

/// Persistent entitlement records
pub trait EntitlementStore: Send + Sync {
    // Licensing

    /// Look up a signature by key, with its product and installations
    fn find_signature(&self, license_key: &LicenseKey) -> StoreResult<Option<SignatureRecord>>;

    /// Apply activation and installation writes atomically
    fn commit_check(&self, commit: &CheckCommit) -> StoreResult<CommitOutcome>;

    // Administration

    fn create_product(&self, product: &NewProduct) -> StoreResult<Product>;

    fn create_signature(&self, signature: &NewSignature) -> StoreResult<Signature>;

    fn get_signature(&self, id: SignatureId) -> StoreResult<Option<Signature>>;

    fn count_installations(&self, id: SignatureId) -> StoreResult<u64>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
