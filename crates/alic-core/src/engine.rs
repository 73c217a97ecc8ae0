//! Licensing engine

use alic_api::{DenialReason, HealthStatus};
use alic_store::{
    CheckCommit, CommitOutcome, EntitlementStore, SignatureRecord, StoreError, StoreResult,
};
use alic_util::{checked_add, Fingerprint, LicenseKey, SignatureId};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::{CoreError, CoreResult, EndDecision, KeepAliveDecision, SessionKey, SessionManager};

/// A session opened by an accepted check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantedSession {
    pub session_id: SessionKey,
    pub signature_id: SignatureId,
    /// None for licenses without a period
    pub signature_ends: Option<DateTime<Utc>>,
    pub additional_content_signature: String,
    pub additional_content_product: String,
}

/// License check decision from the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDecision {
    Granted(GrantedSession),
    Denied(DenialReason),
}

fn store_fault(op: &'static str) -> impl FnOnce(StoreError) -> CoreError {
    move |source| {
        error!(op, error = %source, "Entitlement store failure");
        CoreError::Store { op, source }
    }
}

/// Whether `period` has run out since `activated`.
///
/// Never-activated signatures and activation dates in the future never expire.
fn period_elapsed(
    activated: Option<DateTime<Utc>>,
    period: Option<Duration>,
    now: DateTime<Utc>,
) -> bool {
    let (Some(activated), Some(period)) = (activated, period) else {
        return false;
    };
    let elapsed = now.signed_duration_since(activated).max(TimeDelta::zero());
    match TimeDelta::from_std(period) {
        Ok(period) => elapsed > period,
        Err(_) => false,
    }
}

/// The licensing engine
pub struct LicensingEngine {
    store: Arc<dyn EntitlementStore>,
    sessions: SessionManager,
}

impl LicensingEngine {
    pub fn new(store: Arc<dyn EntitlementStore>, sessions: SessionManager) -> Self {
        info!(
            alive_period_secs = sessions.alive_period().as_secs(),
            "Licensing engine initialized"
        );
        Self { store, sessions }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn store(&self) -> &Arc<dyn EntitlementStore> {
        &self.store
    }

    /// Validate a key for a device and open a session.
    ///
    /// Gates run in order: key, period, installations, sessions. An expired
    /// license never takes a slot, and a known device is judged on its own
    /// installation before anyone's sessions are counted.
    pub async fn check_license(
        &self,
        license_key: &LicenseKey,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
    ) -> CoreResult<CheckDecision> {
        let key = license_key.clone();
        let record = self
            .with_store("find_signature", move |store| store.find_signature(&key))
            .await?;

        let Some(record) = record else {
            return Ok(self.deny(license_key, fingerprint, DenialReason::InvalidKey));
        };
        let SignatureRecord {
            signature,
            product,
            installations,
        } = &record;

        if period_elapsed(signature.activation_date, product.period, now) {
            return Ok(self.deny(license_key, fingerprint, DenialReason::LicenseExpired));
        }

        let installed = record.installation_for(fingerprint).is_some();
        if let Some(limit) = product.install_limit
            && !installed
            && installations.len() >= limit as usize
        {
            return Ok(self.deny(
                license_key,
                fingerprint,
                DenialReason::InstallationsLimitExceeded,
            ));
        }

        if let Some(limit) = product.session_limit {
            let live = self.sessions.count_live_sessions(signature.id).await?;
            if live >= limit as usize {
                debug!(signature_id = %signature.id, live, limit, "Session limit reached");
                return Ok(self.deny(license_key, fingerprint, DenialReason::SessionsLimitExceeded));
            }
        }

        let mut activation_date = signature.activation_date;
        if activation_date.is_none() || !installed {
            let commit = CheckCommit {
                signature_id: signature.id,
                activate_at: activation_date.is_none().then_some(now),
                new_installation: (!installed).then(|| fingerprint.clone()),
                install_limit: product.install_limit,
            };

            match self
                .with_store("commit_check", move |store| store.commit_check(&commit))
                .await?
            {
                CommitOutcome::Committed {
                    activation_date: stored,
                } => activation_date = stored,
                CommitOutcome::InstallLimitReached => {
                    return Ok(self.deny(
                        license_key,
                        fingerprint,
                        DenialReason::InstallationsLimitExceeded,
                    ));
                }
            }
        }

        let signature_ends = match (activation_date, product.period) {
            (Some(activated), Some(period)) => checked_add(activated, period),
            _ => None,
        };

        let Some(session_id) = self
            .sessions
            .create_session(signature.id, signature_ends, now)
            .await?
        else {
            return Ok(self.deny(license_key, fingerprint, DenialReason::LicenseExpired));
        };

        info!(
            license_key = %license_key,
            signature_id = %signature.id,
            session_id = %session_id,
            "License check granted"
        );

        Ok(CheckDecision::Granted(GrantedSession {
            session_id,
            signature_id: signature.id,
            signature_ends,
            additional_content_signature: signature.additional_content.clone(),
            additional_content_product: product.additional_content.clone(),
        }))
    }

    pub async fn keep_alive(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<KeepAliveDecision> {
        self.sessions.keep_alive(session_id, now).await
    }

    pub async fn end_session(&self, session_id: &str) -> CoreResult<EndDecision> {
        self.sessions.end_session(session_id).await
    }

    /// Readiness of both backing stores
    pub async fn health(&self) -> HealthStatus {
        let store_ok = self
            .with_store("health", |store| Ok(store.is_healthy()))
            .await
            .unwrap_or(false);
        let directory_ok = self.sessions.directory().is_healthy().await;
        HealthStatus::new(store_ok, directory_ok)
    }

    /// Run a store call on the blocking pool
    async fn with_store<T, F>(&self, op: &'static str, call: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn EntitlementStore) -> StoreResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || call(store.as_ref())).await {
            Ok(result) => result.map_err(store_fault(op)),
            Err(source) => {
                error!(op, error = %source, "Entitlement store task failed");
                Err(CoreError::StoreTask { op, source })
            }
        }
    }

    fn deny(
        &self,
        license_key: &LicenseKey,
        fingerprint: &Fingerprint,
        reason: DenialReason,
    ) -> CheckDecision {
        warn!(
            license_key = %license_key,
            fingerprint = %fingerprint,
            reason = %reason,
            "License check denied: {}",
            reason.message()
        );
        CheckDecision::Denied(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    #[test]
    fn unactivated_never_expires() {
        assert!(!period_elapsed(None, Some(Duration::from_secs(1)), at(1000)));
    }

    #[test]
    fn no_period_never_expires() {
        assert!(!period_elapsed(Some(at(0)), None, at(1_000_000)));
    }

    #[test]
    fn expiry_is_strictly_after_period() {
        let period = Some(Duration::from_secs(5));
        assert!(!period_elapsed(Some(at(0)), period, at(5)));
        assert!(period_elapsed(Some(at(0)), period, at(6)));
    }

    #[test]
    fn future_activation_is_not_expired() {
        assert!(!period_elapsed(
            Some(at(100)),
            Some(Duration::from_secs(5)),
            at(0)
        ));
    }
}
