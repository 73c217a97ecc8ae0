//! Session keys and their lifecycle

use alic_directory::{effective_ttl, DirectoryError, SessionDirectory, Ttl};
use alic_util::{from_epoch_seconds, to_epoch_seconds, SignatureId};
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{CoreError, CoreResult};

/// Length of the random part of a session key
pub const SESSION_SUFFIX_LEN: usize = 32;

/// Fresh keys tried before giving up on a collision streak
pub const MAX_KEY_ATTEMPTS: u32 = 8;

/// Session identifier: `{signature_id}:{signature_ends_epoch_or_0}:{suffix}`.
///
/// The signature id and expiry travel inside the key, so counting and
/// renewing sessions needs no side table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    signature_id: SignatureId,
    signature_ends: Option<i64>,
    suffix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed session key")]
pub struct InvalidSessionKey;

impl SessionKey {
    /// New key with a random suffix; the expiry is truncated to whole seconds
    pub fn generate(signature_id: SignatureId, signature_ends: Option<DateTime<Utc>>) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_SUFFIX_LEN)
            .map(char::from)
            .collect();

        Self {
            signature_id,
            signature_ends: signature_ends.map(to_epoch_seconds),
            suffix,
        }
    }

    pub fn signature_id(&self) -> SignatureId {
        self.signature_id
    }

    /// License expiry encoded in the key, None for unlimited
    pub fn signature_ends(&self) -> Option<DateTime<Utc>> {
        self.signature_ends.and_then(from_epoch_seconds)
    }

    /// Glob matching every session of a signature
    pub fn signature_pattern(signature_id: SignatureId) -> String {
        format!("{}:*:*", signature_id)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.signature_id,
            self.signature_ends.unwrap_or(0),
            self.suffix
        )
    }
}

impl FromStr for SessionKey {
    type Err = InvalidSessionKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(id), Some(ends), Some(suffix)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(InvalidSessionKey);
        };

        let signature_id: i64 = id.parse().map_err(|_| InvalidSessionKey)?;
        let ends: i64 = ends.parse().map_err(|_| InvalidSessionKey)?;
        if ends < 0
            || suffix.len() != SESSION_SUFFIX_LEN
            || !suffix.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(InvalidSessionKey);
        }

        Ok(Self {
            signature_id: SignatureId::new(signature_id),
            signature_ends: (ends != 0).then_some(ends),
            suffix: suffix.to_string(),
        })
    }
}

/// Outcome of a heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveDecision {
    Renewed(Ttl),
    /// Expired, ended, or never existed
    NotFound,
}

/// Outcome of an explicit termination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndDecision {
    Ended,
    NotFound,
}

fn directory_fault(op: &'static str) -> impl FnOnce(DirectoryError) -> CoreError {
    move |source| {
        error!(op, error = %source, "Session directory failure");
        CoreError::Directory { op, source }
    }
}

/// Creates, renews, ends and counts sessions in the directory
pub struct SessionManager {
    directory: Arc<dyn SessionDirectory>,
    alive_period: Duration,
}

impl SessionManager {
    pub fn new(directory: Arc<dyn SessionDirectory>, alive_period: Duration) -> Self {
        Self {
            directory,
            alive_period,
        }
    }

    pub fn alive_period(&self) -> Duration {
        self.alive_period
    }

    pub fn directory(&self) -> &Arc<dyn SessionDirectory> {
        &self.directory
    }

    /// Write a new session key for a signature.
    ///
    /// Returns `None` when the expiry encoded in the key has already passed,
    /// which can happen within the last second of a license because keys
    /// carry whole seconds. Nothing is written in that case.
    pub async fn create_session(
        &self,
        signature_id: SignatureId,
        signature_ends: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<SessionKey>> {
        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = SessionKey::generate(signature_id, signature_ends);
            let ttl = effective_ttl(now, self.alive_period, key.signature_ends());

            if ttl.is_elapsed(now) {
                debug!(
                    signature_id = %signature_id,
                    "License ends now, session key not stored"
                );
                return Ok(None);
            }

            let inserted = self
                .directory
                .insert(&key.to_string(), ttl)
                .await
                .map_err(directory_fault("create_session"))?;

            if inserted {
                info!(session_id = %key, ttl = %ttl, "Session created");
                return Ok(Some(key));
            }

            debug!(signature_id = %signature_id, "Session key collision, regenerating");
        }

        error!(
            signature_id = %signature_id,
            attempts = MAX_KEY_ATTEMPTS,
            "Could not allocate a session key"
        );
        Err(CoreError::KeyCollision {
            attempts: MAX_KEY_ATTEMPTS,
        })
    }

    /// Re-arm a live session for another window, capped at its license expiry
    pub async fn keep_alive(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<KeepAliveDecision> {
        let Ok(key) = session_id.parse::<SessionKey>() else {
            debug!(session_id, "Keep-alive for malformed session key");
            return Ok(KeepAliveDecision::NotFound);
        };

        let ttl = effective_ttl(now, self.alive_period, key.signature_ends());

        if ttl.is_elapsed(now) {
            let removed = self
                .directory
                .delete(session_id)
                .await
                .map_err(directory_fault("keep_alive"))?;
            if removed {
                info!(session_id, "Session reached license expiry");
            }
            return Ok(KeepAliveDecision::NotFound);
        }

        let renewed = self
            .directory
            .refresh(session_id, ttl)
            .await
            .map_err(directory_fault("keep_alive"))?;

        if renewed {
            debug!(session_id, ttl = %ttl, "Session renewed");
            Ok(KeepAliveDecision::Renewed(ttl))
        } else {
            debug!(session_id, "Keep-alive for unknown session");
            Ok(KeepAliveDecision::NotFound)
        }
    }

    pub async fn end_session(&self, session_id: &str) -> CoreResult<EndDecision> {
        if session_id.parse::<SessionKey>().is_err() {
            return Ok(EndDecision::NotFound);
        }

        let removed = self
            .directory
            .delete(session_id)
            .await
            .map_err(directory_fault("end_session"))?;

        if removed {
            info!(session_id, "Session ended");
            Ok(EndDecision::Ended)
        } else {
            Ok(EndDecision::NotFound)
        }
    }

    /// Point-in-time count of unexpired sessions of a signature
    pub async fn count_live_sessions(&self, signature_id: SignatureId) -> CoreResult<usize> {
        let keys = self
            .directory
            .scan(&SessionKey::signature_pattern(signature_id))
            .await
            .map_err(directory_fault("count_live_sessions"))?;

        Ok(keys
            .iter()
            .filter_map(|k| k.parse::<SessionKey>().ok())
            .filter(|k| k.signature_id() == signature_id)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alic_directory::MemoryDirectory;
    use alic_util::{Clock, ManualClock};
    use chrono::TimeDelta;

    const ALIVE: Duration = Duration::from_secs(4);

    fn manager() -> (Arc<ManualClock>, Arc<MemoryDirectory>, SessionManager) {
        let clock = Arc::new(ManualClock::starting_now());
        let directory = Arc::new(MemoryDirectory::new(clock.clone()));
        let manager = SessionManager::new(directory.clone(), ALIVE);
        (clock, directory, manager)
    }

    #[test]
    fn key_format() {
        let ends = from_epoch_seconds(1_900_000_000).unwrap();
        let key = SessionKey::generate(SignatureId::new(7), Some(ends));
        let rendered = key.to_string();

        let parts: Vec<&str> = rendered.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "7");
        assert_eq!(parts[1], "1900000000");
        assert_eq!(parts[2].len(), SESSION_SUFFIX_LEN);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));

        let parsed: SessionKey = rendered.parse().unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.signature_ends(), Some(ends));
    }

    #[test]
    fn unlimited_key_encodes_zero() {
        let key = SessionKey::generate(SignatureId::new(3), None);
        assert!(key.to_string().starts_with("3:0:"));
        let parsed: SessionKey = key.to_string().parse().unwrap();
        assert_eq!(parsed.signature_ends(), None);
    }

    #[test]
    fn malformed_keys_rejected() {
        let suffix = "a".repeat(SESSION_SUFFIX_LEN);
        assert!(format!("1:0:{}", suffix).parse::<SessionKey>().is_ok());

        for bad in [
            String::new(),
            "1:0".to_string(),
            format!("x:0:{}", suffix),
            format!("1:y:{}", suffix),
            format!("1:-5:{}", suffix),
            "1:0:short".to_string(),
            format!("1:0:{}!", &suffix[1..]),
        ] {
            assert!(bad.parse::<SessionKey>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn keys_are_unique() {
        let a = SessionKey::generate(SignatureId::new(1), None);
        let b = SessionKey::generate(SignatureId::new(1), None);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn create_counts_and_ends() {
        let (clock, _, manager) = manager();
        let id = SignatureId::new(1);

        let key = manager
            .create_session(id, None, clock.now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manager.count_live_sessions(id).await.unwrap(), 1);
        assert_eq!(
            manager.count_live_sessions(SignatureId::new(2)).await.unwrap(),
            0
        );

        let session_id = key.to_string();
        assert_eq!(
            manager.end_session(&session_id).await.unwrap(),
            EndDecision::Ended
        );
        assert_eq!(
            manager.end_session(&session_id).await.unwrap(),
            EndDecision::NotFound
        );
        assert_eq!(manager.count_live_sessions(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn idle_session_expires() {
        let (clock, _, manager) = manager();
        let key = manager
            .create_session(SignatureId::new(1), None, clock.now())
            .await
            .unwrap()
            .unwrap();

        clock.advance(ALIVE);
        assert_eq!(
            manager.keep_alive(&key.to_string(), clock.now()).await.unwrap(),
            KeepAliveDecision::NotFound
        );
    }

    #[tokio::test]
    async fn heartbeat_extends_lifetime() {
        let (clock, directory, manager) = manager();
        let key = manager
            .create_session(SignatureId::new(1), None, clock.now())
            .await
            .unwrap()
            .unwrap();
        let session_id = key.to_string();

        for _ in 0..5 {
            clock.advance(Duration::from_secs(3));
            assert_eq!(
                manager.keep_alive(&session_id, clock.now()).await.unwrap(),
                KeepAliveDecision::Renewed(Ttl::Relative(ALIVE))
            );
        }
        assert_eq!(
            directory.expiry_of(&session_id),
            Some(clock.now() + TimeDelta::seconds(4))
        );
    }

    #[tokio::test]
    async fn renewal_capped_at_license_end() {
        let (clock, directory, manager) = manager();
        let ends = clock.now() + TimeDelta::seconds(6);
        let key = manager
            .create_session(SignatureId::new(1), Some(ends), clock.now())
            .await
            .unwrap()
            .unwrap();
        let session_id = key.to_string();

        clock.advance(Duration::from_secs(3));
        assert_eq!(
            manager.keep_alive(&session_id, clock.now()).await.unwrap(),
            KeepAliveDecision::Renewed(Ttl::Absolute(ends))
        );
        assert_eq!(directory.expiry_of(&session_id), Some(ends));

        // Heartbeats never stop, the license still ends the session
        clock.advance(Duration::from_secs(3));
        assert_eq!(
            manager.keep_alive(&session_id, clock.now()).await.unwrap(),
            KeepAliveDecision::NotFound
        );
    }

    #[tokio::test]
    async fn keep_alive_deletes_key_past_license_end() {
        let (clock, directory, manager) = manager();
        let ends = clock.now() + TimeDelta::seconds(100);
        let key = SessionKey::generate(SignatureId::new(1), Some(ends));

        // A key that outlives its license, as a backend with coarse expiry might keep
        directory
            .insert(&key.to_string(), Ttl::Relative(Duration::from_secs(1000)))
            .await
            .unwrap();
        clock.set(ends);
        assert!(directory.exists(&key.to_string()).await.unwrap());

        assert_eq!(
            manager.keep_alive(&key.to_string(), clock.now()).await.unwrap(),
            KeepAliveDecision::NotFound
        );
        assert!(!directory.exists(&key.to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn session_for_ended_license_is_not_stored() {
        let (clock, directory, manager) = manager();
        let created = manager
            .create_session(SignatureId::new(1), Some(clock.now()), clock.now())
            .await
            .unwrap();

        assert!(created.is_none());
        assert!(directory.is_empty());
    }

    #[tokio::test]
    async fn sub_second_remainder_is_not_stored() {
        let (clock, directory, manager) = manager();
        let start = clock.now() + TimeDelta::milliseconds(200);
        clock.set(start);
        let id = SignatureId::new(1);

        // Encoded as the whole second before `ends`, which is already past
        let ends = start + TimeDelta::milliseconds(600);
        assert!(manager
            .create_session(id, Some(ends), clock.now())
            .await
            .unwrap()
            .is_none());
        assert!(directory.is_empty());
        assert_eq!(manager.count_live_sessions(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_ids_are_not_found() {
        let (clock, _, manager) = manager();
        assert_eq!(
            manager.keep_alive("garbage", clock.now()).await.unwrap(),
            KeepAliveDecision::NotFound
        );
        assert_eq!(
            manager.end_session("garbage").await.unwrap(),
            EndDecision::NotFound
        );
    }

    #[tokio::test]
    async fn directory_failure_is_fault() {
        let (clock, directory, manager) = manager();
        directory.set_unavailable(true);

        let err = manager
            .create_session(SignatureId::new(1), None, clock.now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Directory {
                op: "create_session",
                source: DirectoryError::Unavailable
            }
        ));
    }
}
