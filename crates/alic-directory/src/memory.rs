//! In-process session directory

use alic_util::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{DirectoryError, DirectoryResult, SessionDirectory, Ttl};

type Entries<'a> = MutexGuard<'a, HashMap<String, DateTime<Utc>>>;

/// Session directory held in process memory.
///
/// Expiry is evaluated against the injected clock on every access, so a
/// [`alic_util::ManualClock`] drives idle and license expiry in tests.
pub struct MemoryDirectory {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl MemoryDirectory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every call fail with [`DirectoryError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.lock().values().filter(|at| **at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expiry of a live key
    pub fn expiry_of(&self, key: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.lock().get(key).copied().filter(|at| *at > now)
    }

    fn lock(&self) -> Entries<'_> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the map after dropping everything already expired
    fn live_entries(&self) -> DirectoryResult<(Entries<'_>, DateTime<Utc>)> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable);
        }
        let now = self.clock.now();
        let mut entries = self.lock();
        entries.retain(|_, at| *at > now);
        Ok((entries, now))
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

fn expiry(ttl: Ttl, now: DateTime<Utc>) -> DateTime<Utc> {
    ttl.expires_at(now).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl SessionDirectory for MemoryDirectory {
    async fn insert(&self, key: &str, ttl: Ttl) -> DirectoryResult<bool> {
        let (mut entries, now) = self.live_entries()?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        let at = expiry(ttl, now);
        if at > now {
            entries.insert(key.to_string(), at);
        }
        Ok(true)
    }

    async fn refresh(&self, key: &str, ttl: Ttl) -> DirectoryResult<bool> {
        let (mut entries, now) = self.live_entries()?;
        if !entries.contains_key(key) {
            return Ok(false);
        }
        let at = expiry(ttl, now);
        if at > now {
            entries.insert(key.to_string(), at);
        } else {
            entries.remove(key);
        }
        Ok(true)
    }

    async fn exists(&self, key: &str) -> DirectoryResult<bool> {
        let (entries, _) = self.live_entries()?;
        Ok(entries.contains_key(key))
    }

    async fn delete(&self, key: &str) -> DirectoryResult<bool> {
        let (mut entries, _) = self.live_entries()?;
        Ok(entries.remove(key).is_some())
    }

    async fn scan(&self, pattern: &str) -> DirectoryResult<Vec<String>> {
        let (entries, _) = self.live_entries()?;
        Ok(entries
            .keys()
            .filter(|key| glob_matches(pattern, key))
            .cloned()
            .collect())
    }

    async fn is_healthy(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }
}

/// Match `candidate` against a pattern where `*` spans any run of characters
pub fn glob_matches(pattern: &str, candidate: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
        return false;
    };
    if parts.len() == 1 {
        return pattern == candidate;
    }
    if candidate.len() < first.len() + last.len()
        || !candidate.starts_with(first)
        || !candidate.ends_with(last)
    {
        return false;
    }

    let mut middle = &candidate[first.len()..candidate.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match middle.find(part) {
            Some(idx) => middle = &middle[idx + part.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use alic_util::ManualClock;
    use chrono::TimeDelta;
    use std::time::Duration;

    fn directory() -> (Arc<ManualClock>, MemoryDirectory) {
        let clock = Arc::new(ManualClock::starting_now());
        let directory = MemoryDirectory::new(clock.clone());
        (clock, directory)
    }

    #[test]
    fn glob_patterns() {
        assert!(glob_matches("1:*:*", "1:0:abc"));
        assert!(glob_matches("1:*:*", "1:1700000000:abc"));
        assert!(!glob_matches("1:*:*", "11:0:abc"));
        assert!(!glob_matches("1:*:*", "1:0"));
        assert!(glob_matches("*", "anything"));
        assert!(glob_matches("exact", "exact"));
        assert!(!glob_matches("exact", "exactly"));
    }

    #[tokio::test]
    async fn insert_only_if_absent() {
        let (_, dir) = directory();
        let ttl = Ttl::Relative(Duration::from_secs(4));

        assert!(dir.insert("k", ttl).await.unwrap());
        assert!(!dir.insert("k", ttl).await.unwrap());
        assert!(dir.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn relative_ttl_expires() {
        let (clock, dir) = directory();
        dir.insert("k", Ttl::Relative(Duration::from_secs(4)))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(3));
        assert!(dir.exists("k").await.unwrap());

        clock.advance(Duration::from_secs(1));
        assert!(!dir.exists("k").await.unwrap());
        assert!(dir.scan("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_rearms_only_live_keys() {
        let (clock, dir) = directory();
        let ttl = Ttl::Relative(Duration::from_secs(4));

        assert!(!dir.refresh("k", ttl).await.unwrap());
        assert!(!dir.exists("k").await.unwrap());

        dir.insert("k", ttl).await.unwrap();
        clock.advance(Duration::from_secs(3));
        assert!(dir.refresh("k", ttl).await.unwrap());
        clock.advance(Duration::from_secs(3));
        assert!(dir.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn absolute_ttl_in_past_is_not_written() {
        let (clock, dir) = directory();
        let past = clock.now() - TimeDelta::seconds(1);

        assert!(dir.insert("k", Ttl::Absolute(past)).await.unwrap());
        assert!(!dir.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn absolute_ttl_pins_expiry() {
        let (clock, dir) = directory();
        let ends = clock.now() + TimeDelta::seconds(2);

        dir.insert("k", Ttl::Absolute(ends)).await.unwrap();
        assert_eq!(dir.expiry_of("k"), Some(ends));

        clock.advance(Duration::from_secs(2));
        assert!(!dir.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let (_, dir) = directory();
        dir.insert("k", Ttl::Relative(Duration::from_secs(4)))
            .await
            .unwrap();

        assert!(dir.delete("k").await.unwrap());
        assert!(!dir.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn scan_filters_by_pattern() {
        let (_, dir) = directory();
        let ttl = Ttl::Relative(Duration::from_secs(4));
        dir.insert("1:0:a", ttl).await.unwrap();
        dir.insert("1:0:b", ttl).await.unwrap();
        dir.insert("2:0:c", ttl).await.unwrap();

        let mut keys = dir.scan("1:*:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["1:0:a".to_string(), "1:0:b".to_string()]);
        assert_eq!(dir.len(), 3);
    }

    #[tokio::test]
    async fn unavailable_fails_every_call() {
        let (_, dir) = directory();
        dir.set_unavailable(true);

        assert!(!dir.is_healthy().await);
        assert!(matches!(
            dir.exists("k").await,
            Err(DirectoryError::Unavailable)
        ));
        assert!(matches!(
            dir.insert("k", Ttl::Relative(Duration::from_secs(1))).await,
            Err(DirectoryError::Unavailable)
        ));

        dir.set_unavailable(false);
        assert!(dir.is_healthy().await);
    }
}
