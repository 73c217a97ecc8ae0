//! Session expiry arithmetic

use alic_util::checked_add;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// How long a session key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Expire this long after the write
    Relative(Duration),
    /// Expire at this instant
    Absolute(DateTime<Utc>),
}

impl Ttl {
    /// Instant this TTL ends if written at `now`; None past chrono's range
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Ttl::Relative(d) => checked_add(now, d),
            Ttl::Absolute(at) => Some(at),
        }
    }

    /// An absolute expiry that is already reached
    pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
        matches!(*self, Ttl::Absolute(at) if at <= now)
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ttl::Relative(d) => write!(f, "{}s", d.as_secs()),
            Ttl::Absolute(at) => write!(f, "until {}", at.to_rfc3339()),
        }
    }
}

/// TTL for a session written at `now`.
///
/// A session never outlives its signature: when `signature_ends` falls inside
/// the next heartbeat window the key is pinned to that instant, otherwise it
/// lives for one `alive_period`.
pub fn effective_ttl(
    now: DateTime<Utc>,
    alive_period: Duration,
    signature_ends: Option<DateTime<Utc>>,
) -> Ttl {
    match (signature_ends, checked_add(now, alive_period)) {
        (Some(ends), Some(window_end)) if ends <= window_end => Ttl::Absolute(ends),
        _ => Ttl::Relative(alive_period),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    const ALIVE: Duration = Duration::from_secs(4);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn no_expiry_uses_alive_period() {
        assert_eq!(effective_ttl(now(), ALIVE, None), Ttl::Relative(ALIVE));
    }

    #[test]
    fn distant_expiry_uses_alive_period() {
        let ends = now() + TimeDelta::days(30);
        assert_eq!(effective_ttl(now(), ALIVE, Some(ends)), Ttl::Relative(ALIVE));
    }

    #[test]
    fn expiry_inside_window_is_absolute() {
        let ends = now() + TimeDelta::seconds(2);
        assert_eq!(effective_ttl(now(), ALIVE, Some(ends)), Ttl::Absolute(ends));
    }

    #[test]
    fn expiry_on_window_edge_is_absolute() {
        let ends = now() + TimeDelta::seconds(4);
        assert_eq!(effective_ttl(now(), ALIVE, Some(ends)), Ttl::Absolute(ends));
    }

    #[test]
    fn past_expiry_is_absolute_and_elapsed() {
        let ends = now() - TimeDelta::seconds(10);
        let ttl = effective_ttl(now(), ALIVE, Some(ends));
        assert_eq!(ttl, Ttl::Absolute(ends));
        assert!(ttl.is_elapsed(now()));
    }

    #[test]
    fn ttl_never_outlives_signature() {
        for offset in 0..10 {
            let ends = now() + TimeDelta::seconds(offset);
            let ttl = effective_ttl(now(), ALIVE, Some(ends));
            assert!(ttl.expires_at(now()).unwrap() <= ends);
        }
    }

    #[test]
    fn relative_is_never_elapsed() {
        assert!(!Ttl::Relative(Duration::ZERO).is_elapsed(now()));
    }
}
