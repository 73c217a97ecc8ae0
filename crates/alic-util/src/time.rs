//! Time utilities for alicd
//!
//! All licensing arithmetic runs on UTC wall-clock time. Components that need
//! "now" take it either as an explicit argument or through a [`Clock`], so
//! tests can drive expiry without sleeping.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `ALIC_MOCK_TIME` environment variable can be set
//! to override the system time for [`now`]. The mock time advances at the
//! same rate as real time from process start.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` in UTC (e.g., `2025-12-25 14:30:00`)

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "ALIC_MOCK_TIME";

/// Format accepted by `ALIC_MOCK_TIME`
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static MOCK_TIME_OFFSET: OnceLock<Option<TimeDelta>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Utc::now()
fn get_mock_time_offset() -> Option<TimeDelta> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match parse_mock_time(&mock_time_str) {
                    Some(mock_dt) => {
                        let offset = mock_dt.signed_duration_since(Utc::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    None => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = MOCK_TIME_FORMAT,
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

fn parse_mock_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, MOCK_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current UTC time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Utc> {
    let real_now = Utc::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by [`now`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}

/// Manually advanced clock for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Start at the current wall-clock time, truncated to whole seconds
    pub fn starting_now() -> Self {
        let start = from_epoch_seconds(now().timestamp()).unwrap_or_else(now);
        Self::new(start)
    }

    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = current.checked_add_signed(delta) {
            *current = next;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Seconds since the Unix epoch
pub fn to_epoch_seconds(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

/// Inverse of [`to_epoch_seconds`]; None when out of chrono's range
pub fn from_epoch_seconds(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Add a std duration to a timestamp, None on overflow
pub fn checked_add(dt: DateTime<Utc>, by: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| dt.checked_add_signed(delta))
}

/// Format a duration as a human-readable string
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let days = total_secs / 86400;
    let hours = (total_secs % 86400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
