//! Clock abstraction for lotus.
//!
//! Provides a trait for getting the current time, with real and mock implementations
//! so that entry names (which embed a creation timestamp) are deterministic in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{TimeZone, Utc};

/// Trait for getting the current Unix timestamp.
pub trait Clock: Send + Sync {
    /// Returns the current time as Unix seconds since epoch.
    fn now_unix_sec(&self) -> u64;
}

/// Real system clock implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_sec(&self) -> u64 {
        // A clock set before 1970 yields 0 rather than aborting a capture session.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Mock clock for testing with a fixed timestamp.
#[derive(Debug, Clone, Copy)]
pub struct MockClock {
    timestamp: u64,
}

impl MockClock {
    /// Create a mock clock with a fixed timestamp.
    pub fn new(timestamp: u64) -> Self {
        Self { timestamp }
    }
}

impl Clock for MockClock {
    fn now_unix_sec(&self) -> u64 {
        self.timestamp
    }
}

/// Mock clock that auto-advances time on each call.
#[derive(Debug)]
pub struct AdvancingClock {
    timestamp: AtomicU64,
    increment: u64,
}

impl AdvancingClock {
    /// Create an advancing clock starting at `timestamp` and incrementing by `increment` each call.
    pub fn new(timestamp: u64, increment: u64) -> Self {
        Self {
            timestamp: AtomicU64::new(timestamp),
            increment,
        }
    }
}

impl Clock for AdvancingClock {
    fn now_unix_sec(&self) -> u64 {
        self.timestamp.fetch_add(self.increment, Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now_unix_sec(&self) -> u64 {
        (**self).now_unix_sec()
    }
}

/// Render the timestamp component of a log or archive name.
///
/// Format: `YYYY-MM-DD-HH-MM-SS` (UTC, 24-hour).
pub fn format_entry_timestamp(unix_sec: u64) -> String {
    i64::try_from(unix_sec)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .map(|dt| dt.format("%Y-%m-%d-%H-%M-%S").to_string())
        .unwrap_or_else(|| unix_sec.to_string())
}
