//! Sleep abstraction for the collect command's supervision loop.

use std::time::Duration;

/// Trait for sleeping between supervision ticks.
pub trait Sleeper: Send + Sync {
    /// Sleep for the specified number of milliseconds.
    fn sleep_ms(&self, millis: u64);
}

/// Real sleeper that uses `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealSleeper;

impl Sleeper for RealSleeper {
    fn sleep_ms(&self, millis: u64) {
        std::thread::sleep(Duration::from_millis(millis));
    }
}

/// Mock sleeper for testing - returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockSleeper;

impl Sleeper for MockSleeper {
    fn sleep_ms(&self, _millis: u64) {}
}
