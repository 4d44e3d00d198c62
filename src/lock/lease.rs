//! Lease/expiration policy.
//!
//! A marker whose age exceeds the lease window counts as abandoned: a client
//! that crashed or lost connectivity without releasing must not block the file
//! forever. The window is one global duration, never stored per marker.
//!
//! The policy also carries the settle delay a writer waits between putting
//! its marker and reading it back (see [`MarkerLock`](super::MarkerLock)).

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use super::marker::LockMarker;
use crate::now_millis;

/// Default lease window (7 days).
pub const DEFAULT_LEASE_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default wait between writing a marker and confirming it.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(250);

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Source of wall-clock time in Unix milliseconds.
pub trait Clock: Send + Sync + Debug {
    fn now_millis(&self) -> i64;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        now_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Create a clock reading `millis`.
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(by, Ordering::SeqCst);
    }

    /// Set the clock to an absolute reading.
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Decides when a marker is abandoned, and how long a fresh one settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasePolicy {
    window: Duration,
    settle: Duration,
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LEASE_WINDOW)
    }
}

impl LeasePolicy {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            settle: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Replace the settle delay.
    ///
    /// Mutual exclusion holds as long as no competing client takes longer than
    /// this between reading the marker and its write landing.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Lease window of `days` days.
    pub fn from_days(days: u64) -> Self {
        Self::new(Duration::from_secs(days.saturating_mul(SECS_PER_DAY)))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Time elapsed since the marker was written. Clock skew clamps to zero.
    pub fn age(&self, marker: &LockMarker, now: i64) -> Duration {
        millis_to_duration(now.saturating_sub(marker.acquired_at))
    }

    /// A marker is expired once its age strictly exceeds the window.
    pub fn is_expired(&self, marker: &LockMarker, now: i64) -> bool {
        self.age(marker, now) > self.window
    }

    /// Time left before the marker expires, zero once expired.
    pub fn remaining(&self, marker: &LockMarker, now: i64) -> Duration {
        self.window.saturating_sub(self.age(marker, now))
    }

    /// Whether a lease taken at `acquired_at` still runs at `now`.
    pub fn covers(&self, acquired_at: i64, now: i64) -> bool {
        millis_to_duration(now.saturating_sub(acquired_at)) <= self.window
    }
}

fn millis_to_duration(millis: i64) -> Duration {
    Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

/// Render a duration for lock diagnostics, e.g. `6d 23h`, `4h 10m`, `35s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let days = secs / SECS_PER_DAY;
    let hours = (secs % SECS_PER_DAY) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{secs}s")
    }
}
