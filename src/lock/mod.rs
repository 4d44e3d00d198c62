//! Lock marker protocol.
//!
//! Two implementations share the [`FileLock`] interface:
//! - [`MarkerLock`]: writes a marker next to the remote file and confirms it
//! - [`NoopLock`]: always grants and records nothing, for files that need no
//!   coordination or clients without write access to the marker namespace
//!
//! The store offers no conditional writes, so exclusivity is a protocol
//! convention: read, write if free, re-read to confirm.

pub mod lease;
pub mod marker;
pub mod noop;
pub mod remote;

pub use lease::{
    Clock, LeasePolicy, ManualClock, SystemClock, DEFAULT_LEASE_WINDOW, DEFAULT_SETTLE_DELAY,
};
pub use marker::{marker_key, LockMarker, MARKER_SUFFIX};
pub use noop::NoopLock;
pub use remote::MarkerLock;

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

use crate::file::FileRef;
use crate::store::StoreError;

/// Error type for lock protocol operations.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("no access to lock marker: {0}")]
    PermissionDenied(String),

    #[error("lock store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("invalid lock marker at '{key}': {source}")]
    InvalidMarker {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<StoreError> for LockError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Forbidden(key) => Self::PermissionDenied(key),
            StoreError::Unavailable(msg) => Self::StorageUnavailable(msg),
            StoreError::NotFound(key) => {
                Self::StorageUnavailable(format!("'{key}' disappeared during the operation"))
            }
        }
    }
}

/// Current marker state, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerInfo {
    pub holder: String,
    pub acquired_at: i64,
    pub age: Duration,
    /// Time until the lease runs out; zero once expired.
    pub remaining: Duration,
    pub expired: bool,
}

impl MarkerInfo {
    pub fn from_marker(marker: &LockMarker, lease: &LeasePolicy, now: i64) -> Self {
        Self {
            holder: marker.holder.clone(),
            acquired_at: marker.acquired_at,
            age: lease.age(marker, now),
            remaining: lease.remaining(marker, now),
            expired: lease.is_expired(marker, now),
        }
    }
}

/// Process-local belief about lock ownership. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    holder: String,
    acquired: bool,
    acquired_at: Option<i64>,
    denied_by: Option<MarkerInfo>,
    released: bool,
}

impl LockHandle {
    /// A successful acquisition confirmed at `acquired_at`.
    pub fn granted(holder: impl Into<String>, acquired_at: i64) -> Self {
        Self {
            holder: holder.into(),
            acquired: true,
            acquired_at: Some(acquired_at),
            denied_by: None,
            released: false,
        }
    }

    /// A failed acquisition; `denied_by` is the holder of record, if known.
    pub fn denied(holder: impl Into<String>, denied_by: Option<MarkerInfo>) -> Self {
        Self {
            holder: holder.into(),
            acquired: false,
            acquired_at: None,
            denied_by,
            released: false,
        }
    }

    /// Identity this handle acquired for.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn acquired(&self) -> bool {
        self.acquired
    }

    pub fn acquired_at(&self) -> Option<i64> {
        self.acquired_at
    }

    /// Holder of record when the acquisition was denied.
    pub fn locked_by(&self) -> Option<&str> {
        self.denied_by.as_ref().map(|info| info.holder.as_str())
    }

    pub fn denial(&self) -> Option<&MarkerInfo> {
        self.denied_by.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Record a local release.
    pub fn mark_released(&mut self) {
        self.released = true;
    }
}

/// Mutual exclusion over one protected file.
#[async_trait]
pub trait FileLock: Send + Sync + Debug {
    /// Try to take the lock for `identity`.
    ///
    /// A denial is a successful call returning a handle with
    /// `acquired() == false`; errors are reserved for storage failures.
    async fn acquire(&self, file: &FileRef, identity: &str) -> Result<LockHandle, LockError>;

    /// Drop the marker if `identity` holds it. Never fails on absent or
    /// foreign markers.
    async fn release(&self, file: &FileRef, identity: &str) -> Result<(), LockError>;

    /// Current holder and age, if a marker exists.
    async fn inspect(&self, file: &FileRef) -> Result<Option<MarkerInfo>, LockError>;

    /// Remove any marker regardless of holder. Administrative use only.
    async fn break_lock(&self, file: &FileRef) -> Result<(), LockError>;

    /// Whether the handle still represents a live lock as far as this
    /// process knows.
    fn is_held(&self, handle: &LockHandle) -> bool;

    /// Whether this lock writes markers at all.
    fn is_coordinated(&self) -> bool;
}
