//! Stratus: lease-locked checkout/checkin of shared SQLite files.
//!
//! A SQLite database that lives in blob storage cannot be opened by several
//! writers at once. Stratus mirrors the remote file into a local cache and
//! serializes writers with a lock marker stored next to the file.
//!
//! # Architecture
//!
//! - **Lock markers**: a small JSON record `<key>.lock` names the holder and
//!   acquisition time; optimistic write-then-confirm acquisition
//! - **Leases**: markers older than the lease window are reclaimable, so a
//!   crashed client never blocks the file forever
//! - **Checkout/checkin**: lock → sync down → use locally → sync up → unlock,
//!   with the unlock step guaranteed on every failure path
//!
//! # Modules
//!
//! - [`cache`]: Local cache mirror with mtime-based staleness
//! - [`config`]: CLI and environment configuration
//! - [`error`]: Crate-level error type
//! - [`file`]: Protected file reference
//! - [`identity`]: Holder identity and display names
//! - [`instance`]: Instance settings driving a session
//! - [`lock`]: Lock marker protocol, lease policy, no-op lock
//! - [`observability`]: Tracing setup
//! - [`session`]: Checkout/checkin orchestrator and guarded invocation
//! - [`store`]: Blob store trait and adapters

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // lock::LockMarker is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc       // Panic docs can be verbose
)]

pub mod cache;
pub mod config;
pub mod error;
pub mod file;
pub mod identity;
pub mod instance;
pub mod lock;
pub mod observability;
pub mod session;
pub mod store;

pub use error::{Error, Result};
pub use file::FileRef;
pub use session::{CheckoutGuard, Session, SessionState};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    system_time_millis(SystemTime::now())
}

/// Convert a wall-clock time to Unix milliseconds.
///
/// Times before the epoch clamp to 0.
#[must_use]
pub fn system_time_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Convert Unix milliseconds back to a wall-clock time.
#[must_use]
pub fn millis_to_system_time(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}
