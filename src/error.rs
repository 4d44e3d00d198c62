//! Crate-level error type.
//!
//! Lower layers carry their own error enums ([`StoreError`],
//! [`LockError`], [`CacheError`]); everything a caller of [`Session`]
//! sees is folded into [`Error`].
//!
//! [`Session`]: crate::session::Session

use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheError;
use crate::lock::lease::format_duration;
use crate::lock::LockError;
use crate::store::StoreError;

/// Result alias using the crate error.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by checkout, checkin, and the instance layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A non-expired marker belongs to another identity.
    #[error("{}", describe_denial(.holder, .holder_name.as_deref(), *.remaining))]
    LockDenied {
        /// Opaque identity of the current holder.
        holder: String,
        /// Human-readable name of the holder, when resolvable.
        holder_name: Option<String>,
        /// Time left until the holder's lease runs out.
        remaining: Duration,
    },

    /// The marker changed underneath an acquisition attempt.
    #[error("lock marker for '{0}' changed during acquisition, retry the checkout")]
    Contended(String),

    /// Access to the storage location is forbidden.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The blob store could not be reached or failed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Local modification time bookkeeping disagrees with the remote.
    #[error("local cache of '{0}' is inconsistent with the remote copy")]
    StaleLocalState(String),

    /// The remote database file does not exist.
    #[error("database file '{0}' does not exist")]
    NotFound(String),

    /// A lock marker could not be decoded.
    #[error("invalid lock marker at '{key}': {source}")]
    InvalidMarker {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The session is not in a state that allows the operation.
    #[error("'{0}' is not checked out")]
    NotCheckedOut(String),

    /// Local filesystem failure on the cache.
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite failure on the checked-out file.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl Error {
    /// Whether this is a denial caused by another holder.
    pub fn is_lock_denied(&self) -> bool {
        matches!(self, Self::LockDenied { .. })
    }
}

fn describe_denial(holder: &str, holder_name: Option<&str>, remaining: Duration) -> String {
    let who = match holder_name {
        Some(name) => format!("{name} (uid: '{holder}')"),
        None => format!("uid: '{holder}'"),
    };
    format!(
        "cannot check out, it is locked by {who}; the lock is released automatically in {} of no activity",
        format_duration(remaining)
    )
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => Self::NotFound(key),
            StoreError::Forbidden(msg) => Self::PermissionDenied(msg),
            StoreError::Unavailable(msg) => Self::StorageUnavailable(msg),
        }
    }
}

impl From<LockError> for Error {
    fn from(err: LockError) -> Self {
        match err {
            LockError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            LockError::StorageUnavailable(msg) => Self::StorageUnavailable(msg),
            LockError::InvalidMarker { key, source } => Self::InvalidMarker { key, source },
        }
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Store(e) => e.into(),
            CacheError::Io(e) => Self::Io(e),
            CacheError::StaleLocalState { key } => Self::StaleLocalState(key),
        }
    }
}
