//! Blob store abstraction.
//!
//! The database file and its lock marker live in a store that offers plain
//! get/put/delete on whole objects, with no conditional writes. Adapters:
//! - [`MemoryStore`]: in-process fake with a controllable clock
//! - [`LocalStore`]: a directory, e.g. a mounted bucket or network share

pub mod local;
pub mod memory;

pub use local::LocalStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::SystemTime;
use thiserror::Error;

/// Error type for blob store operations.
///
/// Callers rely on telling a missing object apart from a forbidden one:
/// a missing marker means "unlocked", a forbidden marker means "read-only
/// deployment".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("access forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the error reports a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Remote object storage holding the shared database and its marker.
///
/// Keys are `/`-separated relative paths. Every call is a network round trip
/// and therefore an await point; none of them is retried here.
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    /// Read the whole object.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or overwrite the object.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError>;

    /// Whether the object exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete the object. Missing objects yield [`StoreError::NotFound`].
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Last modification time of the object.
    async fn modified_time(&self, key: &str) -> Result<SystemTime, StoreError>;
}
