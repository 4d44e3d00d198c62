//! In-memory blob store.
//!
//! Stands in for a remote bucket in tests and simulations. Modification times
//! come from a shared [`Clock`] so lease expiry and cache staleness can be
//! driven deterministically. Every call yields to the scheduler first, which
//! lets concurrently polled clients interleave the way network round trips do.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use super::{BlobStore, StoreError};
use crate::lock::lease::{Clock, SystemClock};
use crate::millis_to_system_time;

#[derive(Debug, Clone)]
struct Object {
    data: Vec<u8>,
    modified: i64,
}

/// Access a client is denied on keys with a given suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    /// Writes and deletes fail; reads succeed.
    Writes,
    /// Every operation fails.
    All,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<String, Object>,
    denied: Vec<(String, Denied)>,
    offline: bool,
}

/// Shared in-memory object map.
///
/// Clones share the same objects, so several clients can be pointed at one
/// "bucket".
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store stamping modification times from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    /// A view of the same objects with its own access restrictions.
    ///
    /// Models a second client whose credentials differ.
    pub fn restricted(&self, suffix: &str, denied: Denied) -> RestrictedStore {
        RestrictedStore {
            inner: self.clone(),
            rules: vec![(suffix.to_string(), denied)],
        }
    }

    /// Deny access to keys ending in `suffix` for every client of this store.
    pub fn deny(&self, suffix: &str, denied: Denied) {
        self.lock().denied.push((suffix.to_string(), denied));
    }

    /// Make every operation fail as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Store an object with an explicit modification time.
    pub fn insert_raw(&self, key: &str, data: Vec<u8>, modified: i64) {
        self.lock()
            .objects
            .insert(key.to_string(), Object { data, modified });
    }

    /// Raw contents, bypassing access rules.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).map(|o| o.data.clone())
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned map is still structurally valid.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, key: &str, write: bool, extra: &[(String, Denied)]) -> Result<(), StoreError> {
        let state = self.lock();
        if state.offline {
            return Err(StoreError::Unavailable(format!("store offline, cannot reach '{key}'")));
        }
        let denied = state.denied.iter().chain(extra.iter()).any(|(suffix, rule)| {
            key.ends_with(suffix.as_str()) && (write || *rule == Denied::All)
        });
        if denied {
            Err(StoreError::Forbidden(key.to_string()))
        } else {
            Ok(())
        }
    }

    async fn get_with(&self, key: &str, extra: &[(String, Denied)]) -> Result<Vec<u8>, StoreError> {
        tokio::task::yield_now().await;
        self.check(key, false, extra)?;
        self.lock()
            .objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put_with(
        &self,
        key: &str,
        data: Vec<u8>,
        extra: &[(String, Denied)],
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.check(key, true, extra)?;
        let modified = self.clock.now_millis();
        self.lock()
            .objects
            .insert(key.to_string(), Object { data, modified });
        Ok(())
    }

    async fn exists_with(&self, key: &str, extra: &[(String, Denied)]) -> Result<bool, StoreError> {
        tokio::task::yield_now().await;
        self.check(key, false, extra)?;
        Ok(self.lock().objects.contains_key(key))
    }

    async fn delete_with(&self, key: &str, extra: &[(String, Denied)]) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.check(key, true, extra)?;
        self.lock()
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn modified_with(
        &self,
        key: &str,
        extra: &[(String, Denied)],
    ) -> Result<SystemTime, StoreError> {
        tokio::task::yield_now().await;
        self.check(key, false, extra)?;
        self.lock()
            .objects
            .get(key)
            .map(|o| millis_to_system_time(o.modified))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.get_with(key, &[]).await
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        self.put_with(key, data, &[]).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.exists_with(key, &[]).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.delete_with(key, &[]).await
    }

    async fn modified_time(&self, key: &str) -> Result<SystemTime, StoreError> {
        self.modified_with(key, &[]).await
    }
}

/// A [`MemoryStore`] view carrying per-client access rules.
#[derive(Debug, Clone)]
pub struct RestrictedStore {
    inner: MemoryStore,
    rules: Vec<(String, Denied)>,
}

#[async_trait]
impl BlobStore for RestrictedStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.get_with(key, &self.rules).await
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        self.inner.put_with(key, data, &self.rules).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists_with(key, &self.rules).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete_with(key, &self.rules).await
    }

    async fn modified_time(&self, key: &str) -> Result<SystemTime, StoreError> {
        self.inner.modified_with(key, &self.rules).await
    }
}
