//! Test utilities for Stratus integration tests.
//!
//! Provides:
//! - A shared in-memory "bucket" driven by a manual clock
//! - Sessions for several simulated clients, each with its own cache dir
//! - A store view with slow writes for acquisition races
//! - Polling helper for background work

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use stratus::cache::CacheMirror;
use stratus::identity::{StaticIdentity, UserInfo};
use stratus::lock::{LeasePolicy, ManualClock};
use stratus::store::{BlobStore, MemoryStore, StoreError};
use stratus::Session;
use tempfile::TempDir;

/// Remote key of the protected database in every fixture.
pub const DB_KEY: &str = "0190c0de/db.sqlite";

/// Marker key protecting [`DB_KEY`].
pub const MARKER_KEY: &str = "0190c0de/db.sqlite.lock";

/// Start of the simulated timeline (2023-11-14T22:13:20Z).
pub const T0: i64 = 1_700_000_000_000;

pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Several clients sharing one in-memory store and one clock.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Root of every client's cache directory
    pub temp_dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub store: MemoryStore,
    pub lease: LeasePolicy,
}

impl TestFixture {
    /// Create a fixture with a 7-day lease starting at [`T0`].
    ///
    /// Markers are confirmed without a settle delay; race tests set their own.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let clock = Arc::new(ManualClock::new(T0));
        let store = MemoryStore::with_clock(clock.clone());
        Self {
            temp_dir,
            clock,
            store,
            lease: LeasePolicy::from_days(7).with_settle(Duration::ZERO),
        }
    }

    /// Cache directory of the client named `identity`.
    pub fn cache_dir(&self, identity: &str) -> PathBuf {
        self.temp_dir.path().join(identity)
    }

    /// Session for `identity` on the shared store.
    pub fn session(&self, identity: &str) -> Session {
        self.session_on(Arc::new(self.store.clone()), identity)
    }

    /// Session for `identity` over a custom view of the store.
    pub fn session_on(&self, store: Arc<dyn BlobStore>, identity: &str) -> Session {
        let mirror = CacheMirror::new(store, self.cache_dir(identity));
        let file = mirror.file_ref(DB_KEY);
        let identity_provider = StaticIdentity::new(identity)
            .with_user("alice", UserInfo::new("alice", Some("Alice Archer".into())))
            .with_user("bob", UserInfo::new("bob", Some("Bob Baker".into())));
        Session::new(
            file,
            mirror,
            self.lease,
            Arc::new(identity_provider),
            self.clock.clone(),
        )
    }

    /// Publish `data` as the remote database at the current time.
    pub async fn seed(&self, data: &[u8]) {
        self.store
            .put(DB_KEY, data.to_vec())
            .await
            .expect("failed to seed database");
    }

    pub fn remote_bytes(&self) -> Option<Vec<u8>> {
        self.store.peek(DB_KEY)
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// View of a store whose writes land `delay` after they are issued.
#[derive(Debug)]
pub struct SlowWrites {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowWrites {
    pub fn new(inner: &MemoryStore, delay: Duration) -> Self {
        Self {
            inner: inner.clone(),
            delay,
        }
    }
}

#[async_trait]
impl BlobStore for SlowWrites {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(key, data).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    async fn modified_time(&self, key: &str) -> Result<SystemTime, StoreError> {
        self.inner.modified_time(key).await
    }
}

/// Route library logs to the test writer.
pub fn init_tracing() {
    stratus::observability::tracing::init_test_tracing();
}

/// Wait for a condition to become true with timeout.
///
/// Returns `true` if the condition was met, `false` if the timeout expired.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.temp_dir.path().exists());
        assert!(fixture.cache_dir("alice").starts_with(fixture.temp_dir.path()));
    }
}
