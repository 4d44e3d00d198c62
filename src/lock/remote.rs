//! Marker-based lock over a blob store.
//!
//! # How It Works
//!
//! 1. Read the marker at `<key>.lock`
//! 2. A live marker of another identity denies the request
//! 3. Otherwise (absent, expired, or our own) write a fresh marker
//! 4. Wait out the lease policy's settle delay
//! 5. Re-read: our identity means we won, anything else means a concurrent
//!    writer overwrote us and we lost
//!
//! The store has no conditional writes, so exclusion rests on timing. A racer
//! that saw the marker free before our write landed has to land its own write
//! within the settle delay, where our confirming read catches it. A racer
//! slower than that between its read and its write is granted after us and
//! both handles report the lock as held. The settle delay must therefore
//! exceed the store's worst write latency.
//!
//! The loser never rolls its write back; if its marker is the one left in
//! the store, the next attempt by the same identity reclaims it (step 3) and
//! everyone else sees it expire after the lease window.

use async_trait::async_trait;
use std::sync::Arc;

use super::lease::{Clock, LeasePolicy};
use super::marker::{marker_key, LockMarker};
use super::{FileLock, LockError, LockHandle, MarkerInfo};
use crate::file::FileRef;
use crate::store::{BlobStore, StoreError};

/// Lock persisted as a marker object next to the protected file.
#[derive(Debug, Clone)]
pub struct MarkerLock {
    store: Arc<dyn BlobStore>,
    lease: LeasePolicy,
    clock: Arc<dyn Clock>,
}

impl MarkerLock {
    pub fn new(store: Arc<dyn BlobStore>, lease: LeasePolicy, clock: Arc<dyn Clock>) -> Self {
        Self { store, lease, clock }
    }

    pub fn lease(&self) -> &LeasePolicy {
        &self.lease
    }

    async fn read_marker(&self, key: &str) -> Result<Option<LockMarker>, LockError> {
        match self.store.get(key).await {
            Ok(bytes) => LockMarker::decode(&bytes)
                .map(Some)
                .map_err(|source| LockError::InvalidMarker {
                    key: key.to_string(),
                    source,
                }),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_marker(&self, key: &str) -> Result<(), LockError> {
        match self.store.delete(key).await {
            Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl FileLock for MarkerLock {
    #[tracing::instrument(skip(self, file), fields(key = %file.key()))]
    async fn acquire(&self, file: &FileRef, identity: &str) -> Result<LockHandle, LockError> {
        let key = marker_key(file.key());
        let now = self.clock.now_millis();

        if let Some(existing) = self.read_marker(&key).await? {
            if !existing.is_held_by(identity) {
                let info = MarkerInfo::from_marker(&existing, &self.lease, now);
                if !info.expired {
                    tracing::debug!(holder = %existing.holder, "Lock held by another identity");
                    return Ok(LockHandle::denied(identity, Some(info)));
                }
                tracing::info!(
                    stale_holder = %existing.holder,
                    age_secs = info.age.as_secs(),
                    "Taking over expired lock"
                );
            }
        }

        let marker = LockMarker::new(identity, now);
        self.store.put(&key, marker.encode()).await?;
        let settle = self.lease.settle();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        match self.read_marker(&key).await? {
            Some(confirmed) if confirmed.is_held_by(identity) => {
                tracing::info!("Lock acquired");
                Ok(LockHandle::granted(identity, confirmed.acquired_at))
            }
            Some(winner) => {
                tracing::warn!(winner = %winner.holder, "Lost lock acquisition race");
                let info = MarkerInfo::from_marker(&winner, &self.lease, self.clock.now_millis());
                Ok(LockHandle::denied(identity, Some(info)))
            }
            None => {
                tracing::warn!("Lock marker vanished right after being written");
                Ok(LockHandle::denied(identity, None))
            }
        }
    }

    #[tracing::instrument(skip(self, file), fields(key = %file.key()))]
    async fn release(&self, file: &FileRef, identity: &str) -> Result<(), LockError> {
        let key = marker_key(file.key());
        match self.read_marker(&key).await? {
            Some(marker) if marker.is_held_by(identity) => {
                self.delete_marker(&key).await?;
                tracing::info!("Lock released");
            }
            Some(marker) => {
                tracing::debug!(holder = %marker.holder, "Marker belongs to another identity, leaving it");
            }
            None => tracing::debug!("No marker to release"),
        }
        Ok(())
    }

    async fn inspect(&self, file: &FileRef) -> Result<Option<MarkerInfo>, LockError> {
        let key = marker_key(file.key());
        let now = self.clock.now_millis();
        Ok(self
            .read_marker(&key)
            .await?
            .map(|marker| MarkerInfo::from_marker(&marker, &self.lease, now)))
    }

    #[tracing::instrument(skip(self, file), fields(key = %file.key()))]
    async fn break_lock(&self, file: &FileRef) -> Result<(), LockError> {
        let key = marker_key(file.key());
        // An unreadable marker must still be breakable.
        let previous = self.read_marker(&key).await.ok().flatten();
        self.delete_marker(&key).await?;
        tracing::warn!(
            previous_holder = previous.as_ref().map(|m| m.holder.as_str()).unwrap_or("<none>"),
            "Lock forcibly broken"
        );
        Ok(())
    }

    fn is_held(&self, handle: &LockHandle) -> bool {
        match handle.acquired_at() {
            Some(acquired_at) if handle.acquired() && !handle.is_released() => {
                self.lease.covers(acquired_at, self.clock.now_millis())
            }
            _ => false,
        }
    }

    fn is_coordinated(&self) -> bool {
        true
    }
}
