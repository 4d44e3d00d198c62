//! Checkout/checkin orchestration.
//!
//! A [`Session`] drives one protected file through
//! `Idle → Locking → CheckedOut → Unlocking → Idle`, with `Locking → Denied`
//! when another identity holds a live lease. Every failure after the lock was
//! taken releases it before the error reaches the caller.
//!
//! # Example
//!
//! ```no_run
//! # async fn run(session: &mut stratus::Session) -> stratus::Result<()> {
//! session
//!     .with_checkout(|path| async move {
//!         let conn = rusqlite::Connection::open(path)?;
//!         conn.execute_batch("INSERT INTO notes(body) VALUES ('hi')")?;
//!         Ok::<_, stratus::Error>(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod guard;

pub use guard::CheckoutGuard;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{CacheError, CacheMirror, SyncOutcome};
use crate::error::{Error, Result};
use crate::file::FileRef;
use crate::identity::IdentityProvider;
use crate::lock::lease::{Clock, LeasePolicy};
use crate::lock::{FileLock, LockError, LockHandle, MarkerInfo, MarkerLock, NoopLock};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Locking,
    CheckedOut,
    Unlocking,
    /// The last acquisition attempt was refused.
    Denied,
}

/// Exclusive access to one protected file for one identity.
#[derive(Debug)]
pub struct Session {
    file: FileRef,
    mirror: CacheMirror,
    lock: Arc<dyn FileLock>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    state: SessionState,
    handle: Option<LockHandle>,
}

impl Session {
    /// Create a session for `file`.
    ///
    /// Shared files are protected by a [`MarkerLock`] next to the remote
    /// object; local files get a [`NoopLock`] and are never synced.
    pub fn new(
        file: FileRef,
        mirror: CacheMirror,
        lease: LeasePolicy,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let lock: Arc<dyn FileLock> = if file.is_coordinated() {
            Arc::new(MarkerLock::new(mirror.store().clone(), lease, clock.clone()))
        } else {
            Arc::new(NoopLock::new(clock.clone()))
        };
        Self {
            file,
            mirror,
            lock,
            identity,
            clock,
            state: SessionState::Idle,
            handle: None,
        }
    }

    /// Replace the lock implementation.
    pub fn with_lock(mut self, lock: Arc<dyn FileLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn file(&self) -> &FileRef {
        &self.file
    }

    pub fn local_path(&self) -> &Path {
        self.file.local_path()
    }

    pub fn identity(&self) -> &str {
        self.identity.holder_identity()
    }

    /// Whether this session uses a lock that writes markers.
    pub fn is_coordinated(&self) -> bool {
        self.lock.is_coordinated()
    }

    /// Whether the session currently believes it holds the lock.
    pub fn is_held(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| self.lock.is_held(h))
    }

    /// Current marker on the remote file, if any.
    pub async fn inspect(&self) -> Result<Option<MarkerInfo>> {
        Ok(self.lock.inspect(&self.file).await?)
    }

    /// Whether the remote database file exists.
    pub async fn remote_exists(&self) -> Result<bool> {
        if !self.file.is_coordinated() {
            return Ok(self.file.local_path().exists());
        }
        Ok(self.mirror.remote_exists(&self.file).await?)
    }

    /// Acquire the lock and bring the local copy up to date.
    ///
    /// Returns the local path to open. Checking out again while checked out
    /// is a no-op.
    #[tracing::instrument(skip(self), fields(key = %self.file.key(), identity = %self.identity()))]
    pub async fn checkout(&mut self) -> Result<PathBuf> {
        if self.state == SessionState::CheckedOut && self.is_held() {
            tracing::debug!("Already checked out");
            return Ok(self.local_path().to_path_buf());
        }

        self.acquire().await?;
        if let Err(e) = self.sync_down().await {
            self.unlock_after_failure().await;
            return Err(e);
        }
        Ok(self.local_path().to_path_buf())
    }

    /// Upload the local copy and release the lock.
    ///
    /// From `Idle` the lock is taken again first, which succeeds only for a
    /// marker this identity still owns (or none at all).
    #[tracing::instrument(skip(self), fields(key = %self.file.key(), identity = %self.identity()))]
    pub async fn checkin(&mut self) -> Result<()> {
        if self.state != SessionState::CheckedOut || !self.is_held() {
            tracing::debug!(state = ?self.state, "Re-acquiring lock before checkin");
            self.acquire().await?;
        }

        if self.file.is_coordinated() {
            if let Err(e) = self.mirror.sync_up(&mut self.file).await {
                self.unlock_after_failure().await;
                return Err(e.into());
            }
        }
        self.release().await
    }

    /// Upload the local copy while keeping the lock.
    #[tracing::instrument(skip(self), fields(key = %self.file.key()))]
    pub async fn push(&mut self) -> Result<()> {
        if self.state != SessionState::CheckedOut || !self.is_held() {
            return Err(Error::NotCheckedOut(self.file.key().to_string()));
        }
        if self.file.is_coordinated() {
            self.mirror.sync_up(&mut self.file).await?;
        }
        Ok(())
    }

    /// Release the lock without uploading.
    #[tracing::instrument(skip(self), fields(key = %self.file.key(), identity = %self.identity()))]
    pub async fn release(&mut self) -> Result<()> {
        self.state = SessionState::Unlocking;
        let identity = self.identity.holder_identity().to_string();
        let result = self.lock.release(&self.file, &identity).await;
        if let Some(handle) = self.handle.as_mut() {
            handle.mark_released();
        }
        self.handle = None;
        self.state = SessionState::Idle;
        result.map_err(Error::from)
    }

    /// Bring the local copy up to date without taking the lock.
    ///
    /// The copy is a read-only snapshot: a concurrent holder may change the
    /// remote file at any time.
    #[tracing::instrument(skip(self), fields(key = %self.file.key()))]
    pub async fn sync_snapshot(&mut self) -> Result<PathBuf> {
        self.sync_down().await?;
        Ok(self.local_path().to_path_buf())
    }

    /// Delete the marker regardless of its holder.
    ///
    /// Another client that believes it holds the lock keeps writing; use
    /// only for markers known to be abandoned.
    #[tracing::instrument(skip(self), fields(key = %self.file.key()))]
    pub async fn break_lock(&mut self) -> Result<()> {
        self.lock.break_lock(&self.file).await?;
        self.handle = None;
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Check out for the lifetime of the returned guard.
    pub async fn checkout_guard(&mut self) -> Result<CheckoutGuard<'_>> {
        self.checkout().await?;
        Ok(CheckoutGuard::new(self))
    }

    /// Run `body` on the checked-out local copy.
    ///
    /// On success the copy is checked in. On failure the lock is released
    /// without uploading and the body's error is returned unchanged. When the
    /// session is already checked out on entry, neither happens: the outer
    /// checkout stays in place for its owner to finish.
    pub async fn with_checkout<F, Fut, T, E>(&mut self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        if self.state == SessionState::CheckedOut && self.is_held() {
            return body(self.local_path().to_path_buf()).await;
        }

        let guard = self.checkout_guard().await?;
        let path = guard.local_path().to_path_buf();
        match body(path).await {
            Ok(value) => {
                guard.checkin().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(release_err) = guard.abandon().await {
                    tracing::warn!(error = %release_err, "Failed to release lock after error");
                }
                Err(e)
            }
        }
    }

    /// Like [`with_checkout`](Self::with_checkout), but first deletes any
    /// existing marker.
    pub async fn with_checkout_forced<F, Fut, T, E>(&mut self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        // Unreadable markers are broken like any other.
        match self.inspect().await {
            Ok(Some(info)) => {
                tracing::warn!(holder = %info.holder, "Forcing checkout over existing lock")
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Forcing checkout over unreadable lock"),
        }
        self.break_lock().await?;
        self.with_checkout(body).await
    }

    async fn acquire(&mut self) -> Result<()> {
        self.state = SessionState::Locking;
        let identity = self.identity.holder_identity().to_string();

        let attempt = self.lock.acquire(&self.file, &identity).await;
        let handle = match attempt {
            Ok(handle) => handle,
            Err(LockError::PermissionDenied(key)) => {
                tracing::warn!(
                    marker = %key,
                    "No write access to lock marker, continuing with read-only access"
                );
                self.lock = Arc::new(NoopLock::new(self.clock.clone()));
                self.lock.acquire(&self.file, &identity).await?
            }
            Err(e) => {
                self.state = SessionState::Idle;
                return Err(e.into());
            }
        };

        if !handle.acquired() {
            self.state = SessionState::Denied;
            return Err(self.denial_error(&handle));
        }
        self.handle = Some(handle);
        self.state = SessionState::CheckedOut;
        Ok(())
    }

    fn denial_error(&self, handle: &LockHandle) -> Error {
        match handle.denial() {
            Some(info) => {
                tracing::info!(holder = %info.holder, "Checkout denied");
                Error::LockDenied {
                    holder: info.holder.clone(),
                    holder_name: self.identity.display_name(&info.holder),
                    remaining: info.remaining,
                }
            }
            None => Error::Contended(self.file.key().to_string()),
        }
    }

    async fn sync_down(&mut self) -> Result<()> {
        if !self.file.is_coordinated() {
            if let Some(parent) = self.file.local_path().parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            return Ok(());
        }

        match self.mirror.sync_down(&mut self.file).await {
            Ok(SyncOutcome::RemoteMissing) => {
                tracing::info!("Remote file does not exist yet, starting from an empty copy");
                if let Some(parent) = self.file.local_path().parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(CacheError::StaleLocalState { key }) => {
                tracing::warn!(key = %key, "Discarding inconsistent local copy");
                self.mirror.discard(&self.file).await?;
                self.mirror.download(&mut self.file).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn unlock_after_failure(&mut self) {
        if let Err(e) = self.release().await {
            tracing::warn!(error = %e, "Failed to release lock after error");
        }
    }

    /// Hand the pending release to a detached task.
    ///
    /// Marks the session released locally and returns the remote half, or
    /// `None` when nothing is held.
    fn detach_release(&mut self) -> Option<impl Future<Output = ()> + Send + 'static> {
        if self.state != SessionState::CheckedOut {
            return None;
        }
        self.handle = None;
        self.state = SessionState::Idle;

        let lock = self.lock.clone();
        let file = self.file.clone();
        let identity = self.identity.holder_identity().to_string();
        Some(async move {
            if let Err(e) = lock.release(&file, &identity).await {
                tracing::warn!(key = %file.key(), error = %e, "Background lock release failed");
            }
        })
    }
}
