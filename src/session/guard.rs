//! Scoped checkout.

use std::path::Path;

use super::Session;
use crate::error::Result;

/// A checkout that is released when it goes out of scope.
///
/// Finish it with [`checkin`](Self::checkin) to publish the local copy or
/// [`abandon`](Self::abandon) to discard the work. Dropping an unfinished
/// guard (an early return, a panic, or a cancelled future) releases the lock
/// on a background task without uploading. Outside a tokio runtime nothing
/// can be released and the marker stays until its lease runs out.
#[derive(Debug)]
pub struct CheckoutGuard<'a> {
    session: &'a mut Session,
    finished: bool,
}

impl<'a> CheckoutGuard<'a> {
    pub(super) fn new(session: &'a mut Session) -> Self {
        Self {
            session,
            finished: false,
        }
    }

    pub fn local_path(&self) -> &Path {
        self.session.local_path()
    }

    pub fn session(&self) -> &Session {
        &*self.session
    }

    /// Upload the local copy and release the lock.
    pub async fn checkin(mut self) -> Result<()> {
        let result = self.session.checkin().await;
        self.finished = true;
        result
    }

    /// Upload the local copy and keep the checkout open.
    pub async fn push(&mut self) -> Result<()> {
        self.session.push().await
    }

    /// Release the lock without uploading.
    pub async fn abandon(mut self) -> Result<()> {
        let result = self.session.release().await;
        self.finished = true;
        result
    }
}

impl Drop for CheckoutGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let Some(release) = self.session.detach_release() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!(key = %self.session.file().key(), "Releasing unfinished checkout");
                runtime.spawn(release);
            }
            Err(_) => {
                tracing::warn!(
                    key = %self.session.file().key(),
                    "No runtime to release unfinished checkout, lock expires with its lease"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::CacheMirror;
    use crate::identity::StaticIdentity;
    use crate::lock::lease::{LeasePolicy, ManualClock};
    use crate::session::{Session, SessionState};
    use crate::store::{BlobStore, MemoryStore};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn session(dir: &TempDir, store: &MemoryStore, clock: Arc<ManualClock>) -> Session {
        let mirror = CacheMirror::new(Arc::new(store.clone()), dir.path());
        let file = mirror.file_ref("db.sqlite");
        Session::new(
            file,
            mirror,
            LeasePolicy::default().with_settle(Duration::ZERO),
            Arc::new(StaticIdentity::new("alice")),
            clock,
        )
    }

    #[tokio::test]
    async fn test_guard_checkin_publishes() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemoryStore::with_clock(clock.clone());
        let mut session = session(&dir, &store, clock);

        let guard = session.checkout_guard().await.unwrap();
        std::fs::write(guard.local_path(), b"done").unwrap();
        guard.checkin().await.unwrap();

        assert_eq!(store.peek("db.sqlite").unwrap(), b"done");
        assert!(store.peek("db.sqlite.lock").is_none());
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_in_background() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemoryStore::with_clock(clock.clone());
        store.put("db.sqlite", b"v1".to_vec()).await.unwrap();
        let mut session = session(&dir, &store, clock);

        {
            let guard = session.checkout_guard().await.unwrap();
            std::fs::write(guard.local_path(), b"unfinished").unwrap();
        }
        assert_eq!(session.state(), SessionState::Idle);

        for _ in 0..50 {
            if store.peek("db.sqlite.lock").is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.peek("db.sqlite.lock").is_none());
        assert_eq!(store.peek("db.sqlite").unwrap(), b"v1");
    }

    #[tokio::test]
    async fn test_cancelled_body_releases_lock() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemoryStore::with_clock(clock.clone());
        let mut session = session(&dir, &store, clock);

        let work = session.with_checkout(|_| async {
            std::future::pending::<()>().await;
            Ok::<_, crate::Error>(())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(20), work).await;
        assert!(timed_out.is_err());

        for _ in 0..50 {
            if store.peek("db.sqlite.lock").is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.peek("db.sqlite.lock").is_none());
        assert_eq!(session.state(), SessionState::Idle);
    }
}
