//! Lock that coordinates nothing.

use async_trait::async_trait;

use super::lease::Clock;
use super::{FileLock, LockError, LockHandle, MarkerInfo};
use crate::file::FileRef;
use std::sync::Arc;

/// Grants every request without touching storage.
///
/// Used for files that are not shared, and as the fallback when the client
/// cannot write to the marker namespace (read-only access).
#[derive(Debug, Clone)]
pub struct NoopLock {
    clock: Arc<dyn Clock>,
}

impl NoopLock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl FileLock for NoopLock {
    async fn acquire(&self, _file: &FileRef, identity: &str) -> Result<LockHandle, LockError> {
        Ok(LockHandle::granted(identity, self.clock.now_millis()))
    }

    async fn release(&self, _file: &FileRef, _identity: &str) -> Result<(), LockError> {
        Ok(())
    }

    async fn inspect(&self, _file: &FileRef) -> Result<Option<MarkerInfo>, LockError> {
        Ok(None)
    }

    async fn break_lock(&self, _file: &FileRef) -> Result<(), LockError> {
        Ok(())
    }

    fn is_held(&self, handle: &LockHandle) -> bool {
        handle.acquired() && !handle.is_released()
    }

    fn is_coordinated(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::lease::ManualClock;

    #[tokio::test]
    async fn test_always_grants_and_records_nothing() {
        let lock = NoopLock::new(Arc::new(ManualClock::new(7)));
        let file = FileRef::local("db.sqlite", "/tmp/db.sqlite");

        let a = lock.acquire(&file, "alice").await.unwrap();
        let b = lock.acquire(&file, "bob").await.unwrap();
        assert!(lock.is_held(&a) && lock.is_held(&b));
        assert_eq!(a.acquired_at(), Some(7));
        assert!(lock.inspect(&file).await.unwrap().is_none());

        let mut a = a;
        lock.release(&file, "alice").await.unwrap();
        a.mark_released();
        assert!(!lock.is_held(&a));
        assert!(!lock.is_coordinated());
    }
}
