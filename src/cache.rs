//! Local cache mirror.
//!
//! Every remote database file has a fixed local path under the cache
//! directory, so a restarted process finds its previous copy. Freshness is
//! decided by modification time alone: after a download or an upload the local
//! file carries the remote modification time, and a local copy older than the
//! remote one is stale.
//!
//! Transfers are written to a temporary sibling and renamed into place, so an
//! interrupted download never leaves a truncated database at the cache path.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::file::FileRef;
use crate::store::{BlobStore, StoreError};
use crate::system_time_millis;

/// Error type for cache transfers.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("local copy of '{key}' does not match the remote modification time")]
    StaleLocalState { key: String },
}

/// Result of bringing the local copy up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote file was fetched.
    Downloaded,
    /// The local copy was already current.
    UpToDate,
    /// No remote file exists yet.
    RemoteMissing,
}

/// Mirrors remote objects into a local directory.
#[derive(Debug, Clone)]
pub struct CacheMirror {
    store: Arc<dyn BlobStore>,
    cache_dir: PathBuf,
}

impl CacheMirror {
    pub fn new(store: Arc<dyn BlobStore>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Deterministic local path for `key`.
    pub fn local_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.cache_dir.clone(), |path, segment| path.join(segment))
    }

    /// A shared file reference for `key` mirrored by this cache.
    pub fn file_ref(&self, key: &str) -> FileRef {
        FileRef::shared(key, self.local_path(key))
    }

    /// Whether the remote object exists.
    pub async fn remote_exists(&self, file: &FileRef) -> Result<bool, CacheError> {
        Ok(self.store.exists(file.key()).await?)
    }

    /// Local copy absent, or older than the remote one.
    ///
    /// A missing remote object is never stale: there is nothing to fetch.
    pub async fn is_stale(&self, file: &FileRef) -> Result<bool, CacheError> {
        match self.remote_modified(file.key()).await? {
            Some(remote) => Ok(!is_current(file.local_path(), remote).await?),
            None => Ok(false),
        }
    }

    /// Download the remote file if the local copy is stale.
    #[tracing::instrument(skip(self, file), fields(key = %file.key()))]
    pub async fn sync_down(&self, file: &mut FileRef) -> Result<SyncOutcome, CacheError> {
        let Some(remote) = self.remote_modified(file.key()).await? else {
            tracing::debug!("Remote file does not exist yet");
            return Ok(SyncOutcome::RemoteMissing);
        };
        if is_current(file.local_path(), remote).await? {
            file.set_remote_modified(remote);
            tracing::debug!("Local copy is current");
            return Ok(SyncOutcome::UpToDate);
        }
        self.download(file).await?;
        Ok(SyncOutcome::Downloaded)
    }

    async fn remote_modified(&self, key: &str) -> Result<Option<SystemTime>, CacheError> {
        match self.store.modified_time(key).await {
            Ok(time) => Ok(Some(time)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the remote file unconditionally.
    ///
    /// The local copy ends up stamped with the remote modification time; if a
    /// re-read of the remote disagrees afterwards (a concurrent writer, or a
    /// filesystem that cannot keep the timestamp) the download is reported as
    /// [`CacheError::StaleLocalState`].
    pub async fn download(&self, file: &mut FileRef) -> Result<SystemTime, CacheError> {
        let key = file.key().to_string();
        let remote_modified = self.store.modified_time(&key).await?;
        let data = self.store.get(&key).await?;
        let size = data.len();

        let path = file.local_path().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = temp_sibling(&path);
        let written = async {
            fs::write(&tmp, &data).await?;
            set_local_modified(&tmp, remote_modified).await?;
            fs::rename(&tmp, &path).await
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        let confirmed = self.store.modified_time(&key).await?;
        let local = local_modified(&path).await?;
        let consistent = local.is_some_and(|local| {
            system_time_millis(local) == system_time_millis(confirmed)
        });
        if !consistent {
            tracing::warn!(key = %key, "Downloaded copy disagrees with remote modification time");
            return Err(CacheError::StaleLocalState { key });
        }

        file.set_remote_modified(confirmed);
        tracing::info!(key = %key, size, "Downloaded remote file");
        Ok(confirmed)
    }

    /// Upload the local copy, overwriting the remote file.
    ///
    /// Afterwards the local copy carries the new remote modification time.
    #[tracing::instrument(skip(self, file), fields(key = %file.key()))]
    pub async fn sync_up(&self, file: &mut FileRef) -> Result<SystemTime, CacheError> {
        let data = fs::read(file.local_path()).await?;
        let size = data.len();
        self.store.put(file.key(), data).await?;

        let remote_modified = self.store.modified_time(file.key()).await?;
        set_local_modified(file.local_path(), remote_modified).await?;
        file.set_remote_modified(remote_modified);
        tracing::info!(size, "Uploaded local copy");
        Ok(remote_modified)
    }

    /// Remove the local copy. A missing copy is fine.
    pub async fn discard(&self, file: &FileRef) -> Result<(), CacheError> {
        match fs::remove_file(file.local_path()).await {
            Ok(()) => {
                tracing::debug!(key = %file.key(), "Discarded local copy");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A local copy at least as new as `remote` is current.
async fn is_current(path: &Path, remote: SystemTime) -> io::Result<bool> {
    Ok(local_modified(path)
        .await?
        .is_some_and(|local| system_time_millis(local) >= system_time_millis(remote)))
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.part", Uuid::now_v7().simple()))
}

/// Modification time of a local file, `None` if it does not exist.
pub async fn local_modified(path: &Path) -> io::Result<Option<SystemTime>> {
    match fs::metadata(path).await {
        Ok(meta) => meta.modified().map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

async fn set_local_modified(path: &Path, time: SystemTime) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)?
            .set_modified(time)
    })
    .await
    .map_err(io::Error::other)?
}
