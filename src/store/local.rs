//! Directory-backed blob store.
//!
//! Treats a directory (a mounted bucket, a network share, or a plain folder)
//! as object storage. Writes land in a temporary sibling first and are renamed
//! into place, so readers never see a half-written object.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use uuid::Uuid;

use super::{BlobStore, StoreError};

/// Blob store rooted at a local or mounted directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

fn map_io(key: &str, err: io::Error) -> StoreError {
    match err.kind() {
        io::ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
        io::ErrorKind::PermissionDenied => StoreError::Forbidden(key.to_string()),
        _ => StoreError::Unavailable(format!("{key}: {err}")),
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        fs::read(self.path_for(key)).await.map_err(|e| map_io(key, e))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| map_io(key, e))?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(".{file_name}.{}.part", Uuid::now_v7().simple()));

        if let Err(e) = fs::write(&tmp, &data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(map_io(key, e));
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(map_io(key, e));
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        match fs::metadata(self.path_for(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io(key, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        fs::remove_file(self.path_for(key))
            .await
            .map_err(|e| map_io(key, e))
    }

    async fn modified_time(&self, key: &str) -> Result<SystemTime, StoreError> {
        let meta = fs::metadata(self.path_for(key))
            .await
            .map_err(|e| map_io(key, e))?;
        meta.modified().map_err(|e| map_io(key, e))
    }
}
