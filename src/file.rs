//! Protected file reference.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A remote database object and its local mirror.
///
/// `remote_modified` is the last remote modification time this process has
/// observed; it is refreshed by every download and upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    key: String,
    local_path: PathBuf,
    remote_modified: Option<SystemTime>,
    coordinated: bool,
}

impl FileRef {
    /// A remote object shared between clients and mirrored at `local_path`.
    pub fn shared(key: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            local_path: local_path.into(),
            remote_modified: None,
            coordinated: true,
        }
    }

    /// A purely local file used by a single client; never locked or synced.
    pub fn local(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            local_path: path.into(),
            remote_modified: None,
            coordinated: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn remote_modified(&self) -> Option<SystemTime> {
        self.remote_modified
    }

    /// Whether access must go through the lock and the cache mirror.
    pub fn is_coordinated(&self) -> bool {
        self.coordinated
    }

    pub(crate) fn set_remote_modified(&mut self, modified: SystemTime) {
        self.remote_modified = Some(modified);
    }
}
