//! Instance settings.
//!
//! An instance is one logical database. SQLite instances on shared storage
//! keep their database at `<storage root>/<id>.sqlite` and go through the
//! lock and the cache mirror; SQLite instances on local storage and Postgres
//! instances are used in place.

use rusqlite::Connection;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::CacheMirror;
use crate::error::{Error, Result};
use crate::file::FileRef;
use crate::identity::IdentityProvider;
use crate::lock::lease::{Clock, LeasePolicy};
use crate::now_millis;
use crate::session::Session;
use crate::store::BlobStore;

/// Table recording schema migrations applied to an instance database.
pub const SCHEMA_TABLE: &str = "stratus_schema_version";

/// Schema version written by [`init`].
pub const SCHEMA_VERSION: &str = "1";

/// SQL dialect of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Postgres => write!(f, "postgresql"),
        }
    }
}

/// Where an instance keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    pub root: PathBuf,
    /// Whether other clients reach the same location (a bucket or share).
    pub shared: bool,
}

impl StorageLocation {
    pub fn shared(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            shared: true,
        }
    }

    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            shared: false,
        }
    }
}

/// Settings of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSettings {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub storage: StorageLocation,
    pub dialect: Dialect,
}

impl InstanceSettings {
    pub fn new(
        id: Uuid,
        owner: impl Into<String>,
        name: impl Into<String>,
        storage: StorageLocation,
    ) -> Self {
        Self {
            id,
            owner: owner.into(),
            name: name.into(),
            storage,
            dialect: Dialect::Sqlite,
        }
    }

    /// `owner/name`.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Key of the database object within the storage location.
    pub fn sqlite_key(&self) -> String {
        format!("{}.sqlite", self.id.simple())
    }

    /// Whether access must be locked and synced.
    pub fn requires_coordination(&self) -> bool {
        self.dialect == Dialect::Sqlite && self.storage.shared
    }

    /// Reference to the database file.
    ///
    /// Shared instances are mirrored under `cache_dir`; local ones are used
    /// in place under the storage root.
    pub fn file_ref(&self, cache: &CacheMirror) -> FileRef {
        let key = self.sqlite_key();
        if self.requires_coordination() {
            cache.file_ref(&key)
        } else {
            FileRef::local(&key, self.storage.root.join(&key))
        }
    }

    /// Build a session for this instance's database.
    pub fn open_session(
        &self,
        store: Arc<dyn BlobStore>,
        identity: Arc<dyn IdentityProvider>,
        cache_dir: &Path,
        lease: LeasePolicy,
        clock: Arc<dyn Clock>,
    ) -> Session {
        let mirror = CacheMirror::new(store, cache_dir);
        let file = self.file_ref(&mirror);
        Session::new(file, mirror, lease, identity, clock)
    }
}

/// Lock and fetch an existing instance database.
#[tracing::instrument(skip(session), fields(key = %session.file().key()))]
pub async fn load(session: &mut Session) -> Result<PathBuf> {
    if !session.remote_exists().await? {
        return Err(Error::NotFound(session.file().key().to_string()));
    }
    session.checkout().await
}

/// Fetch an existing instance database without locking it.
pub async fn load_unlocked(session: &mut Session) -> Result<PathBuf> {
    if !session.remote_exists().await? {
        return Err(Error::NotFound(session.file().key().to_string()));
    }
    session.sync_snapshot().await
}

/// Create the instance database, or open it if it already exists, and
/// publish it.
#[tracing::instrument(skip(session), fields(key = %session.file().key()))]
pub async fn init(session: &mut Session) -> Result<()> {
    session
        .with_checkout(|path| async move {
            let created = tokio::task::spawn_blocking(move || ensure_schema(&path))
                .await
                .map_err(|e| Error::Io(std::io::Error::other(e)))??;
            if created {
                tracing::info!("Created instance database");
            }
            Ok::<_, Error>(())
        })
        .await
}

/// Publish local changes and release the lock.
pub async fn close(session: &mut Session) -> Result<()> {
    session.checkin().await
}

/// Publish local changes, keeping the lock.
pub async fn push(session: &mut Session) -> Result<()> {
    session.push().await
}

/// Open the local copy of the database.
pub fn connect(session: &Session) -> Result<Connection> {
    Ok(Connection::open(session.local_path())?)
}

/// Run a SQL batch against the checked-out database.
pub async fn execute_batch(session: &mut Session, sql: &str) -> Result<()> {
    let sql = sql.to_string();
    session
        .with_checkout(|path| async move {
            tokio::task::spawn_blocking(move || -> Result<()> {
                Connection::open(path)?.execute_batch(&sql)?;
                Ok(())
            })
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
        })
        .await
}

/// Current schema version recorded in the database, if any.
pub fn schema_version(conn: &Connection) -> Result<Option<String>> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [SCHEMA_TABLE],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(None);
    }
    let version = conn.query_row(
        &format!("SELECT version FROM {SCHEMA_TABLE} ORDER BY migrated_at DESC LIMIT 1"),
        [],
        |row| row.get(0),
    );
    match version {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Create the schema table on first use. Returns whether anything was created.
fn ensure_schema(path: &Path) -> Result<bool> {
    let conn = Connection::open(path)?;
    if schema_version(&conn)?.is_some() {
        return Ok(false);
    }
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {SCHEMA_TABLE} (
            version TEXT NOT NULL,
            migrated_at INTEGER NOT NULL
        );"
    ))?;
    conn.execute(
        &format!("INSERT INTO {SCHEMA_TABLE} (version, migrated_at) VALUES (?1, ?2)"),
        rusqlite::params![SCHEMA_VERSION, now_millis()],
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentity;
    use crate::lock::lease::ManualClock;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    fn settings(shared: bool) -> InstanceSettings {
        let storage = if shared {
            StorageLocation::shared("s3://bucket")
        } else {
            StorageLocation::local("/data")
        };
        InstanceSettings::new(Uuid::nil(), "alice", "lab", storage)
    }

    #[test]
    fn test_slug_and_key() {
        let settings = settings(true);
        assert_eq!(settings.slug(), "alice/lab");
        assert_eq!(settings.sqlite_key(), "00000000000000000000000000000000.sqlite");
    }

    #[test]
    fn test_coordination_requires_shared_sqlite() {
        assert!(settings(true).requires_coordination());
        assert!(!settings(false).requires_coordination());

        let mut postgres = settings(true);
        postgres.dialect = Dialect::Postgres;
        assert!(!postgres.requires_coordination());
    }

    #[test]
    fn test_local_file_ref_points_into_storage() {
        let mirror = CacheMirror::new(Arc::new(MemoryStore::new()), "/cache");
        let file = settings(false).file_ref(&mirror);
        assert!(!file.is_coordinated());
        assert_eq!(
            file.local_path(),
            Path::new("/data/00000000000000000000000000000000.sqlite")
        );

        let shared = settings(true).file_ref(&mirror);
        assert!(shared.is_coordinated());
        assert!(shared.local_path().starts_with("/cache"));
    }

    #[tokio::test]
    async fn test_load_missing_instance_is_not_found() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemoryStore::with_clock(clock.clone());
        let mut session = settings(true).open_session(
            Arc::new(store.clone()),
            Arc::new(StaticIdentity::new("alice")),
            dir.path(),
            LeasePolicy::default(),
            clock,
        );

        assert!(matches!(load(&mut session).await, Err(Error::NotFound(_))));
        assert!(matches!(
            load_unlocked(&mut session).await,
            Err(Error::NotFound(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_init_then_load_sees_schema() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemoryStore::with_clock(clock.clone());
        let settings = settings(true);
        let mut session = settings.open_session(
            Arc::new(store.clone()),
            Arc::new(StaticIdentity::new("alice")),
            &dir.path().join("a"),
            LeasePolicy::default(),
            clock.clone(),
        );

        init(&mut session).await.unwrap();
        assert!(store.peek(&settings.sqlite_key()).is_some());
        assert!(session.inspect().await.unwrap().is_none());

        let mut other = settings.open_session(
            Arc::new(store.clone()),
            Arc::new(StaticIdentity::new("bob")),
            &dir.path().join("b"),
            LeasePolicy::default(),
            clock,
        );
        load(&mut other).await.unwrap();
        let conn = connect(&other).unwrap();
        assert_eq!(schema_version(&conn).unwrap().as_deref(), Some(SCHEMA_VERSION));
        drop(conn);
        close(&mut other).await.unwrap();
    }
}
