//! Configuration parsing.
//!
//! Supports:
//! - CLI arguments via clap (flattened into `stratusctl`)
//! - Environment variable overrides
//! - A per-user cache directory by default

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::identity::{StaticIdentity, UserInfo};
use crate::instance::{Dialect, InstanceSettings, StorageLocation};
use crate::lock::lease::{LeasePolicy, SystemClock};
use crate::session::Session;
use crate::store::LocalStore;

/// Connection to one shared instance.
#[derive(Parser, Debug, Clone)]
pub struct Config {
    /// Storage root holding the instance database (a mounted bucket or share)
    #[arg(long, env = "STRATUS_STORAGE_ROOT", default_value = "./storage")]
    pub storage_root: PathBuf,

    /// Whether the storage root is shared with other clients
    #[arg(
        long,
        env = "STRATUS_SHARED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub shared: bool,

    /// Local cache directory (defaults to the user cache dir)
    #[arg(long, env = "STRATUS_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Identity recorded in lock markers
    #[arg(long, env = "STRATUS_IDENTITY", default_value = "anonymous")]
    pub identity: String,

    /// Handle shown to other users in lock diagnostics
    #[arg(long, env = "STRATUS_HANDLE")]
    pub handle: Option<String>,

    /// Full name shown to other users in lock diagnostics
    #[arg(long, env = "STRATUS_NAME")]
    pub user_name: Option<String>,

    /// Instance id
    #[arg(long, env = "STRATUS_INSTANCE_ID", default_value_t = Uuid::nil())]
    pub instance_id: Uuid,

    /// Instance owner
    #[arg(long, env = "STRATUS_INSTANCE_OWNER", default_value = "local")]
    pub instance_owner: String,

    /// Instance name
    #[arg(long, env = "STRATUS_INSTANCE_NAME", default_value = "default")]
    pub instance_name: String,

    /// Days of inactivity after which a lock is considered abandoned
    #[arg(long, env = "STRATUS_LEASE_DAYS", default_value_t = 7)]
    pub lease_days: u64,

    /// Milliseconds to wait before confirming a freshly written lock marker
    ///
    /// Must exceed the storage backend's worst write latency.
    #[arg(long, env = "STRATUS_SETTLE_MS", default_value_t = 250)]
    pub settle_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration for testing.
    #[cfg(test)]
    pub fn test_config(root: &std::path::Path) -> Self {
        Self {
            storage_root: root.join("storage"),
            shared: true,
            cache_dir: Some(root.join("cache")),
            identity: "test-user".into(),
            handle: Some("tester".into()),
            user_name: None,
            instance_id: Uuid::nil(),
            instance_owner: "test".into(),
            instance_name: "db".into(),
            lease_days: 7,
            settle_ms: 0,
            log_level: "debug".into(),
        }
    }

    pub fn instance_settings(&self) -> InstanceSettings {
        InstanceSettings {
            id: self.instance_id,
            owner: self.instance_owner.clone(),
            name: self.instance_name.clone(),
            storage: StorageLocation {
                root: self.storage_root.clone(),
                shared: self.shared,
            },
            dialect: Dialect::Sqlite,
        }
    }

    pub fn lease_policy(&self) -> LeasePolicy {
        LeasePolicy::from_days(self.lease_days)
            .with_settle(Duration::from_millis(self.settle_ms))
    }

    pub fn identity_provider(&self) -> StaticIdentity {
        let identity = StaticIdentity::new(&self.identity);
        match &self.handle {
            Some(handle) => identity.with_user(
                &self.identity,
                UserInfo::new(handle, self.user_name.clone()),
            ),
            None => identity,
        }
    }

    /// Cache directory, falling back to `<user cache>/stratus`.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("stratus")
        })
    }

    pub fn store(&self) -> LocalStore {
        LocalStore::new(&self.storage_root)
    }

    /// Build a session on the configured instance.
    pub fn open_session(&self) -> Session {
        self.instance_settings().open_session(
            Arc::new(self.store()),
            Arc::new(self.identity_provider()),
            &self.cache_dir(),
            self.lease_policy(),
            Arc::new(SystemClock),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./storage"),
            shared: true,
            cache_dir: None,
            identity: "anonymous".into(),
            handle: None,
            user_name: None,
            instance_id: Uuid::nil(),
            instance_owner: "local".into(),
            instance_name: "default".into(),
            lease_days: 7,
            settle_ms: 250,
            log_level: "info".into(),
        }
    }
}
