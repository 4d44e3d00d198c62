//! Holder identity.
//!
//! The lock marker records an opaque identity. Diagnostics prefer a readable
//! form, so providers can also resolve identities they know about to a handle
//! and full name.

use std::collections::HashMap;
use std::fmt::Debug;

/// Supplies the identity recorded in lock markers.
pub trait IdentityProvider: Send + Sync + Debug {
    /// Stable identity of the current user.
    fn holder_identity(&self) -> &str;

    /// Readable form of `identity`, if known.
    fn display_name(&self, identity: &str) -> Option<String>;
}

/// Public profile of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub handle: String,
    pub name: Option<String>,
}

impl UserInfo {
    pub fn new(handle: impl Into<String>, name: Option<String>) -> Self {
        Self {
            handle: handle.into(),
            name,
        }
    }

    fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("'{}' (name: '{name}')", self.handle),
            None => format!("'{}'", self.handle),
        }
    }
}

/// Fixed identity with a small directory of known users.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    identity: String,
    users: HashMap<String, UserInfo>,
}

impl StaticIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            users: HashMap::new(),
        }
    }

    /// Register the profile of `identity`.
    pub fn with_user(mut self, identity: impl Into<String>, info: UserInfo) -> Self {
        self.users.insert(identity.into(), info);
        self
    }
}

impl IdentityProvider for StaticIdentity {
    fn holder_identity(&self) -> &str {
        &self.identity
    }

    fn display_name(&self, identity: &str) -> Option<String> {
        self.users.get(identity).map(UserInfo::display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_for_known_users() {
        let identity = StaticIdentity::new("u-1")
            .with_user("u-1", UserInfo::new("alice", Some("Alice A.".into())))
            .with_user("u-2", UserInfo::new("bob", None));

        assert_eq!(identity.holder_identity(), "u-1");
        assert_eq!(
            identity.display_name("u-1").as_deref(),
            Some("'alice' (name: 'Alice A.')")
        );
        assert_eq!(identity.display_name("u-2").as_deref(), Some("'bob'"));
        assert_eq!(identity.display_name("u-3"), None);
    }
}
