//! Lock marker record and path convention.
//!
//! The marker sits next to the protected object under a fixed suffix, so any
//! client that can list the storage location can find it. Its content is a
//! two-field JSON object.

use serde::{Deserialize, Serialize};

/// Suffix appended to the protected key to locate its marker.
pub const MARKER_SUFFIX: &str = ".lock";

/// Key of the marker protecting `file_key`.
pub fn marker_key(file_key: &str) -> String {
    format!("{file_key}{MARKER_SUFFIX}")
}

/// Persisted lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMarker {
    /// Opaque identity of the holder.
    pub holder: String,
    /// Acquisition time in Unix milliseconds.
    pub acquired_at: i64,
}

impl LockMarker {
    pub fn new(holder: impl Into<String>, acquired_at: i64) -> Self {
        Self {
            holder: holder.into(),
            acquired_at,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        // Two plain fields cannot fail to serialize.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn is_held_by(&self, identity: &str) -> bool {
        self.holder == identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_key_is_sibling() {
        assert_eq!(marker_key("0190/abc.sqlite"), "0190/abc.sqlite.lock");
    }

    #[test]
    fn test_encoding_is_plain_json() {
        let marker = LockMarker::new("u-1", 42);
        assert_eq!(
            String::from_utf8(marker.encode()).unwrap(),
            r#"{"holder":"u-1","acquired_at":42}"#
        );
    }

    #[test]
    fn test_decode_tolerates_unknown_fields() {
        let marker = LockMarker::decode(br#"{"holder":"u-2","acquired_at":7,"host":"x"}"#).unwrap();
        assert_eq!(marker, LockMarker::new("u-2", 7));
        assert!(marker.is_held_by("u-2"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(LockMarker::decode(b"not json").is_err());
    }
}
