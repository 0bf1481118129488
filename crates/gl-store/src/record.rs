//! Record identity and version envelope.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A payload together with the identity and version the store assigned it.
///
/// `version` starts at 1 and increases by exactly 1 on every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub id: RecordId,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Versioned<T> {
    /// The record as it looks after one successful write of `payload`.
    #[must_use]
    pub fn successor(&self, payload: T) -> Self {
        Self {
            id: self.id,
            version: self.version + 1,
            created_at: self.created_at,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    #[test]
    fn successor_bumps_version_only() {
        let v1 = Versioned {
            id: RecordId::new(7),
            version: 1,
            created_at: Utc::now(),
            payload: Note { text: "a".into() },
        };
        let v2 = v1.successor(Note { text: "b".into() });

        assert_eq!(v2.id, v1.id);
        assert_eq!(v2.version, 2);
        assert_eq!(v2.created_at, v1.created_at);
        assert_eq!(v2.payload.text, "b");
    }

    #[test]
    fn payload_fields_serialize_inline() {
        let record = Versioned {
            id: RecordId::new(3),
            version: 4,
            created_at: Utc::now(),
            payload: Note { text: "hi".into() },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["version"], 4);
        assert_eq!(json["text"], "hi");
    }
}
