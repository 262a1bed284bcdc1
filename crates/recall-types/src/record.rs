//! Memory record type and classification.
//!
//! Records are owned by the memory store and mutated only through its API.
//! Deletion is logical: `is_active` flips to false and the record stays in
//! the metadata map until cleanup physically removes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of what a memory describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// A stable fact about the user or the world
    Fact,
    /// A user preference
    Preference,
    /// An outstanding or completed task
    Task,
    /// Something that happened during a session
    Event,
    /// A derived observation about the user
    Insight,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Fact => "fact",
            MemoryKind::Preference => "preference",
            MemoryKind::Task => "task",
            MemoryKind::Event => "event",
            MemoryKind::Insight => "insight",
        }
    }
}

impl Default for MemoryKind {
    fn default() -> Self {
        MemoryKind::Fact
    }
}

/// A single unit of long-term memory.
///
/// `relevance_score` is populated at query time from vector similarity and
/// carries no meaning outside a search result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Stable external identifier, unique within a store
    pub id: String,

    /// The memorized text
    pub content: String,

    /// Owner (user or agent) this memory belongs to
    pub owner_id: String,

    /// Session the memory originated from, if any
    #[serde(default)]
    pub session_id: Option<String>,

    /// What kind of memory this is
    #[serde(default)]
    pub kind: MemoryKind,

    /// False once the record has been soft-deleted
    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Similarity score from the most recent search (query-time only)
    #[serde(default)]
    pub relevance_score: f32,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// When the record was last mutated
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl MemoryRecord {
    /// Create a new active record with a generated id and fresh timestamps.
    pub fn new(content: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            owner_id: owner_id.into(),
            session_id: None,
            kind: MemoryKind::default(),
            is_active: true,
            relevance_score: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the session this memory originated from.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the memory kind.
    pub fn with_kind(mut self, kind: MemoryKind) -> Self {
        self.kind = kind;
        self
    }

    /// Use a caller-supplied id instead of the generated one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Stamp `updated_at` with the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_active() {
        let record = MemoryRecord::new("prefers dark roast", "u1");
        assert!(record.is_active);
        assert!(!record.id.is_empty());
        assert_eq!(record.owner_id, "u1");
        assert_eq!(record.kind, MemoryKind::Fact);
        assert!(record.session_id.is_none());
    }

    #[test]
    fn test_builder_methods() {
        let record = MemoryRecord::new("buy beans", "u1")
            .with_kind(MemoryKind::Task)
            .with_session("s-42")
            .with_id("mem-1");
        assert_eq!(record.id, "mem-1");
        assert_eq!(record.kind, MemoryKind::Task);
        assert_eq!(record.session_id.as_deref(), Some("s-42"));
    }

    #[test]
    fn test_touch_advances_updated_at() {
        let mut record = MemoryRecord::new("x", "u1");
        let before = record.updated_at;
        record.touch();
        assert!(record.updated_at >= before);
    }

    #[test]
    fn test_serde_round_trip_with_defaults() {
        let json = r#"{
            "id": "mem-9",
            "content": "likes espresso",
            "owner_id": "u2",
            "created_at": "2024-01-15T09:00:00Z",
            "updated_at": "2024-01-15T09:00:00Z"
        }"#;
        let record: MemoryRecord = serde_json::from_str(json).unwrap();
        assert!(record.is_active);
        assert_eq!(record.kind, MemoryKind::Fact);
        assert_eq!(record.relevance_score, 0.0);

        let out = serde_json::to_string(&record).unwrap();
        let back: MemoryRecord = serde_json::from_str(&out).unwrap();
        assert_eq!(back.id, "mem-9");
    }

    #[test]
    fn test_bytes_round_trip() {
        let record = MemoryRecord::new("persisted", "u1").with_kind(MemoryKind::Event);
        let bytes = record.to_bytes().unwrap();
        let back = MemoryRecord::from_bytes(&bytes).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.kind, MemoryKind::Event);
    }

    #[test]
    fn test_kind_as_str() {
        assert_eq!(MemoryKind::Preference.as_str(), "preference");
        assert_eq!(MemoryKind::Insight.as_str(), "insight");
    }
}
