use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one indexed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub Uuid);

impl ChunkId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a knowledge base: an isolated, independently addressable
/// collection of chunks. The reserved id `"default"` always exists.
///
/// Every index operation carries its `KbId` explicitly; there is no mutable
/// "current knowledge base" handle anywhere in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KbId(String);

impl KbId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The reserved default knowledge base.
    #[must_use]
    pub fn default_kb() -> Self {
        Self("default".to_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One indexed unit of text.
///
/// A parent chunk holds the full cleaned block it was extracted from; child
/// chunks hold semantically coherent fragments of that block and carry the
/// parent's id. A child identical to its parent is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub source_file: String,
    pub file_type: String,
    pub upload_date: NaiveDate,
    /// Page or block number within the source file.
    pub page: u32,
    pub is_parent: bool,
    /// Present iff `is_parent` is false.
    pub parent_id: Option<ChunkId>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Pointer to a rendered preview asset, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

/// Transient result of one retrieval query. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    pub text: String,
    pub score: f32,
    pub source_file: String,
    pub file_type: String,
    pub page: u32,
    pub parent_id: Option<ChunkId>,
    pub image_ref: Option<String>,
}

/// Citation record emitted alongside an answer, one per retained context
/// block, deduplicated on `(name, page)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub name: String,
    pub page: u32,
    #[serde(rename = "type")]
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the caller-supplied conversation history. Consumed read-only
/// by the query planner; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One extracted block of a source file, as handed over by the per-format
/// extractors at the ingestion boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBlock {
    pub text: String,
    pub page: u32,
    pub image_ref: Option<String>,
}

impl SourceBlock {
    pub fn new(text: impl Into<String>, page: u32) -> Self {
        Self {
            text: text.into(),
            page,
            image_ref: None,
        }
    }
}

/// Identifier of one ingestion task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of one file's ingestion. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Processing,
    Completed { chunks: usize },
    Failed { error: String },
}

impl TaskState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Tracks one file's processing from submission to a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionTask {
    pub id: TaskId,
    pub filename: String,
    pub kb_id: KbId,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_kb_id() {
        assert_eq!(KbId::default_kb().as_str(), "default");
    }

    #[test]
    fn chunk_ids_unique() {
        assert_ne!(ChunkId::generate(), ChunkId::generate());
    }

    #[test]
    fn task_state_terminality() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Processing.is_terminal());
        assert!(TaskState::Completed { chunks: 3 }.is_terminal());
        assert!(
            TaskState::Failed {
                error: "boom".into()
            }
            .is_terminal()
        );
    }

    #[test]
    fn citation_serializes_type_field() {
        let citation = Citation {
            name: "report.pdf".into(),
            page: 2,
            file_type: "pdf".into(),
            image_ref: None,
        };
        let json = serde_json::to_value(&citation).unwrap();
        assert_eq!(json["type"], "pdf");
        assert!(json.get("image_ref").is_none());
    }

    #[test]
    fn task_state_serializes_tagged() {
        let json = serde_json::to_value(TaskState::Completed { chunks: 7 }).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["chunks"], 7);
    }

    #[test]
    fn conversation_turn_roles() {
        assert_eq!(ConversationTurn::user("hi").role, Role::User);
        assert_eq!(ConversationTurn::assistant("hello").role, Role::Assistant);
    }

    #[test]
    fn chunk_roundtrips_through_json() {
        let parent = ChunkId::generate();
        let chunk = Chunk {
            id: ChunkId::generate(),
            text: "fragment".into(),
            source_file: "a.txt".into(),
            file_type: "text".into(),
            upload_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            page: 1,
            is_parent: false,
            parent_id: Some(parent),
            tags: vec!["finance".into()],
            image_ref: None,
        };
        let json = serde_json::to_string(&chunk).unwrap();
        let back: Chunk = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chunk);
    }
}
