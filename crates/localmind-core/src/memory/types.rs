//! ============================================================================
//! Memory Types - Data structures for conversational memory
//! ============================================================================
//! Defines stored documents, search results, and the memory status reported
//! to the chat layer.
//! ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single conversational turn stored in the vector database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier, generated at write time
    pub id: String,
    /// Verbatim text of the turn
    pub content: String,
    /// Vector embedding, computed once at write time
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

/// Who produced a turn, when, and which embedding model indexed it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub role: Role,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Identifier of the embedding model that produced `embedding`
    pub embedding_model: String,
}

impl Document {
    /// Create a new document with a fresh id and the current time
    pub fn new(content: String, role: Role, embedding: Vec<f32>, embedding_model: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            embedding,
            metadata: DocumentMetadata {
                role,
                timestamp: chrono::Utc::now().timestamp_millis(),
                embedding_model,
            },
        }
    }

    /// Replace the generated id (used for imports and tests)
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Replace the creation timestamp (milliseconds)
    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.metadata.timestamp = timestamp_ms;
        self
    }

    /// Dimensionality of the stored embedding
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// Speaker of a conversational turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Upper-case label used in the recalled context block
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// A stored document scored against a query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub document: Document,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Activity of the memory subsystem, as shown next to the chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    Idle,
    Loading,
    Indexing,
    Searching,
    Ready,
    Error,
}

impl MemoryStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            MemoryStatus::Idle => "Idle",
            MemoryStatus::Loading => "Loading",
            MemoryStatus::Indexing => "Indexing",
            MemoryStatus::Searching => "Searching",
            MemoryStatus::Ready => "Ready",
            MemoryStatus::Error => "Error",
        }
    }
}
