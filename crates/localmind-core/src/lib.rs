//! ============================================================================
//! LOCALMIND-CORE: Long-term memory for a local chat assistant
//! ============================================================================
//! This crate handles the memory side of LocalMind:
//! - Persistent document store on redb
//! - Cosine similarity ranking over stored embeddings
//! - Embedding providers (OpenAI-compatible HTTP or offline hashing)
//! - Memory service gluing them to the chat loop
//! ============================================================================

pub mod config;
pub mod error;
pub mod memory;
pub mod prompt;

// Re-export main types for convenience
pub use config::{EmbeddingConfig, MemoryConfig, RecallPolicy};
pub use error::MemoryError;
pub use memory::{
    Document, EmbeddingProvider, MemoryService, MemoryStatus, MemoryStore, Role, SearchResult,
};
pub use prompt::{build_system_prompt, DEFAULT_SYSTEM_PROMPT};
