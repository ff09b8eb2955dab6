//! ============================================================================
//! Memory Module - Long-term conversational memory
//! ============================================================================
//! Stores every chat turn with a vector embedding in a local redb database
//! and recalls the most similar past turns as context for new prompts.
//!
//! ## Architecture
//! ```text
//! User Message → Embed → Cosine Ranking → Top K above threshold
//!                                              ↓
//!                         [Recalled Context] + [System Prompt]
//!                                              ↓
//!                                          Local LLM
//!                                              ↓
//!                         Embed & Store both turns of the exchange
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use localmind_core::config::MemoryConfig;
//! use localmind_core::memory::{MemoryService, Role};
//!
//! let service = MemoryService::from_config(&MemoryConfig::from_env()?);
//!
//! // Recall before answering
//! let context = service.retrieve_context("what do I do on weekends?").await;
//!
//! // Remember after answering
//! service.add_memory("I like hiking", Role::User).await;
//! ```
//! ============================================================================

mod embeddings;
mod manager;
mod search;
mod store;
mod types;

// Re-export public types
pub use embeddings::{
    create_embedding_provider, EmbeddingProvider, EmbeddingService, HashEmbedding,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_URL, EMBEDDING_DIM,
};
pub use manager::{format_context, MemoryService, CONTEXT_HEADER};
pub use search::{cosine_similarity, rank, VectorSearch, DEFAULT_TOP_K};
pub use store::{MemoryStore, StoreStats, SCHEMA_VERSION};
pub use types::{Document, DocumentMetadata, MemoryStatus, Role, SearchResult};
