//! ============================================================================
//! Memory Configuration
//! ============================================================================
//! Read from the environment (load `.env` first in binaries):
//!   LOCALMIND_DB_PATH              database file (default ~/.localmind/memory.redb)
//!   LOCALMIND_EMBEDDING_URL        OpenAI-compatible base URL; unset = offline hashing
//!   LOCALMIND_EMBEDDING_MODEL      embedding model name
//!   LOCALMIND_EMBEDDING_API_KEY    bearer token (falls back to OPENAI_API_KEY)
//!   LOCALMIND_EMBEDDING_DIM        dimension of the offline embedding
//!   LOCALMIND_TOP_K                results considered per recall
//!   LOCALMIND_RELEVANCE_THRESHOLD  minimum score (exclusive) for recall
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::error::MemoryError;
use crate::memory::{DEFAULT_EMBEDDING_MODEL, DEFAULT_TOP_K, EMBEDDING_DIM};

/// Scores at or below this are noise for MiniLM-class models
pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.35;

/// Directory under the home directory holding the database
pub const DATA_DIR_NAME: &str = ".localmind";

/// Database file name
pub const DB_FILE_NAME: &str = "memory.redb";

/// Top-level memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub db_path: PathBuf,
    pub embedding: EmbeddingConfig,
    pub recall: RecallPolicy,
}

/// Which embedding provider to build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible base URL; `None` selects the offline hash embedding
    pub base_url: Option<String>,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Vector length of the offline hash embedding
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            api_key: None,
            dimension: EMBEDDING_DIM,
        }
    }
}

/// How many results a recall considers and how similar they must be
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecallPolicy {
    pub top_k: usize,
    /// Results must score strictly above this
    pub relevance_threshold: f32,
}

impl Default for RecallPolicy {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
        }
    }
}

impl MemoryConfig {
    /// Build the configuration from environment variables
    pub fn from_env() -> Result<Self, MemoryError> {
        let db_path = default_db_path()?;

        let embedding = EmbeddingConfig {
            base_url: env_string("LOCALMIND_EMBEDDING_URL"),
            model: env_string("LOCALMIND_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            api_key: env_string("LOCALMIND_EMBEDDING_API_KEY")
                .or_else(|| env_string("OPENAI_API_KEY")),
            dimension: env_parse("LOCALMIND_EMBEDDING_DIM", EMBEDDING_DIM),
        };

        let recall = RecallPolicy {
            top_k: env_parse("LOCALMIND_TOP_K", DEFAULT_TOP_K),
            relevance_threshold: env_parse(
                "LOCALMIND_RELEVANCE_THRESHOLD",
                DEFAULT_RELEVANCE_THRESHOLD,
            ),
        };

        Ok(Self {
            db_path,
            embedding,
            recall,
        })
    }

    /// Configuration with defaults and an explicit database path
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            embedding: EmbeddingConfig::default(),
            recall: RecallPolicy::default(),
        }
    }
}

/// Resolve the database path: LOCALMIND_DB_PATH, else ~/.localmind/memory.redb
pub fn default_db_path() -> Result<PathBuf, MemoryError> {
    if let Some(env_path) = env_string("LOCALMIND_DB_PATH") {
        return Ok(PathBuf::from(env_path));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| MemoryError::Init("Cannot determine home directory".to_string()))?;
    Ok(home.join(DATA_DIR_NAME).join(DB_FILE_NAME))
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr + std::fmt::Display + Copy>(key: &str, default: T) -> T {
    match env_string(key) {
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid {}='{}', using default {}", key, raw, default);
                default
            }
        },
        None => default,
    }
}
