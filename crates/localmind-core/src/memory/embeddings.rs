//! ============================================================================
//! Embedding Providers - Text to vector for semantic memory
//! ============================================================================
//! `EmbeddingService` talks to any OpenAI-compatible `/embeddings` endpoint
//! (a local model server by default). `HashEmbedding` is a deterministic
//! offline fallback used when no endpoint is configured.
//! ============================================================================

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::EmbeddingConfig;
use crate::error::MemoryError;

/// Default embedding model (all-MiniLM-L6-v2 as served by local runtimes)
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";

/// Default OpenAI-compatible endpoint of a local model server
pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11434/v1";

/// Expected embedding dimension for all-MiniLM-L6-v2
pub const EMBEDDING_DIM: usize = 384;

/// Computes embedding vectors for text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Load the model or check the endpoint. Called once by the memory
    /// service before the first embedding.
    async fn init(&self) -> Result<(), MemoryError> {
        Ok(())
    }

    /// Compute the embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;

    /// Identifier recorded on every document this provider embeds
    fn model_id(&self) -> &str;

    /// Vector length, when known
    fn dimension(&self) -> Option<usize>;
}

// ============================================================================
// HTTP Embedding Service
// ============================================================================

/// Embedding service for OpenAI-compatible HTTP APIs
pub struct EmbeddingService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    /// Dimension observed by the init probe
    probed_dim: OnceCell<usize>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    model: Option<String>,
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct EmbeddingUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl EmbeddingService {
    /// Create a service for a local OpenAI-compatible model server
    pub fn new_local() -> Self {
        Self::new_custom(None, DEFAULT_EMBEDDING_URL.to_string(), DEFAULT_EMBEDDING_MODEL.to_string())
    }

    /// Create with custom base URL, model and optional bearer token
    pub fn new_custom(api_key: Option<String>, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            probed_dim: OnceCell::new(),
        }
    }

    /// Generate embeddings for multiple texts
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| MemoryError::Provider(format!("Failed to send embedding request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MemoryError::Provider(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(MemoryError::Provider(format!(
                    "Embedding API error ({}): {}",
                    status, error.error.message
                )));
            }
            return Err(MemoryError::Provider(format!(
                "Embedding API error ({}): {}",
                status, body
            )));
        }

        parse_embedding_response(&body)
    }

    /// Get the current model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn init(&self) -> Result<(), MemoryError> {
        let dim = self
            .probed_dim
            .get_or_try_init(|| async {
                let probe = self.embed_batch(vec!["ping".to_string()]).await?;
                probe
                    .first()
                    .map(Vec::len)
                    .ok_or_else(|| MemoryError::Provider("No embedding returned".to_string()))
            })
            .await
            .map_err(|e| MemoryError::Init(e.to_string()))?;

        info!(
            "Embedding model {} ready at {} ({} dims)",
            self.model, self.base_url, dim
        );
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let embedding = self
            .embed_batch(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Provider("No embedding returned".to_string()))?;

        if let Some(expected) = self.dimension() {
            if embedding.len() != expected {
                return Err(MemoryError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }
        Ok(embedding)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        self.probed_dim.get().copied()
    }
}

fn parse_embedding_response(body: &str) -> Result<Vec<Vec<f32>>, MemoryError> {
    let embedding_response: EmbeddingResponse = serde_json::from_str(body).map_err(|e| {
        MemoryError::Provider(format!("Failed to parse embedding response: {} - body: {}", e, body))
    })?;

    if let Some(usage) = &embedding_response.usage {
        debug!(
            "Embedding tokens used: {} (model: {})",
            usage.total_tokens,
            embedding_response.model.as_deref().unwrap_or("unknown")
        );
    }

    // Sort by index and extract embeddings
    let mut embeddings: Vec<(usize, Vec<f32>)> = embedding_response
        .data
        .into_iter()
        .map(|d| (d.index, d.embedding))
        .collect();
    embeddings.sort_by_key(|(idx, _)| *idx);

    Ok(embeddings.into_iter().map(|(_, e)| e).collect())
}

// ============================================================================
// Offline Hash Embedding
// ============================================================================

/// Signed feature-hashing embedding over word unigrams and adjacent-word
/// bigrams. Deterministic, unit-norm, no model download; shared wording
/// lands close together, paraphrases do not. Text with no words embeds to
/// the zero vector, which never clears a relevance threshold.
pub struct HashEmbedding {
    dimension: usize,
    model_id: String,
}

/// Bigrams count for half a unigram
const BIGRAM_WEIGHT: f32 = 0.5;

impl HashEmbedding {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("feature-hash-{}", dimension),
        }
    }

    fn project(&self, features: HashMap<u64, (u32, f32)>) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for (hash, (count, weight)) in features {
            let slot = (hash % self.dimension as u64) as usize;
            // Top bit picks the sign so collisions cancel instead of pile up
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign * weight * (1.0 + (count as f32).ln());
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        // feature hash -> (occurrences, weight)
        let mut features: HashMap<u64, (u32, f32)> = HashMap::new();
        for &token in &tokens {
            features.entry(feature_hash(&[token])).or_insert((0, 1.0)).0 += 1;
        }
        for pair in tokens.windows(2) {
            features
                .entry(feature_hash(pair))
                .or_insert((0, BIGRAM_WEIGHT))
                .0 += 1;
        }

        Ok(self.project(features))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}

/// 64-bit FNV-1a over the parts, separated by a unit separator byte
fn feature_hash(parts: &[&str]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hash ^= 0x1f;
            hash = hash.wrapping_mul(PRIME);
        }
        for &byte in part.as_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(PRIME);
        }
    }
    hash
}

/// Create the embedding provider described by the config: the HTTP service
/// when an endpoint is set, the offline hash embedding otherwise
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    match &config.base_url {
        Some(url) if !url.is_empty() => {
            debug!("Using {} at {} for embeddings", config.model, url);
            Arc::new(EmbeddingService::new_custom(
                config.api_key.clone(),
                url.clone(),
                config.model.clone(),
            ))
        }
        _ => {
            warn!(
                "No embedding endpoint configured, falling back to offline hash embeddings ({} dims)",
                config.dimension
            );
            Arc::new(HashEmbedding::new(config.dimension))
        }
    }
}
