//! ============================================================================
//! Similarity Search - Exhaustive cosine ranking over stored documents
//! ============================================================================
//! Scores every document against the query, stable-sorts by score and keeps
//! the top K. Linear in corpus size; fine for a single user's history. An
//! ANN index can replace the scan behind `VectorSearch` without changing
//! callers.
//! ============================================================================

use async_trait::async_trait;
use tracing::{debug, warn};

use super::store::MemoryStore;
use super::types::{Document, SearchResult};
use crate::error::MemoryError;

/// Number of results returned when callers don't ask for a specific count
pub const DEFAULT_TOP_K: usize = 3;

/// Ranks stored documents by similarity to a query vector
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `top_k` documents, best first. When `model_filter` is
    /// set, documents embedded by any other model are skipped.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        model_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>, MemoryError>;
}

#[async_trait]
impl VectorSearch for MemoryStore {
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        model_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>, MemoryError> {
        let documents = self.get_all().await?;
        Ok(rank(documents, query, top_k, model_filter))
    }
}

/// Cosine similarity between two vectors of equal length.
/// A zero-norm input scores 0.0 instead of NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Score, sort and truncate a corpus. Documents that can't be compared with
/// the query (other dimension or other embedding model) are left out.
pub fn rank(
    documents: Vec<Document>,
    query: &[f32],
    top_k: usize,
    model_filter: Option<&str>,
) -> Vec<SearchResult> {
    if top_k == 0 || query.is_empty() {
        return Vec::new();
    }

    let total = documents.len();
    let mut skipped_dim = 0usize;
    let mut skipped_model = 0usize;

    let mut scored: Vec<SearchResult> = documents
        .into_iter()
        .filter(|doc| {
            if let Some(model) = model_filter {
                if doc.metadata.embedding_model != model {
                    skipped_model += 1;
                    return false;
                }
            }
            if doc.embedding.len() != query.len() {
                skipped_dim += 1;
                return false;
            }
            true
        })
        .map(|doc| {
            let score = cosine_similarity(query, &doc.embedding);
            SearchResult {
                document: doc,
                score,
            }
        })
        .collect();

    if skipped_model > 0 || skipped_dim > 0 {
        warn!(
            "Skipped {} documents from other embedding models and {} with mismatched dimensions",
            skipped_model, skipped_dim
        );
    }

    // sort_by is stable: equal scores keep corpus order
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);

    debug!("Ranked {} documents, returning {}", total, scored.len());
    scored
}
