//! ============================================================================
//! Memory Service - Remember turns, recall relevant context
//! ============================================================================
//! The only entry point the chat layer uses. Writes and recalls are best
//! effort: failures are logged and turn into "nothing remembered" so the
//! conversation never stalls on memory. Only `init` and `clear_memory`
//! report errors.
//! ============================================================================

use chrono::{Local, TimeZone};
use std::sync::Arc;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, error, info};

use super::embeddings::{create_embedding_provider, EmbeddingProvider};
use super::search::VectorSearch;
use super::store::MemoryStore;
use super::types::{Document, MemoryStatus, Role, SearchResult};
use crate::config::{MemoryConfig, RecallPolicy};
use crate::error::MemoryError;

/// Header of the recalled context block
pub const CONTEXT_HEADER: &str = "RELEVANT CONTEXT FROM PAST CONVERSATIONS:";

/// Date format of each recalled entry (month/day/year, local time)
const CONTEXT_DATE_FORMAT: &str = "%-m/%-d/%Y";

/// Memory service combining store, search and embeddings
pub struct MemoryService {
    store: MemoryStore,
    embeddings: Arc<dyn EmbeddingProvider>,
    policy: RecallPolicy,
    ready: OnceCell<()>,
    status: watch::Sender<MemoryStatus>,
}

impl MemoryService {
    /// Create a memory service. Nothing is opened or loaded until `init`
    /// or the first memory operation.
    pub fn new(store: MemoryStore, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        let (status, _) = watch::channel(MemoryStatus::Idle);
        Self {
            store,
            embeddings,
            policy: RecallPolicy::default(),
            ready: OnceCell::new(),
            status,
        }
    }

    /// Build the store and embedding provider described by the config
    pub fn from_config(config: &MemoryConfig) -> Self {
        let store = MemoryStore::new(config.db_path.clone());
        let embeddings = create_embedding_provider(&config.embedding);
        Self::new(store, embeddings).with_policy(config.recall)
    }

    /// Override the recall policy
    pub fn with_policy(mut self, policy: RecallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Open the store and load the embedding provider. Idempotent;
    /// concurrent callers wait on the same initialization. A failed
    /// initialization is retried by the next call.
    pub async fn init(&self) -> Result<(), MemoryError> {
        if self.ready.initialized() {
            return Ok(());
        }

        self.set_status(MemoryStatus::Loading);
        let result = self
            .ready
            .get_or_try_init(|| async {
                self.store.init().await?;
                self.embeddings.init().await?;
                Ok::<(), MemoryError>(())
            })
            .await;

        match result {
            Ok(_) => {
                info!(
                    "Memory service initialized (model: {}, db: {})",
                    self.embeddings.model_id(),
                    self.store.path().display()
                );
                self.set_status(MemoryStatus::Ready);
                Ok(())
            }
            Err(e) => {
                error!("Failed to initialize memory service: {}", e);
                self.set_status(MemoryStatus::Error);
                Err(match e {
                    MemoryError::Init(msg) => MemoryError::Init(msg),
                    other => MemoryError::Init(other.to_string()),
                })
            }
        }
    }

    async fn embedding(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        self.init().await?;
        self.embeddings.embed(text).await
    }

    // ========================================================================
    // Write Path
    // ========================================================================

    /// Embed and store one conversational turn. Never fails: errors are
    /// logged and `None` is returned. Returns the new document id.
    pub async fn add_memory(&self, text: &str, role: Role) -> Option<String> {
        self.set_status(MemoryStatus::Indexing);

        match self.try_add_memory(text, role).await {
            Ok(id) => {
                self.set_status(MemoryStatus::Ready);
                Some(id)
            }
            Err(e) => {
                error!("Error adding memory: {}", e);
                self.set_status(MemoryStatus::Error);
                None
            }
        }
    }

    async fn try_add_memory(&self, text: &str, role: Role) -> Result<String, MemoryError> {
        let embedding = self.embedding(text).await?;
        let doc = Document::new(
            text.to_string(),
            role,
            embedding,
            self.embeddings.model_id().to_string(),
        );
        let id = doc.id.clone();

        self.store.add_document(doc).await?;

        debug!("Remembered {} turn {}", role, id);
        Ok(id)
    }

    /// Store both turns of a completed exchange, user first
    pub async fn remember_exchange(
        &self,
        user_text: &str,
        assistant_text: &str,
    ) -> (Option<String>, Option<String>) {
        let user_id = self.add_memory(user_text, Role::User).await;
        let assistant_id = self.add_memory(assistant_text, Role::Assistant).await;
        (user_id, assistant_id)
    }

    // ========================================================================
    // Read Path
    // ========================================================================

    /// Build the context block for a query: the top matches scoring above
    /// the relevance threshold, formatted for the system prompt. Returns an
    /// empty string when nothing is relevant or anything fails.
    pub async fn retrieve_context(&self, query: &str) -> String {
        self.set_status(MemoryStatus::Searching);

        match self.try_retrieve_context(query).await {
            Ok(context) => {
                self.set_status(MemoryStatus::Ready);
                context
            }
            Err(e) => {
                error!("Error retrieving context: {}", e);
                self.set_status(MemoryStatus::Error);
                String::new()
            }
        }
    }

    async fn try_retrieve_context(&self, query: &str) -> Result<String, MemoryError> {
        let results = self.search_memories(query, self.policy.top_k).await?;

        let relevant: Vec<SearchResult> = results
            .into_iter()
            .filter(|r| r.score > self.policy.relevance_threshold)
            .collect();

        debug!(
            "{} memories above relevance threshold {}",
            relevant.len(),
            self.policy.relevance_threshold
        );

        Ok(format_context(&relevant))
    }

    /// Rank stored memories against a query without the relevance filter.
    /// Errors are returned, unlike `retrieve_context`.
    pub async fn search_memories(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, MemoryError> {
        let embedding = self.embedding(query).await?;
        self.store
            .search(&embedding, top_k, Some(self.embeddings.model_id()))
            .await
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Delete every memory. Irreversible; errors are surfaced.
    pub async fn clear_memory(&self) -> Result<usize, MemoryError> {
        let removed = self.store.clear().await?;
        info!("Cleared {} memories", removed);
        Ok(removed)
    }

    /// Number of stored memories
    pub async fn count(&self) -> Result<usize, MemoryError> {
        self.store.count().await
    }

    /// Current activity of the memory subsystem
    pub fn status(&self) -> MemoryStatus {
        *self.status.borrow()
    }

    /// Watch status changes (e.g. to drive a UI indicator)
    pub fn subscribe_status(&self) -> watch::Receiver<MemoryStatus> {
        self.status.subscribe()
    }

    fn set_status(&self, status: MemoryStatus) {
        self.status.send_replace(status);
    }

    pub fn policy(&self) -> RecallPolicy {
        self.policy
    }

    /// Identifier of the embedding model in use
    pub fn embedding_model(&self) -> &str {
        self.embeddings.model_id()
    }

    /// Get reference to the store (for advanced operations)
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

/// Format recalled memories for inclusion in the system prompt. Empty
/// input gives an empty string.
pub fn format_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let entries = results
        .iter()
        .map(|r| {
            format!(
                "[{}] {}: {}",
                format_date(r.document.metadata.timestamp),
                r.document.metadata.role.label(),
                r.document.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("\n{}\n{}\n\n", CONTEXT_HEADER, entries)
}

fn format_date(timestamp_ms: i64) -> String {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format(CONTEXT_DATE_FORMAT).to_string())
        .unwrap_or_else(|| format!("(invalid: {})", timestamp_ms))
}
