//! End-to-end memory pipeline against a real redb file

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

use localmind_core::memory::{
    Document, EmbeddingProvider, HashEmbedding, MemoryService, MemoryStore, Role, CONTEXT_HEADER,
};
use localmind_core::{build_system_prompt, MemoryError, DEFAULT_SYSTEM_PROMPT};

/// Maps known texts to fixed vectors
struct FixedEmbedding {
    vectors: HashMap<&'static str, Vec<f32>>,
}

impl FixedEmbedding {
    fn new(pairs: Vec<(&'static str, Vec<f32>)>) -> Arc<Self> {
        Arc::new(Self {
            vectors: pairs.into_iter().collect(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| MemoryError::Provider(format!("unknown text: {}", text)))
    }

    fn model_id(&self) -> &str {
        "fixed"
    }

    fn dimension(&self) -> Option<usize> {
        Some(2)
    }
}

fn db_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("memory.redb")
}

#[tokio::test]
async fn test_remember_then_recall() {
    let dir = TempDir::new().unwrap();
    let provider = FixedEmbedding::new(vec![
        ("I like hiking", vec![1.0, 0.0]),
        ("What do I do on weekends?", vec![0.95, 0.05]),
    ]);
    let service = MemoryService::new(MemoryStore::new(db_path(&dir)), provider);

    service.add_memory("I like hiking", Role::User).await.unwrap();

    let context = service.retrieve_context("What do I do on weekends?").await;
    assert!(context.starts_with(&format!("\n{}\n[", CONTEXT_HEADER)));
    assert!(context.contains("] USER: I like hiking"));

    let prompt = build_system_prompt(DEFAULT_SYSTEM_PROMPT, &context);
    assert!(prompt.starts_with(CONTEXT_HEADER));
    assert!(prompt.ends_with(DEFAULT_SYSTEM_PROMPT));
}

#[tokio::test]
async fn test_only_relevant_turns_are_recalled() {
    let dir = TempDir::new().unwrap();
    let provider = FixedEmbedding::new(vec![
        ("I like hiking", vec![1.0, 0.0]),
        ("Taxes are due in April", vec![0.0, 1.0]),
        ("outdoors", vec![0.9, 0.1]),
    ]);
    let service = MemoryService::new(MemoryStore::new(db_path(&dir)), provider);

    service
        .remember_exchange("I like hiking", "Taxes are due in April")
        .await;

    let results = service.search_memories("outdoors", 3).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].document.content, "I like hiking");
    assert!(results[0].score > 0.99);
    assert!(results[1].score < 0.35);

    let context = service.retrieve_context("outdoors").await;
    assert!(context.contains("USER: I like hiking"));
    assert!(!context.contains("Taxes"));
}

#[tokio::test]
async fn test_clear_forgets_everything() {
    let dir = TempDir::new().unwrap();
    let provider = FixedEmbedding::new(vec![("I like hiking", vec![1.0, 0.0])]);
    let service = MemoryService::new(MemoryStore::new(db_path(&dir)), provider);

    service.add_memory("I like hiking", Role::User).await.unwrap();
    assert_eq!(service.clear_memory().await.unwrap(), 1);

    assert_eq!(service.count().await.unwrap(), 0);
    assert_eq!(service.retrieve_context("I like hiking").await, "");

    // The store stays usable after clearing
    service.add_memory("I like hiking", Role::User).await.unwrap();
    assert_eq!(service.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_memories_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let provider = FixedEmbedding::new(vec![("I like hiking", vec![1.0, 0.0])]);

    {
        let service = MemoryService::new(MemoryStore::new(db_path(&dir)), provider.clone());
        service.add_memory("I like hiking", Role::User).await.unwrap();
    }

    let service = MemoryService::new(MemoryStore::new(db_path(&dir)), provider);
    assert_eq!(service.count().await.unwrap(), 1);
    assert!(service
        .retrieve_context("I like hiking")
        .await
        .contains("USER: I like hiking"));
}

#[tokio::test]
async fn test_same_id_overwrites() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(db_path(&dir));

    let first = Document::new("old".into(), Role::User, vec![1.0, 0.0], "fixed".into())
        .with_id("turn-1");
    let second = Document::new("new".into(), Role::User, vec![0.0, 1.0], "fixed".into())
        .with_id("turn-1");
    store.add_document(first).await.unwrap();
    store.add_document(second).await.unwrap();

    let all = store.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].content, "new");
}

#[tokio::test]
async fn test_offline_embedding_recalls_overlapping_text() {
    let dir = TempDir::new().unwrap();
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedding::new(384));
    let service = MemoryService::new(MemoryStore::new(db_path(&dir)), provider);

    service
        .add_memory("My dog is called Biscuit", Role::User)
        .await
        .unwrap();
    service
        .add_memory("Quarterly revenue grew", Role::Assistant)
        .await
        .unwrap();

    let results = service
        .search_memories("what is my dog called", 1)
        .await
        .unwrap();
    assert_eq!(results[0].document.content, "My dog is called Biscuit");
}

#[tokio::test]
async fn test_offline_embedding_keeps_blank_turns() {
    let dir = TempDir::new().unwrap();
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedding::new(64));
    let service = MemoryService::new(MemoryStore::new(db_path(&dir)), provider);

    let (user, assistant) = service.remember_exchange("a b c", "").await;
    assert!(user.is_some());
    let assistant = assistant.expect("blank assistant turn should be stored");

    let stored = service.store().get(&assistant).await.unwrap().unwrap();
    assert_eq!(stored.content, "");
    assert_eq!(stored.metadata.role, Role::Assistant);
    assert_eq!(service.count().await.unwrap(), 2);
}
