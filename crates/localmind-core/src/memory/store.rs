//! ============================================================================
//! Memory Store - redb-backed persistent document storage
//! ============================================================================
//! One database file, one `vectors` table keyed by document id. Records are
//! bincode-encoded documents. Every operation opens the database lazily, so
//! initialization failures surface through whichever call comes first.
//!
//! redb work is blocking and runs on the blocking pool. A caller that drops
//! the future does not abort the transaction: it commits or fails whole.
//!
//! Known race: `clear` and an in-flight `add_document` are separate write
//! transactions, so a write that commits after the clear survives it.
//! ============================================================================

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::types::{Document, Role};
use crate::error::MemoryError;

// Table definitions
const VECTORS: TableDefinition<&str, &[u8]> = TableDefinition::new("vectors");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SCHEMA_KEY: &str = "schema_version";

/// On-disk layout version. There is no migration path: a different version
/// must be cleared manually.
pub const SCHEMA_VERSION: u64 = 1;

/// Persistent document store for conversational memory
pub struct MemoryStore {
    path: PathBuf,
    db: OnceCell<Arc<Database>>,
}

impl MemoryStore {
    /// Create a store for the given database file. Nothing is opened until
    /// the first operation (or an explicit `init`).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: OnceCell::new(),
        }
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open (or create) the database and its tables. Idempotent; concurrent
    /// callers share a single open.
    pub async fn init(&self) -> Result<(), MemoryError> {
        self.database().await.map(|_| ())
    }

    /// Whether the database has been opened
    pub fn is_initialized(&self) -> bool {
        self.db.initialized()
    }

    async fn database(&self) -> Result<Arc<Database>, MemoryError> {
        let db = self
            .db
            .get_or_try_init(|| async {
                let path = self.path.clone();
                tokio::task::spawn_blocking(move || open_database(&path))
                    .await
                    .map_err(MemoryError::init("Database open task failed"))?
            })
            .await?;
        Ok(Arc::clone(db))
    }

    /// Run a blocking closure against the opened database
    async fn with_db<T, F>(&self, op: F) -> Result<T, MemoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, MemoryError> + Send + 'static,
    {
        let db = self.database().await?;
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(MemoryError::storage("Storage task failed"))?
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    /// Insert a document, overwriting any existing document with the same id
    pub async fn add_document(&self, doc: Document) -> Result<(), MemoryError> {
        self.with_db(move |db| {
            let value = encode(&doc)?;

            let write_txn = db
                .begin_write()
                .map_err(MemoryError::storage("Failed to begin write"))?;
            {
                let mut table = write_txn
                    .open_table(VECTORS)
                    .map_err(MemoryError::storage("Failed to open vectors table"))?;
                table
                    .insert(doc.id.as_str(), value.as_slice())
                    .map_err(MemoryError::storage("Failed to insert document"))?;
            }
            write_txn
                .commit()
                .map_err(MemoryError::storage("Failed to commit"))?;

            debug!("Stored document {} ({})", doc.id, doc.metadata.role);
            Ok(())
        })
        .await
    }

    /// Look up a single document by id
    pub async fn get(&self, id: &str) -> Result<Option<Document>, MemoryError> {
        let id = id.to_string();
        self.with_db(move |db| {
            let read_txn = db
                .begin_read()
                .map_err(MemoryError::storage("Failed to begin read"))?;
            let table = read_txn
                .open_table(VECTORS)
                .map_err(MemoryError::storage("Failed to open vectors table"))?;

            match table
                .get(id.as_str())
                .map_err(MemoryError::storage("Failed to get document"))?
            {
                Some(value) => Ok(Some(decode(value.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Return every stored document. No pagination: ranking needs the full
    /// corpus anyway.
    pub async fn get_all(&self) -> Result<Vec<Document>, MemoryError> {
        self.with_db(|db| {
            let read_txn = db
                .begin_read()
                .map_err(MemoryError::storage("Failed to begin read"))?;
            let table = read_txn
                .open_table(VECTORS)
                .map_err(MemoryError::storage("Failed to open vectors table"))?;

            let mut results = Vec::new();
            let iter = table
                .range::<&str>(..)
                .map_err(MemoryError::storage("Failed to iterate documents"))?;
            for entry in iter {
                let (_key, value) = entry.map_err(MemoryError::storage("Failed to read entry"))?;
                results.push(decode(value.value())?);
            }
            Ok(results)
        })
        .await
    }

    /// Delete every document. Irreversible. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize, MemoryError> {
        let removed = self
            .with_db(|db| {
                let write_txn = db
                    .begin_write()
                    .map_err(MemoryError::storage("Failed to begin write"))?;
                let removed = {
                    let table = write_txn
                        .open_table(VECTORS)
                        .map_err(MemoryError::storage("Failed to open vectors table"))?;
                    table
                        .len()
                        .map_err(MemoryError::storage("Failed to count documents"))?
                        as usize
                };
                write_txn
                    .delete_table(VECTORS)
                    .map_err(MemoryError::storage("Failed to drop vectors table"))?;
                write_txn
                    .open_table(VECTORS)
                    .map_err(MemoryError::storage("Failed to recreate vectors table"))?;
                write_txn
                    .commit()
                    .map_err(MemoryError::storage("Failed to commit clear"))?;
                Ok(removed)
            })
            .await?;

        info!("Cleared {} documents from {}", removed, self.path.display());
        Ok(removed)
    }

    /// Number of stored documents
    pub async fn count(&self) -> Result<usize, MemoryError> {
        self.with_db(|db| {
            let read_txn = db
                .begin_read()
                .map_err(MemoryError::storage("Failed to begin read"))?;
            let table = read_txn
                .open_table(VECTORS)
                .map_err(MemoryError::storage("Failed to open vectors table"))?;
            let len = table
                .len()
                .map_err(MemoryError::storage("Failed to count documents"))?;
            Ok(len as usize)
        })
        .await
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub async fn stats(&self) -> Result<StoreStats, MemoryError> {
        let docs = self.get_all().await?;

        let mut role_counts = BTreeMap::new();
        let mut model_counts = BTreeMap::new();
        let mut dimensions = BTreeMap::new();
        for doc in &docs {
            *role_counts.entry(doc.metadata.role).or_insert(0usize) += 1;
            *model_counts
                .entry(doc.metadata.embedding_model.clone())
                .or_insert(0usize) += 1;
            *dimensions.entry(doc.dimension()).or_insert(0usize) += 1;
        }

        if dimensions.len() > 1 {
            warn!(
                "Memory store holds mixed embedding dimensions: {:?}",
                dimensions.keys().collect::<Vec<_>>()
            );
        }

        Ok(StoreStats {
            total_documents: docs.len(),
            role_counts,
            model_counts,
            dimensions,
            schema_version: SCHEMA_VERSION,
        })
    }
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_documents: usize,
    pub role_counts: BTreeMap<Role, usize>,
    pub model_counts: BTreeMap<String, usize>,
    /// Embedding length -> number of documents
    pub dimensions: BTreeMap<usize, usize>,
    pub schema_version: u64,
}

fn open_database(path: &Path) -> Result<Arc<Database>, MemoryError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(MemoryError::init("Failed to create database directory"))?;
        }
    }

    info!("Opening memory database at: {}", path.display());

    let db = Database::create(path).map_err(MemoryError::init("Failed to open database"))?;

    // Ensure tables exist and the schema matches
    let write_txn = db
        .begin_write()
        .map_err(MemoryError::init("Failed to begin write"))?;
    {
        write_txn
            .open_table(VECTORS)
            .map_err(MemoryError::init("Failed to create vectors table"))?;
        let mut meta = write_txn
            .open_table(META)
            .map_err(MemoryError::init("Failed to create meta table"))?;

        let existing = meta
            .get(SCHEMA_KEY)
            .map_err(MemoryError::init("Failed to read schema version"))?
            .map(|v| v.value());
        match existing {
            Some(version) if version != SCHEMA_VERSION => {
                return Err(MemoryError::Init(format!(
                    "Unsupported schema version {} (expected {}); clear the memory database",
                    version, SCHEMA_VERSION
                )));
            }
            Some(_) => {}
            None => {
                meta.insert(SCHEMA_KEY, SCHEMA_VERSION)
                    .map_err(MemoryError::init("Failed to write schema version"))?;
            }
        }
    }
    write_txn
        .commit()
        .map_err(MemoryError::init("Failed to commit init"))?;

    info!("Memory database ready");
    Ok(Arc::new(db))
}

fn encode(doc: &Document) -> Result<Vec<u8>, MemoryError> {
    bincode::serialize(doc).map_err(MemoryError::storage("Failed to serialize document"))
}

fn decode(bytes: &[u8]) -> Result<Document, MemoryError> {
    bincode::deserialize(bytes).map_err(MemoryError::storage("Failed to deserialize document"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, MemoryStore) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path().join("memory.redb"));
        (dir, store)
    }

    fn doc(id: &str, content: &str, embedding: Vec<f32>) -> Document {
        Document::new(content.to_string(), Role::User, embedding, "test".to_string()).with_id(id)
    }

    #[tokio::test]
    async fn test_lazy_init() {
        let (_dir, store) = temp_store();
        assert!(!store.is_initialized());
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.is_initialized());
    }

    #[tokio::test]
    async fn test_init_idempotent() {
        let (_dir, store) = temp_store();
        store.init().await.unwrap();
        store.init().await.unwrap();

        let (a, b) = tokio::join!(store.init(), store.init());
        assert!(a.is_ok() && b.is_ok());
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let (_dir, store) = temp_store();
        store.add_document(doc("a", "hello", vec![1.0, 0.0])).await.unwrap();

        let fetched = store.get("a").await.unwrap().unwrap();
        assert_eq!(fetched.content, "hello");
        assert_eq!(fetched.embedding, vec![1.0, 0.0]);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let (_dir, store) = temp_store();
        store.add_document(doc("a", "first", vec![1.0])).await.unwrap();
        store.add_document(doc("a", "second", vec![1.0])).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "second");
    }

    #[tokio::test]
    async fn test_clear() {
        let (_dir, store) = temp_store();
        store.add_document(doc("a", "one", vec![1.0])).await.unwrap();
        store.add_document(doc("b", "two", vec![1.0])).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.get_all().await.unwrap().is_empty());

        // Store stays usable after a clear
        store.add_document(doc("c", "three", vec![1.0])).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.redb");

        {
            let store = MemoryStore::new(&path);
            store.add_document(doc("a", "kept", vec![0.5, 0.5])).await.unwrap();
        }

        let reopened = MemoryStore::new(&path);
        let fetched = reopened.get("a").await.unwrap().unwrap();
        assert_eq!(fetched.content, "kept");
        assert_eq!(fetched.metadata.embedding_model, "test");
    }

    #[tokio::test]
    async fn test_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path().join("nested").join("deeper").join("memory.redb"));
        store.init().await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_schema_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.redb");

        {
            let db = Database::create(&path).unwrap();
            let txn = db.begin_write().unwrap();
            {
                let mut meta = txn.open_table(META).unwrap();
                meta.insert(SCHEMA_KEY, 99u64).unwrap();
            }
            txn.commit().unwrap();
        }

        let store = MemoryStore::new(&path);
        let err = store.init().await.unwrap_err();
        assert!(matches!(err, MemoryError::Init(_)));
        // Every entry point surfaces the same failure
        assert!(matches!(store.count().await, Err(MemoryError::Init(_))));
    }

    #[tokio::test]
    async fn test_stats() {
        let (_dir, store) = temp_store();
        store.add_document(doc("a", "u", vec![1.0, 0.0])).await.unwrap();
        store
            .add_document(
                Document::new("x".into(), Role::Assistant, vec![0.0, 1.0], "other".into())
                    .with_id("b"),
            )
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.role_counts.get(&Role::User), Some(&1));
        assert_eq!(stats.role_counts.get(&Role::Assistant), Some(&1));
        assert_eq!(stats.model_counts.get("other"), Some(&1));
        assert_eq!(stats.dimensions.get(&2), Some(&2));
        assert_eq!(stats.schema_version, SCHEMA_VERSION);
    }
}
