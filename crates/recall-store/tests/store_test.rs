//! End-to-end memory store tests.
//!
//! Exercises the full path: add -> embed -> reduce -> graph insert ->
//! search -> filter -> rank, plus concurrent access and the trait seam
//! the orchestration layer consumes.

use std::sync::Arc;

use async_trait::async_trait;

use recall_embeddings::{Embedding, EmbeddingError, EmbeddingProvider};
use recall_index::{IndexConfig, VectorSize};
use recall_store::{MemoryStorage, MemoryStore, StoreConfig};
use recall_types::{MemoryKind, MemoryRecord};

/// Deterministic bag-of-words embedder. Texts sharing words produce
/// nearby vectors, which is enough structure for ranking assertions
/// without a model download.
struct WordHashEmbedder {
    dimension: usize,
}

impl WordHashEmbedder {
    fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn bucket(&self, word: &str) -> usize {
        let mut hash: u64 = 1469598103934665603;
        for b in word.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
        (hash % self.dimension as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for WordHashEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut values = vec![0.0f32; self.dimension];
        for word in text.to_lowercase().split_whitespace() {
            values[self.bucket(word)] += 1.0;
        }
        Ok(Embedding::new(values))
    }
}

/// The documented tuning scenario: M=8, ef_construction=100, ef_search=32,
/// 256 dimensions, 50 records, top-5 owner-filtered search.
#[tokio::test]
async fn test_scenario_fifty_records_top_five() {
    let mut config = StoreConfig::development();
    config.index = IndexConfig::development()
        .with_size(VectorSize::Small)
        .with_m(8)
        .with_expansion(100, 32);
    config.cleanup.enabled = false;

    let store = MemoryStore::new(config, Arc::new(WordHashEmbedder::new(256))).unwrap();

    // Five records about coffee for u1, the rest spread across topics
    // and owners
    let coffee = [
        "user prefers dark roast coffee in the morning",
        "user orders oat milk lattes at the office cafe",
        "coffee preferences include espresso over drip brew",
        "user bought a burr grinder for better coffee",
        "user dislikes decaf coffee entirely",
    ];
    for (i, text) in coffee.iter().enumerate() {
        store
            .add_memory(
                MemoryRecord::new(*text, "u1")
                    .with_kind(MemoryKind::Preference)
                    .with_id(format!("coffee-{i}")),
            )
            .await
            .unwrap();
    }

    for i in 0..30 {
        store
            .add_memory(MemoryRecord::new(
                format!("unrelated note {i} about project deadlines and meetings"),
                "u1",
            ))
            .await
            .unwrap();
    }
    for i in 0..15 {
        store
            .add_memory(MemoryRecord::new(
                format!("other owner note {i} mentioning coffee"),
                "u2",
            ))
            .await
            .unwrap();
    }

    let results = store
        .search_memories("coffee preferences", "u1", 5)
        .await
        .unwrap();

    assert!(results.len() <= 5);
    assert!(!results.is_empty());
    for record in &results {
        assert_eq!(record.owner_id, "u1");
        assert!(record.is_active);
    }
    for pair in results.windows(2) {
        assert!(
            pair[0].relevance_score >= pair[1].relevance_score,
            "results must be ordered by non-increasing similarity"
        );
    }
    // The literal phrase match should rank at the top
    assert_eq!(results[0].id, "coffee-2");
}

#[tokio::test]
async fn test_concurrent_adds_and_searches() {
    let mut config = StoreConfig::development();
    config.index = IndexConfig::development().with_size(VectorSize::Custom(64));
    config.cleanup.enabled = false;

    let store = Arc::new(MemoryStore::new(config, Arc::new(WordHashEmbedder::new(64))).unwrap());

    let mut tasks = Vec::new();
    for t in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                store
                    .add_memory(MemoryRecord::new(
                        format!("worker {t} wrote entry {i} about shared topics"),
                        "u1",
                    ))
                    .await
                    .unwrap();
                let results = store
                    .search_memories("shared topics", "u1", 3)
                    .await
                    .unwrap();
                assert!(!results.is_empty());
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = store.metrics();
    assert_eq!(snapshot.inserts, 80);
    assert_eq!(snapshot.vector_count, 80);
    assert_eq!(snapshot.fallback_searches, 0);
}

#[tokio::test]
async fn test_insert_visible_to_next_search() {
    let mut config = StoreConfig::development();
    config.index = IndexConfig::development().with_size(VectorSize::Custom(64));
    config.cleanup.enabled = false;
    let store = MemoryStore::new(config, Arc::new(WordHashEmbedder::new(64))).unwrap();

    for i in 0..20 {
        let id = store
            .add_memory(MemoryRecord::new(format!("distinct fact number {i}"), "u1"))
            .await
            .unwrap();
        let results = store
            .search_memories(&format!("distinct fact number {i}"), "u1", 1)
            .await
            .unwrap();
        assert_eq!(results[0].id, id, "insert must be visible immediately");
    }
}

#[tokio::test]
async fn test_storage_trait_object() {
    let mut config = StoreConfig::development();
    config.index = IndexConfig::development().with_size(VectorSize::Custom(64));
    config.cleanup.enabled = false;
    let store = MemoryStore::new(config, Arc::new(WordHashEmbedder::new(64))).unwrap();

    // Consumers hold the seam, not the concrete store
    let storage: Arc<dyn MemoryStorage> = Arc::new(store);

    let id = storage
        .add_memory(MemoryRecord::new("trait seam entry", "u1"))
        .await
        .unwrap();
    assert!(storage.get_memory(&id).await.unwrap().is_some());

    storage.delete_memory(&id).await.unwrap();
    let results = storage
        .search_memories("trait seam entry", "u1", 5)
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.id != id));

    storage.clear().await.unwrap();
    assert!(storage.get_memory(&id).await.unwrap().is_none());
}
