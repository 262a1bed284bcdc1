//! Concurrent in-memory memory store.
//!
//! Owns the HNSW graph behind a single mutex (the graph gate), the record
//! metadata map, the bidirectional external-id <-> internal-index mapping,
//! the pending-delete queue, and the background cleanup task.
//!
//! Locking discipline: every graph access (insert, search, rebuild, clear)
//! goes through the gate; embedding calls run outside it so network
//! latency never extends lock hold time. Metadata maps are concurrent and
//! gate-free. Once `add_memory` returns, the record is visible to any
//! subsequent search on the same store (happens-before via the gate).

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use recall_embeddings::{Embedding, EmbeddingError, EmbeddingProvider};
use recall_index::{reduce, similarity_from, HnswGraph};
use recall_types::MemoryRecord;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::metrics::{MetricsSnapshot, StoreMetrics};

/// A soft-deleted id waiting out its grace period.
#[derive(Debug)]
struct PendingDelete {
    id: String,
    deleted_at: Instant,
}

struct StoreInner {
    config: StoreConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    /// The graph gate: serializes all graph access
    graph: Mutex<HnswGraph>,
    records: DashMap<String, MemoryRecord>,
    id_to_index: DashMap<String, u32>,
    index_to_id: DashMap<u32, String>,
    pending_deletes: Mutex<VecDeque<PendingDelete>>,
    metrics: StoreMetrics,
    shutdown: CancellationToken,
}

/// Concurrent semantic memory store.
pub struct MemoryStore {
    inner: Arc<StoreInner>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Create a store and start its cleanup task (when enabled).
    ///
    /// Must be called from within a Tokio runtime if cleanup is enabled.
    /// Fails fast on an invalid configuration.
    pub fn new(
        config: StoreConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, StoreError> {
        config.validate()?;
        let graph = HnswGraph::new(config.index.clone())?;

        let inner = Arc::new(StoreInner {
            config,
            embedder,
            graph: Mutex::new(graph),
            records: DashMap::new(),
            id_to_index: DashMap::new(),
            index_to_id: DashMap::new(),
            pending_deletes: Mutex::new(VecDeque::new()),
            metrics: StoreMetrics::default(),
            shutdown: CancellationToken::new(),
        });

        let cleanup_task = if inner.config.cleanup.enabled {
            Some(spawn_cleanup(inner.clone()))
        } else {
            None
        };

        info!(
            dimensions = inner.config.index.dimensions(),
            m = inner.config.index.m,
            cleanup = inner.config.cleanup.enabled,
            "memory store created"
        );

        Ok(Self {
            inner,
            cleanup_task: Mutex::new(cleanup_task),
        })
    }

    /// Store a record and index its embedding.
    ///
    /// Metadata lands first; if embedding fails the record is retained but
    /// unsearchable until re-added. The id maps are updated under the
    /// graph gate, so a record is never half-visible.
    pub async fn add_memory(&self, mut record: MemoryRecord) -> Result<String, StoreError> {
        let id = record.id.clone();
        record.relevance_score = 0.0;
        let content = record.content.clone();
        self.inner.records.insert(id.clone(), record);

        let embedding = match self.embed(&content).await {
            Ok(e) => e,
            Err(e) => {
                StoreMetrics::bump(&self.inner.metrics.embed_failures);
                warn!(id = %id, error = %e, "embedding failed, record stored unsearchable");
                return Err(StoreError::EmbeddingGeneration(e));
            }
        };
        let reduced = self.reduce_to_index_dim(&embedding)?;

        {
            let mut graph = self.inner.graph.lock();
            let internal = graph.insert(&reduced)?;
            self.inner.id_to_index.insert(id.clone(), internal);
            self.inner.index_to_id.insert(internal, id.clone());
            self.inner
                .metrics
                .vector_count
                .store(graph.len(), Ordering::Relaxed);
        }

        StoreMetrics::bump(&self.inner.metrics.inserts);
        debug!(id = %id, "memory added");
        Ok(id)
    }

    /// Store a batch of records with one batched embedding call.
    ///
    /// Returns the ids in input order. Fails as a whole if the batch
    /// embedding call fails; metadata for every record is retained.
    pub async fn add_memories(
        &self,
        mut records: Vec<MemoryRecord>,
    ) -> Result<Vec<String>, StoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(records.len());
        for record in records.iter_mut() {
            record.relevance_score = 0.0;
            ids.push(record.id.clone());
            self.inner
                .records
                .insert(record.id.clone(), record.clone());
        }

        let texts: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
        let timeout = Duration::from_millis(self.inner.config.embed_timeout_ms);
        let embeddings =
            match tokio::time::timeout(timeout, self.inner.embedder.embed_batch(&texts)).await {
                Ok(Ok(e)) => e,
                Ok(Err(e)) => {
                    StoreMetrics::bump(&self.inner.metrics.embed_failures);
                    return Err(StoreError::EmbeddingGeneration(e));
                }
                Err(_) => {
                    StoreMetrics::bump(&self.inner.metrics.embed_failures);
                    return Err(StoreError::EmbeddingGeneration(EmbeddingError::Timeout(
                        self.inner.config.embed_timeout_ms,
                    )));
                }
            };

        let mut reduced = Vec::with_capacity(embeddings.len());
        for embedding in &embeddings {
            reduced.push(self.reduce_to_index_dim(embedding)?);
        }

        {
            let mut graph = self.inner.graph.lock();
            for (id, vector) in ids.iter().zip(reduced.iter()) {
                let internal = graph.insert(vector)?;
                self.inner.id_to_index.insert(id.clone(), internal);
                self.inner.index_to_id.insert(internal, id.clone());
                StoreMetrics::bump(&self.inner.metrics.inserts);
            }
            self.inner
                .metrics
                .vector_count
                .store(graph.len(), Ordering::Relaxed);
        }

        debug!(count = ids.len(), "memory batch added");
        Ok(ids)
    }

    /// Semantic search over one owner's active records.
    ///
    /// The candidate count is widened to `min(limit * 2, max_candidates)`
    /// to absorb owner/activity filtering. Any recoverable failure along
    /// the vector path degrades to the substring fallback.
    pub async fn search_memories(
        &self,
        query: &str,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        StoreMetrics::bump(&self.inner.metrics.searches);

        let embedding = match self.embed(query).await {
            Ok(e) => e,
            Err(e) => {
                StoreMetrics::bump(&self.inner.metrics.embed_failures);
                warn!(error = %e, "query embedding failed, using fallback search");
                return Ok(self.fallback_search(query, owner_id, limit));
            }
        };
        let reduced = match self.reduce_to_index_dim(&embedding) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "query reduction failed, using fallback search");
                return Ok(self.fallback_search(query, owner_id, limit));
            }
        };

        let candidates = (limit * 2).min(self.inner.config.max_candidates);
        let hits = {
            let graph = self.inner.graph.lock();
            graph.search(&reduced, candidates)
        };
        let hits = match hits {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "graph search failed, using fallback search");
                return Ok(self.fallback_search(query, owner_id, limit));
            }
        };

        let metric = self.inner.config.index.metric;
        let threshold = self.inner.config.index.similarity_threshold;
        let mut out: Vec<MemoryRecord> = Vec::with_capacity(hits.len());

        for (internal, dist) in hits {
            let Some(id) = self.inner.index_to_id.get(&internal) else {
                // Tombstoned slot still present in the graph
                continue;
            };
            let Some(record) = self.inner.records.get(id.value()) else {
                continue;
            };
            if !record.is_active || record.owner_id != owner_id {
                continue;
            }
            let similarity = similarity_from(metric, dist);
            if similarity < threshold {
                continue;
            }
            let mut record = record.clone();
            record.relevance_score = similarity;
            out.push(record);
        }

        out.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out.truncate(limit);
        Ok(out)
    }

    /// All active records for an owner, newest first.
    pub fn get_memories(&self, owner_id: &str, session_id: Option<&str>) -> Vec<MemoryRecord> {
        let mut out: Vec<MemoryRecord> = self
            .inner
            .records
            .iter()
            .filter(|entry| {
                let r = entry.value();
                r.is_active
                    && r.owner_id == owner_id
                    && session_id.is_none_or(|s| r.session_id.as_deref() == Some(s))
            })
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    /// Look up a single record by id.
    pub fn get_memory(&self, id: &str) -> Option<MemoryRecord> {
        self.inner.records.get(id).map(|entry| entry.clone())
    }

    /// Metadata-only update.
    ///
    /// The stored vector is NOT regenerated: the graph keeps ranking this
    /// record by its previous content. Call [`MemoryStore::refresh_memory`]
    /// when the embedding must follow the content.
    pub fn update_memory(&self, update: MemoryRecord) -> Result<(), StoreError> {
        let mut entry = self
            .inner
            .records
            .get_mut(&update.id)
            .ok_or_else(|| StoreError::NotFound(update.id.clone()))?;
        entry.content = update.content;
        entry.kind = update.kind;
        entry.session_id = update.session_id;
        entry.touch();
        debug!(id = %update.id, "memory updated (vector unchanged)");
        Ok(())
    }

    /// Re-embed a record's current content and swap its vector.
    ///
    /// The old graph slot is orphaned (tombstoned) and reclaimed by the
    /// next rebuild; the new vector is visible as soon as this returns.
    pub async fn refresh_memory(&self, id: &str) -> Result<(), StoreError> {
        let content = {
            let entry = self
                .inner
                .records
                .get(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            if !entry.is_active {
                return Err(StoreError::NotFound(id.to_string()));
            }
            entry.content.clone()
        };

        let embedding = self
            .embed(&content)
            .await
            .map_err(StoreError::EmbeddingGeneration)?;
        let reduced = self.reduce_to_index_dim(&embedding)?;

        let mut graph = self.inner.graph.lock();
        let internal = graph.insert(&reduced)?;
        if let Some((_, old_internal)) = self.inner.id_to_index.remove(id) {
            self.inner.index_to_id.remove(&old_internal);
        }
        self.inner.id_to_index.insert(id.to_string(), internal);
        self.inner.index_to_id.insert(internal, id.to_string());
        self.inner
            .metrics
            .vector_count
            .store(graph.len(), Ordering::Relaxed);

        debug!(id = %id, "memory re-embedded");
        Ok(())
    }

    /// Soft-delete a record: invisible to search immediately, physically
    /// removed by cleanup after the grace period. Idempotent.
    pub fn delete_memory(&self, id: &str) {
        let newly_deleted = match self.inner.records.get_mut(id) {
            Some(mut entry) => {
                if entry.is_active {
                    entry.is_active = false;
                    entry.touch();
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if newly_deleted {
            self.inner.pending_deletes.lock().push_back(PendingDelete {
                id: id.to_string(),
                deleted_at: Instant::now(),
            });
            StoreMetrics::bump(&self.inner.metrics.deletes);
            debug!(id = %id, "memory soft-deleted");
        }
    }

    /// Drop the graph and all metadata atomically under the graph gate.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut graph = self.inner.graph.lock();
        *graph = HnswGraph::new(self.inner.config.index.clone())?;
        self.inner.records.clear();
        self.inner.id_to_index.clear();
        self.inner.index_to_id.clear();
        self.inner.pending_deletes.lock().clear();
        self.inner
            .metrics
            .vector_count
            .store(0, Ordering::Relaxed);
        info!("memory store cleared");
        Ok(())
    }

    /// Observability snapshot. Never takes the graph gate.
    pub fn metrics(&self) -> MetricsSnapshot {
        let m = &self.inner.metrics;
        let vector_count = m.vector_count.load(Ordering::Relaxed);
        MetricsSnapshot {
            vector_count,
            record_count: self.inner.records.len(),
            pending_deletes: self.inner.pending_deletes.lock().len(),
            inserts: m.inserts.load(Ordering::Relaxed),
            searches: m.searches.load(Ordering::Relaxed),
            fallback_searches: m.fallback_searches.load(Ordering::Relaxed),
            deletes: m.deletes.load(Ordering::Relaxed),
            cleanup_purges: m.cleanup_purges.load(Ordering::Relaxed),
            embed_failures: m.embed_failures.load(Ordering::Relaxed),
            rebuilds: m.rebuilds.load(Ordering::Relaxed),
            estimated_memory_bytes: vector_count
                * self.inner.config.index.estimated_bytes_per_vector(),
        }
    }

    /// Share of graph slots whose record is gone or unreachable.
    pub fn tombstone_ratio(&self) -> f32 {
        let total = self.inner.metrics.vector_count.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        1.0 - self.inner.index_to_id.len() as f32 / total as f32
    }

    /// Run one cleanup cycle immediately (also used by the background
    /// task). Purges up to `batch_size` tombstones older than the grace
    /// period, then rebuilds the graph if tombstone pressure crosses the
    /// threshold.
    pub fn run_cleanup(&self) {
        self.inner.run_cleanup_cycle();
        self.inner.maybe_rebuild();
    }

    /// Rebuild the graph from live vectors only, dropping tombstoned
    /// slots. Holds the graph gate for the duration.
    pub fn rebuild(&self) -> Result<(), StoreError> {
        let mut graph = self.inner.graph.lock();
        self.inner.rebuild_locked(&mut graph)
    }

    /// Stop the cleanup task, draining the pending-delete queue. Bounded:
    /// logs a warning and proceeds if the task does not stop in time.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handle = self.cleanup_task.lock().take();
        if let Some(handle) = handle {
            let timeout = Duration::from_millis(self.inner.config.shutdown_timeout_ms);
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!(
                    timeout_ms = self.inner.config.shutdown_timeout_ms,
                    "cleanup task did not stop in time, proceeding"
                );
            }
        }
    }

    /// Substring fallback over active records. Scores by occurrence count
    /// (normalized to the best match), breaking ties by recency.
    fn fallback_search(&self, query: &str, owner_id: &str, limit: usize) -> Vec<MemoryRecord> {
        StoreMetrics::bump(&self.inner.metrics.fallback_searches);
        let needle = query.to_lowercase();
        if needle.trim().is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<(usize, MemoryRecord)> = self
            .inner
            .records
            .iter()
            .filter(|entry| entry.value().is_active && entry.value().owner_id == owner_id)
            .filter_map(|entry| {
                let count = entry.value().content.to_lowercase().matches(&needle).count();
                (count > 0).then(|| (count, entry.value().clone()))
            })
            .collect();

        matches.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.updated_at.cmp(&a.1.updated_at)));
        let best = matches.first().map(|(count, _)| *count).unwrap_or(1) as f32;

        matches
            .into_iter()
            .take(limit)
            .map(|(count, mut record)| {
                record.relevance_score = count as f32 / best;
                record
            })
            .collect()
    }

    /// Embed with the configured deadline. A timed-out or canceled call
    /// leaves no graph entry.
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let timeout = Duration::from_millis(self.inner.config.embed_timeout_ms);
        match tokio::time::timeout(timeout, self.inner.embedder.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout(self.inner.config.embed_timeout_ms)),
        }
    }

    fn reduce_to_index_dim(&self, embedding: &Embedding) -> Result<Vec<f32>, StoreError> {
        let reduced = reduce(
            &embedding.values,
            self.inner.config.index.dimensions(),
            self.inner.config.reduction,
        )?;
        Ok(reduced)
    }
}

impl StoreInner {
    /// Purge aged tombstones, bounded by the batch size. The queue is in
    /// deletion order, so the first entry inside the grace period ends the
    /// cycle.
    fn run_cleanup_cycle(&self) {
        let grace = Duration::from_secs(self.config.cleanup.grace_period_secs);
        let batch = self.config.cleanup.batch_size;
        let mut purged = 0u64;

        let mut queue = self.pending_deletes.lock();
        for _ in 0..batch {
            match queue.front() {
                Some(entry) if entry.deleted_at.elapsed() >= grace => {
                    let entry = queue.pop_front().expect("front checked above");
                    let still_inactive = self
                        .records
                        .get(&entry.id)
                        .is_some_and(|r| !r.is_active);
                    if still_inactive {
                        self.records.remove(&entry.id);
                        if let Some((_, internal)) = self.id_to_index.remove(&entry.id) {
                            self.index_to_id.remove(&internal);
                        }
                        purged += 1;
                    }
                }
                _ => break,
            }
        }
        drop(queue);

        if purged > 0 {
            self.metrics.cleanup_purges.fetch_add(purged, Ordering::Relaxed);
            debug!(purged, "cleanup cycle purged records");
        }
    }

    /// Rebuild when tombstoned slots exceed the configured share of the
    /// graph. Bounded wait on the gate; a busy gate skips this check until
    /// the next cycle.
    fn maybe_rebuild(&self) {
        let gate_timeout = Duration::from_millis(self.config.gate_timeout_ms);
        let Some(mut graph) = self.graph.try_lock_for(gate_timeout) else {
            warn!("graph gate busy, skipping rebuild check");
            return;
        };

        let total = graph.len();
        if total == 0 {
            return;
        }
        let live = self.index_to_id.len();
        let ratio = 1.0 - live as f32 / total as f32;
        if ratio < self.config.rebuild_threshold {
            return;
        }

        info!(total, live, ratio, "tombstone pressure, rebuilding graph");
        if let Err(e) = self.rebuild_locked(&mut graph) {
            warn!(error = %e, "graph rebuild failed");
        }
    }

    /// Reinsert every live vector into a fresh graph and swap the id maps.
    /// Caller holds the graph gate.
    fn rebuild_locked(&self, graph: &mut HnswGraph) -> Result<(), StoreError> {
        let mut fresh = HnswGraph::new(self.config.index.clone())?;

        let live: Vec<(String, u32)> = self
            .id_to_index
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let mut remap = Vec::with_capacity(live.len());
        for (id, old_internal) in live {
            let vector = graph.vector(old_internal);
            let internal = fresh.insert(&vector)?;
            remap.push((id, internal));
        }

        *graph = fresh;
        self.index_to_id.clear();
        for (id, internal) in remap {
            self.id_to_index.insert(id.clone(), internal);
            self.index_to_id.insert(internal, id);
        }
        self.metrics
            .vector_count
            .store(graph.len(), Ordering::Relaxed);
        self.metrics.rebuilds.fetch_add(1, Ordering::Relaxed);

        info!(vectors = graph.len(), "graph rebuilt from live vectors");
        Ok(())
    }
}

/// Background cleanup loop: fixed interval, cancellation-aware, with a
/// final drain on shutdown.
fn spawn_cleanup(inner: Arc<StoreInner>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(inner.config.cleanup.interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Consume the immediate first tick
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = inner.shutdown.cancelled() => {
                    inner.run_cleanup_cycle();
                    inner.pending_deletes.lock().clear();
                    break;
                }
                _ = ticker.tick() => {
                    inner.run_cleanup_cycle();
                    inner.maybe_rebuild();
                }
            }
        }
        debug!("cleanup task stopped");
    })
}

#[async_trait::async_trait]
impl crate::storage::MemoryStorage for MemoryStore {
    async fn add_memory(&self, record: MemoryRecord) -> Result<String, StoreError> {
        MemoryStore::add_memory(self, record).await
    }

    async fn search_memories(
        &self,
        query: &str,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        MemoryStore::search_memories(self, query, owner_id, limit).await
    }

    async fn get_memories(
        &self,
        owner_id: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        Ok(MemoryStore::get_memories(self, owner_id, session_id))
    }

    async fn get_memory(&self, id: &str) -> Result<Option<MemoryRecord>, StoreError> {
        Ok(MemoryStore::get_memory(self, id))
    }

    async fn update_memory(&self, record: MemoryRecord) -> Result<(), StoreError> {
        MemoryStore::update_memory(self, record)
    }

    async fn delete_memory(&self, id: &str) -> Result<(), StoreError> {
        MemoryStore::delete_memory(self, id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        MemoryStore::clear(self)
    }
}
