//! Incremental HNSW graph engine.
//!
//! Multi-layer proximity graph supporting one-at-a-time insertion and
//! k-nearest-neighbor search. Vector data lives in a contiguous arena whose
//! precision follows the configured quantization mode; neighbor lists are
//! capped at `m` per layer (`2 * m` at layer 0) with heuristic pruning.
//!
//! The graph has **no delete operation** - that is structural for
//! HNSW-style graphs, not an omission. Deletion is modeled above this layer
//! by tombstoning external ids and periodically rebuilding from live
//! vectors. The engine holds no locks; callers must serialize mutation and
//! search externally (one writer at a time).

use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::config::{IndexConfig, QuantizationMode};
use crate::error::IndexError;
use crate::kernel::{self, Metric};
use crate::quantize::{QuantizedVector, QuantizedVectorI16};
use crate::visited::VisitedSet;

/// Contiguous vector storage, one layout per quantization mode.
#[derive(Debug)]
enum VectorArena {
    Float {
        data: Vec<f32>,
    },
    Int8 {
        data: Vec<u8>,
        min: Vec<f32>,
        scale: Vec<f32>,
    },
    Int16 {
        data: Vec<i16>,
        min: Vec<f32>,
        scale: Vec<f32>,
    },
}

impl VectorArena {
    fn new(mode: QuantizationMode) -> Self {
        match mode {
            QuantizationMode::None => VectorArena::Float { data: Vec::new() },
            QuantizationMode::Int8 => VectorArena::Int8 {
                data: Vec::new(),
                min: Vec::new(),
                scale: Vec::new(),
            },
            QuantizationMode::Int16 => VectorArena::Int16 {
                data: Vec::new(),
                min: Vec::new(),
                scale: Vec::new(),
            },
        }
    }

    fn push(&mut self, vector: &[f32]) {
        match self {
            VectorArena::Float { data } => data.extend_from_slice(vector),
            VectorArena::Int8 { data, min, scale } => {
                let q = QuantizedVector::quantize(vector);
                data.extend_from_slice(&q.data);
                min.push(q.min);
                scale.push(q.scale);
            }
            VectorArena::Int16 { data, min, scale } => {
                let q = QuantizedVectorI16::quantize(vector);
                data.extend_from_slice(&q.data);
                min.push(q.min);
                scale.push(q.scale);
            }
        }
    }

    /// Reconstruct node `id` into `buf` (copy for f32, dequantize otherwise).
    fn write_into(&self, id: usize, dim: usize, buf: &mut [f32]) {
        let start = id * dim;
        match self {
            VectorArena::Float { data } => buf.copy_from_slice(&data[start..start + dim]),
            VectorArena::Int8 { data, min, scale } => {
                let (m, s) = (min[id], scale[id]);
                for (slot, &b) in buf.iter_mut().zip(data[start..start + dim].iter()) {
                    *slot = m + b as f32 * s;
                }
            }
            VectorArena::Int16 { data, min, scale } => {
                let (m, s) = (min[id], scale[id]);
                for (slot, &b) in buf.iter_mut().zip(data[start..start + dim].iter()) {
                    *slot = m + (b as f32 + 32768.0) * s;
                }
            }
        }
    }
}

/// A candidate during search: (negative distance, internal id).
/// BinaryHeap is a max-heap; negative distance gives min-heap behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    neg_distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.neg_distance.cmp(&other.neg_distance)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A result entry: (distance, internal id). Max-heap by distance so the
/// worst result is cheap to evict.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResultEntry {
    distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for ResultEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance.cmp(&other.distance)
    }
}

impl PartialOrd for ResultEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Incremental HNSW index.
#[derive(Debug)]
pub struct HnswGraph {
    config: IndexConfig,
    dimension: usize,
    arena: VectorArena,
    /// [node][layer] -> neighbor ids
    neighbors: Vec<Vec<Vec<u32>>>,
    layers: Vec<u8>,
    entry_point: Option<u32>,
    max_layer: usize,
    node_count: u32,
}

impl HnswGraph {
    /// Create an empty graph. Fails fast on an invalid configuration.
    pub fn new(config: IndexConfig) -> Result<Self, IndexError> {
        config.validate()?;
        let dimension = config.dimensions();
        let arena = VectorArena::new(config.quantization);
        Ok(Self {
            config,
            dimension,
            arena,
            neighbors: Vec::new(),
            layers: Vec::new(),
            entry_point: None,
            max_layer: 0,
            node_count: 0,
        })
    }

    /// Number of vectors in the graph (including tombstoned slots, which
    /// the graph cannot distinguish).
    pub fn len(&self) -> usize {
        self.node_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.node_count == 0
    }

    /// The configured embedding dimension.
    pub fn dimensions(&self) -> usize {
        self.dimension
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Reconstruct the stored vector for `id` (lossy under quantization).
    /// Used when rebuilding the graph from live vectors.
    pub fn vector(&self, id: u32) -> Vec<f32> {
        let mut buf = vec![0.0f32; self.dimension];
        self.arena.write_into(id as usize, self.dimension, &mut buf);
        buf
    }

    /// Insert a vector, returning its internal index.
    ///
    /// Indices are assigned sequentially and never reused.
    pub fn insert(&mut self, vector: &[f32]) -> Result<u32, IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let internal_id = self.node_count;
        let level = self.random_level();

        // First node: push and become the entry point
        if self.entry_point.is_none() {
            self.arena.push(vector);
            self.neighbors.push(vec![Vec::new(); level + 1]);
            self.layers.push(level as u8);
            self.node_count += 1;
            self.entry_point = Some(internal_id);
            self.max_layer = level;
            return Ok(internal_id);
        }

        let entry_point = self.entry_point.expect("entry point set above");
        let mut visited = VisitedSet::new(self.node_count as usize);
        let mut buf = vec![0.0f32; self.dimension];
        let mut current_ep = entry_point;

        // Phase 1: greedy descent from the top layer to level + 1
        for layer in (level + 1..=self.max_layer).rev() {
            let nearest = self.search_layer(
                vector,
                std::slice::from_ref(&current_ep),
                1,
                layer,
                &mut visited,
                &mut buf,
            );
            if let Some(&(_, id)) = nearest.first() {
                current_ep = id;
            }
        }

        // Phase 2: collect neighbors per layer from level (capped) down to 0
        let top = level.min(self.max_layer);
        let mut node_neighbors: Vec<Vec<u32>> = vec![Vec::new(); level + 1];
        let mut layer_eps: Vec<u32> = vec![current_ep];

        for layer in (0..=top).rev() {
            let candidates = self.search_layer(
                vector,
                &layer_eps,
                self.config.ef_construction,
                layer,
                &mut visited,
                &mut buf,
            );

            let selected = self.select_neighbors(&candidates, self.max_links(layer));
            node_neighbors[layer] = selected.iter().map(|&(_, id)| id).collect();

            layer_eps.clear();
            layer_eps.extend(candidates.iter().map(|&(_, id)| id));
            if layer_eps.is_empty() {
                layer_eps.push(entry_point);
            }
        }

        // Push the new node
        self.arena.push(vector);
        self.neighbors.push(node_neighbors);
        self.layers.push(level as u8);
        self.node_count += 1;

        // Phase 3: backlinks, pruning neighbors that exceed capacity
        let mut base_buf = vec![0.0f32; self.dimension];
        for layer in 0..=top {
            let m_max = self.max_links(layer);
            let linked: Vec<u32> = self.neighbors[internal_id as usize][layer].clone();

            for &neighbor_id in &linked {
                let n = neighbor_id as usize;
                while self.neighbors[n].len() <= layer {
                    self.neighbors[n].push(Vec::new());
                }
                self.neighbors[n][layer].push(internal_id);

                if self.neighbors[n][layer].len() > m_max {
                    self.arena.write_into(n, self.dimension, &mut base_buf);
                    let ids: Vec<u32> = self.neighbors[n][layer].clone();
                    let candidates: Vec<(f32, u32)> = ids
                        .iter()
                        .map(|&cid| (self.distance_to(&base_buf, cid, &mut buf), cid))
                        .collect();
                    let pruned = self.select_neighbors(&candidates, m_max);
                    self.neighbors[n][layer] = pruned.iter().map(|&(_, id)| id).collect();
                }
            }
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(internal_id);
        }

        debug!(
            internal_id = internal_id,
            level = level,
            nodes = self.node_count,
            "inserted vector"
        );
        Ok(internal_id)
    }

    /// Search for the `k` nearest neighbors of `query`.
    ///
    /// Returns `(internal_id, distance)` pairs ordered by ascending
    /// distance (closest first).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let entry_point = match self.entry_point {
            Some(ep) => ep,
            None => return Ok(Vec::new()),
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut visited = VisitedSet::new(self.node_count as usize);
        let mut buf = vec![0.0f32; self.dimension];
        let mut current_ep = entry_point;

        // Greedy descent to layer 1
        for layer in (1..=self.max_layer).rev() {
            let nearest = self.search_layer(
                query,
                std::slice::from_ref(&current_ep),
                1,
                layer,
                &mut visited,
                &mut buf,
            );
            if let Some(&(_, id)) = nearest.first() {
                current_ep = id;
            }
        }

        // Base layer with the full candidate width
        let ef = self.config.ef_search.max(k);
        let mut results = self.search_layer(
            query,
            std::slice::from_ref(&current_ep),
            ef,
            0,
            &mut visited,
            &mut buf,
        );
        results.truncate(k);

        Ok(results.into_iter().map(|(dist, id)| (id, dist)).collect())
    }

    /// Bounded best-first search over one layer. Returns up to `ef` nodes
    /// as `(distance, id)` sorted ascending.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[u32],
        ef: usize,
        layer: usize,
        visited: &mut VisitedSet,
        buf: &mut [f32],
    ) -> Vec<(f32, u32)> {
        visited.reset();
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
        let mut results: BinaryHeap<ResultEntry> = BinaryHeap::with_capacity(ef + 1);
        // Cached worst distance avoids repeated heap peeks in the hot loop
        let mut worst_dist = f32::MAX;

        for &ep in entry_points {
            if visited.insert(ep) {
                let dist = self.distance_to(query, ep, buf);
                candidates.push(Candidate {
                    neg_distance: OrderedFloat(-dist),
                    id: ep,
                });
                results.push(ResultEntry {
                    distance: OrderedFloat(dist),
                    id: ep,
                });
                if results.len() >= ef {
                    worst_dist = results.peek().map_or(f32::MAX, |r| r.distance.0);
                }
            }
        }

        while let Some(candidate) = candidates.pop() {
            let c_dist = -candidate.neg_distance.0;
            if results.len() >= ef && c_dist > worst_dist {
                break;
            }

            let node = candidate.id as usize;
            if layer >= self.neighbors[node].len() {
                continue;
            }

            for &neighbor_id in &self.neighbors[node][layer] {
                if !visited.insert(neighbor_id) {
                    continue;
                }

                let dist = self.distance_to(query, neighbor_id, buf);
                if results.len() < ef || dist < worst_dist {
                    candidates.push(Candidate {
                        neg_distance: OrderedFloat(-dist),
                        id: neighbor_id,
                    });
                    results.push(ResultEntry {
                        distance: OrderedFloat(dist),
                        id: neighbor_id,
                    });
                    if results.len() > ef {
                        results.pop();
                    }
                    worst_dist = results.peek().map_or(f32::MAX, |r| r.distance.0);
                }
            }
        }

        results
            .into_sorted_vec()
            .into_iter()
            .map(|r| (r.distance.0, r.id))
            .collect()
    }

    /// Heuristic neighbor selection (Algorithm 4 from the HNSW paper).
    ///
    /// A candidate is kept only if it is closer to the base than to any
    /// already-selected neighbor, which favors diverse links over clusters
    /// of near-identical ones. Unused slots are filled with the closest
    /// remaining candidates.
    fn select_neighbors(&self, candidates: &[(f32, u32)], m: usize) -> Vec<(f32, u32)> {
        let mut sorted = candidates.to_vec();
        sorted.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let metric = self.config.metric;
        let mut selected: Vec<(f32, u32)> = Vec::with_capacity(m);
        let mut cand_buf = vec![0.0f32; self.dimension];
        let mut sel_buf = vec![0.0f32; self.dimension];

        for &(dist_to_base, cid) in &sorted {
            if selected.len() >= m {
                break;
            }

            self.arena.write_into(cid as usize, self.dimension, &mut cand_buf);
            let mut is_diverse = true;
            for &(_, sid) in &selected {
                self.arena.write_into(sid as usize, self.dimension, &mut sel_buf);
                let dist_to_selected = kernel::distance_unchecked(metric, &cand_buf, &sel_buf);
                if dist_to_selected < dist_to_base {
                    is_diverse = false;
                    break;
                }
            }

            if is_diverse {
                selected.push((dist_to_base, cid));
            }
        }

        if selected.len() < m {
            for &(dist, cid) in &sorted {
                if selected.len() >= m {
                    break;
                }
                if !selected.iter().any(|&(_, sid)| sid == cid) {
                    selected.push((dist, cid));
                }
            }
        }

        selected
    }

    /// Distance from an f32 query to a stored node.
    #[inline]
    fn distance_to(&self, query: &[f32], id: u32, buf: &mut [f32]) -> f32 {
        match &self.arena {
            VectorArena::Float { data } => {
                let start = id as usize * self.dimension;
                kernel::distance_unchecked(
                    self.config.metric,
                    query,
                    &data[start..start + self.dimension],
                )
            }
            _ => {
                self.arena.write_into(id as usize, self.dimension, buf);
                kernel::distance_unchecked(self.config.metric, query, buf)
            }
        }
    }

    /// Neighbor capacity for a layer: `2 * m` at the base, `m` above.
    #[inline]
    fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m * 2
        } else {
            self.config.m
        }
    }

    /// Draw a layer for a new node from the exponential distribution
    /// `floor(-ln(u) / ln(m))`, capped at `max_layers - 1`.
    fn random_level(&self) -> usize {
        let m = self.config.m;
        let ml = if m > 1 { 1.0 / (m as f64).ln() } else { 1.0 };
        let r: f64 = rand::random();
        let level = (-r.ln() * ml).floor() as usize;
        level.min(self.config.max_layers - 1)
    }

    /// The distance metric this graph was built with.
    pub fn metric(&self) -> Metric {
        self.config.metric
    }
}
