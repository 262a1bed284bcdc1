//! Dimensionality reduction for source embeddings.
//!
//! Maps a source embedding onto a smaller target dimension. Three methods
//! with increasing fidelity cost:
//! - [`ReductionMethod::Truncate`]: keep the first components. O(target),
//!   deterministic, lowest semantic fidelity.
//! - [`ReductionMethod::MagnitudeSelect`]: keep the components with the
//!   largest absolute value, in their original order, renormalized. This is
//!   a magnitude heuristic, not statistical PCA.
//! - [`ReductionMethod::RandomProjection`]: multiply by a cached Gaussian
//!   matrix (Johnson-Lindenstrauss style), renormalized.
//!
//! Projection matrices are generated once per `(source, target)` shape from
//! a fixed seed: every caller using the same shape gets the same projection,
//! which is a reproducibility requirement. First use is safe under
//! concurrency; the matrix is built exactly once per shape.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, IndexError};

/// How to map a source embedding onto the target dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionMethod {
    /// Keep the first `target_dim` components
    Truncate,
    /// Keep the `target_dim` largest-magnitude components, original order
    MagnitudeSelect,
    /// Project through a cached fixed-seed Gaussian matrix
    RandomProjection,
}

impl Default for ReductionMethod {
    fn default() -> Self {
        ReductionMethod::Truncate
    }
}

/// Base seed for projection matrices. Shape-derived seeds fan out from
/// this value; changing it invalidates every cached projection.
const PROJECTION_SEED: u64 = 0x5EED_CA11_AB1E;

type ShapeKey = (usize, usize);

static PROJECTIONS: OnceLock<RwLock<HashMap<ShapeKey, Arc<Vec<f32>>>>> = OnceLock::new();

/// Reduce `vector` to at most `target_dim` components.
///
/// Output length is `min(vector.len(), target_dim)`; when the vector
/// already fits, it is returned unchanged.
pub fn reduce(
    vector: &[f32],
    target_dim: usize,
    method: ReductionMethod,
) -> Result<Vec<f32>, IndexError> {
    if target_dim == 0 {
        return Err(ConfigError::new("target_dim", target_dim, "must be >= 1").into());
    }

    if vector.len() <= target_dim {
        return Ok(vector.to_vec());
    }

    let reduced = match method {
        ReductionMethod::Truncate => vector[..target_dim].to_vec(),
        ReductionMethod::MagnitudeSelect => magnitude_select(vector, target_dim),
        ReductionMethod::RandomProjection => project(vector, target_dim),
    };

    Ok(reduced)
}

/// Keep the `target_dim` components with largest |value|, restore their
/// original order, and renormalize to unit length.
fn magnitude_select(vector: &[f32], target_dim: usize) -> Vec<f32> {
    let mut indices: Vec<usize> = (0..vector.len()).collect();
    indices.sort_by(|&a, &b| {
        vector[b]
            .abs()
            .partial_cmp(&vector[a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    indices.truncate(target_dim);
    indices.sort_unstable();

    let mut out: Vec<f32> = indices.iter().map(|&i| vector[i]).collect();
    renormalize(&mut out);
    out
}

/// Multiply by the cached Gaussian matrix for this shape and renormalize.
fn project(vector: &[f32], target_dim: usize) -> Vec<f32> {
    let matrix = projection_matrix(vector.len(), target_dim);

    let mut out = vec![0.0f32; target_dim];
    for (i, &v) in vector.iter().enumerate() {
        if v == 0.0 {
            continue;
        }
        let row = &matrix[i * target_dim..(i + 1) * target_dim];
        for (o, &m) in out.iter_mut().zip(row.iter()) {
            *o += v * m;
        }
    }

    renormalize(&mut out);
    out
}

/// Fetch or build the projection matrix for a `(source, target)` shape.
///
/// Built exactly once per shape under the cache's write lock; later callers
/// share the same `Arc`.
fn projection_matrix(source_dim: usize, target_dim: usize) -> Arc<Vec<f32>> {
    let cache = PROJECTIONS.get_or_init(|| RwLock::new(HashMap::new()));

    if let Some(matrix) = cache.read().get(&(source_dim, target_dim)) {
        return matrix.clone();
    }

    let mut cache = cache.write();
    cache
        .entry((source_dim, target_dim))
        .or_insert_with(|| Arc::new(generate_matrix(source_dim, target_dim)))
        .clone()
}

/// Row-major `(source, target)` Gaussian matrix, N(0, 1/target) entries.
fn generate_matrix(source_dim: usize, target_dim: usize) -> Vec<f32> {
    let seed = PROJECTION_SEED ^ ((source_dim as u64) << 32) ^ target_dim as u64;
    let mut rng = StdRng::seed_from_u64(seed);
    let norm = 1.0 / (target_dim as f32).sqrt();

    (0..source_dim * target_dim)
        .map(|_| {
            let sample: f32 = rng.sample(StandardNormal);
            sample * norm
        })
        .collect()
}

fn renormalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METHODS: [ReductionMethod; 3] = [
        ReductionMethod::Truncate,
        ReductionMethod::MagnitudeSelect,
        ReductionMethod::RandomProjection,
    ];

    #[test]
    fn test_output_length_contract() {
        let v: Vec<f32> = (0..32).map(|i| i as f32 * 0.1).collect();
        for method in METHODS {
            assert_eq!(reduce(&v, 8, method).unwrap().len(), 8);
            assert_eq!(reduce(&v, 32, method).unwrap().len(), 32);
            assert_eq!(reduce(&v, 100, method).unwrap().len(), 32);
        }
    }

    #[test]
    fn test_identity_when_already_small() {
        let v = vec![0.5, -0.5, 0.25];
        for method in METHODS {
            assert_eq!(reduce(&v, 3, method).unwrap(), v);
            assert_eq!(reduce(&v, 10, method).unwrap(), v);
        }
    }

    #[test]
    fn test_zero_target_rejected() {
        let v = vec![1.0, 2.0];
        let result = reduce(&v, 0, ReductionMethod::Truncate);
        match result {
            Err(IndexError::Config(e)) => assert_eq!(e.field, "target_dim"),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_truncate_keeps_prefix() {
        let v = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(
            reduce(&v, 2, ReductionMethod::Truncate).unwrap(),
            vec![1.0, 2.0]
        );
    }

    #[test]
    fn test_magnitude_select_order_and_norm() {
        let v = vec![0.1, -5.0, 0.2, 3.0, 0.05];
        let out = reduce(&v, 2, ReductionMethod::MagnitudeSelect).unwrap();
        // -5.0 (index 1) and 3.0 (index 3) survive, in original order
        assert!(out[0] < 0.0 && out[1] > 0.0);
        let norm: f32 = out.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "expected unit norm, got {norm}");
    }

    #[test]
    fn test_projection_deterministic() {
        let v: Vec<f32> = (0..64).map(|i| (i as f32).sin()).collect();
        let a = reduce(&v, 16, ReductionMethod::RandomProjection).unwrap();
        let b = reduce(&v, 16, ReductionMethod::RandomProjection).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_projection_cache_shared_per_shape() {
        let a = projection_matrix(48, 12);
        let b = projection_matrix(48, 12);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_projection_shapes_independent() {
        let a = projection_matrix(40, 10);
        let b = projection_matrix(41, 10);
        assert_eq!(a.len(), 400);
        assert_eq!(b.len(), 410);
        // Different seeds: the shared prefix should not coincide
        assert_ne!(&a[..10], &b[..10]);
    }

    #[test]
    fn test_projection_unit_norm() {
        let v: Vec<f32> = (0..100).map(|i| (i % 7) as f32 - 3.0).collect();
        let out = reduce(&v, 25, ReductionMethod::RandomProjection).unwrap();
        let norm: f32 = out.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_projection_concurrent_first_use() {
        // All threads racing the same fresh shape must agree on the result
        let v: Vec<f32> = (0..72).map(|i| (i as f32 * 0.37).cos()).collect();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let v = v.clone();
                std::thread::spawn(move || {
                    reduce(&v, 18, ReductionMethod::RandomProjection).unwrap()
                })
            })
            .collect();

        let results: Vec<Vec<f32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
    }
}
