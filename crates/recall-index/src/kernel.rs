//! Distance kernels for vector similarity.
//!
//! Three metrics, each with a SIMD fast path (8-wide f32 lanes) over full
//! chunks and a scalar remainder loop. A pure-scalar twin of every kernel
//! exists for verification; both paths compute the same result up to
//! floating-point rounding.
//!
//! All metrics return a distance where **lower is better**:
//! - Cosine: `1 - cosine_similarity`, range [0, 2]
//! - Euclidean: `sqrt(sum((a - b)^2))`, range [0, inf)
//! - Dot product: `-dot(a, b)`, negated so smaller = more similar

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Distance metric used for vector similarity computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Cosine distance: `1 - cosine_similarity`
    Cosine,
    /// Euclidean (L2) distance
    Euclidean,
    /// Negative dot product
    DotProduct,
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Cosine
    }
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::DotProduct => "dot_product",
        }
    }
}

/// Compute the distance between two equal-length vectors.
///
/// Fails with `DimensionMismatch` if the lengths differ.
pub fn distance(metric: Metric, x: &[f32], y: &[f32]) -> Result<f32, IndexError> {
    if x.len() != y.len() {
        return Err(IndexError::DimensionMismatch {
            expected: x.len(),
            actual: y.len(),
        });
    }
    Ok(distance_unchecked(metric, x, y))
}

/// Distance without the length check. Lengths must already be equal.
#[inline]
pub fn distance_unchecked(metric: Metric, x: &[f32], y: &[f32]) -> f32 {
    debug_assert_eq!(x.len(), y.len());
    match metric {
        Metric::Cosine => cosine_distance(x, y),
        Metric::Euclidean => simd::squared_l2(x, y).sqrt(),
        Metric::DotProduct => -simd::dot_product(x, y),
    }
}

/// Scalar-only twin of [`distance`]. Used to verify the SIMD path.
pub fn distance_scalar(metric: Metric, x: &[f32], y: &[f32]) -> Result<f32, IndexError> {
    if x.len() != y.len() {
        return Err(IndexError::DimensionMismatch {
            expected: x.len(),
            actual: y.len(),
        });
    }
    Ok(match metric {
        Metric::Cosine => {
            let dot = scalar::dot_product(x, y);
            let norm = (scalar::sum_of_squares(x) * scalar::sum_of_squares(y)).sqrt();
            if norm < f32::EPSILON {
                1.0
            } else {
                1.0 - dot / norm
            }
        }
        Metric::Euclidean => scalar::squared_l2(x, y).sqrt(),
        Metric::DotProduct => -scalar::dot_product(x, y),
    })
}

/// Convert a distance back to the similarity scale callers rank by.
///
/// - Cosine: `1 - distance`
/// - Euclidean: `1 / (1 + distance)`
/// - Dot product: `-distance`
#[inline]
pub fn similarity_from(metric: Metric, distance: f32) -> f32 {
    match metric {
        Metric::Cosine => 1.0 - distance,
        Metric::Euclidean => 1.0 / (1.0 + distance),
        Metric::DotProduct => -distance,
    }
}

#[inline]
fn cosine_distance(x: &[f32], y: &[f32]) -> f32 {
    let dot = simd::dot_product(x, y);
    let norm = (simd::sum_of_squares(x) * simd::sum_of_squares(y)).sqrt();
    if norm < f32::EPSILON {
        // Zero-length input on either side carries no direction
        return 1.0;
    }
    1.0 - dot / norm
}

/// SIMD-accelerated inner loops (8-wide f32 lanes, scalar remainder).
pub mod simd {
    use wide::f32x8;

    /// Compute dot product using SIMD (8-wide f32 lanes).
    #[inline]
    pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
        let chunks = a.len() / 8;
        let remainder = a.len() % 8;

        let mut sum = f32x8::ZERO;

        // Process 8 elements at a time
        for i in 0..chunks {
            let offset = i * 8;
            let va = f32x8::from(&a[offset..offset + 8]);
            let vb = f32x8::from(&b[offset..offset + 8]);
            sum += va * vb;
        }

        // Sum the SIMD lanes
        let arr: [f32; 8] = sum.into();
        let mut result: f32 = arr.iter().sum();

        // Handle remainder with scalar operations
        let start = chunks * 8;
        for i in 0..remainder {
            result += a[start + i] * b[start + i];
        }

        result
    }

    /// Compute sum of squares using SIMD (for magnitude calculation).
    #[inline]
    pub fn sum_of_squares(v: &[f32]) -> f32 {
        let chunks = v.len() / 8;
        let remainder = v.len() % 8;

        let mut sum = f32x8::ZERO;

        for i in 0..chunks {
            let offset = i * 8;
            let vec = f32x8::from(&v[offset..offset + 8]);
            sum += vec * vec;
        }

        let arr: [f32; 8] = sum.into();
        let mut result: f32 = arr.iter().sum();

        let start = chunks * 8;
        for i in 0..remainder {
            result += v[start + i] * v[start + i];
        }

        result
    }

    /// Compute squared L2 distance using SIMD.
    #[inline]
    pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
        let chunks = a.len() / 8;
        let remainder = a.len() % 8;

        let mut sum = f32x8::ZERO;

        for i in 0..chunks {
            let offset = i * 8;
            let va = f32x8::from(&a[offset..offset + 8]);
            let vb = f32x8::from(&b[offset..offset + 8]);
            let diff = va - vb;
            sum += diff * diff;
        }

        let arr: [f32; 8] = sum.into();
        let mut result: f32 = arr.iter().sum();

        let start = chunks * 8;
        for i in 0..remainder {
            let diff = a[start + i] - b[start + i];
            result += diff * diff;
        }

        result
    }
}

/// Scalar reference implementations of the kernel inner loops.
pub mod scalar {
    #[inline]
    pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    #[inline]
    pub fn sum_of_squares(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum()
    }

    #[inline]
    pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let d = x - y;
                d * d
            })
            .sum()
    }
}
