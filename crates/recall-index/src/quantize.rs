//! Scalar quantization: lossy compression of f32 vectors to u8 or i16.
//!
//! Each vector is compressed by finding its min and max, then linearly
//! mapping components onto the integer range. `min` and the precomputed
//! `scale` (range / levels) are stored per vector for dequantization.
//! Round-trip error is bounded by one quantization step.

use serde::{Deserialize, Serialize};

/// Number of representable u8 levels minus one.
const U8_LEVELS: f32 = 255.0;
/// Number of representable i16 levels minus one.
const I16_LEVELS: f32 = 65535.0;

/// Scalar-quantized vector: f32 -> u8 with min/max for reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizedVector {
    pub data: Vec<u8>,
    pub min: f32,
    pub max: f32,
    pub scale: f32,
}

impl QuantizedVector {
    /// Quantize an f32 vector to u8 using min-max scaling.
    ///
    /// A degenerate range (all components equal within epsilon) maps every
    /// component to the midpoint 127 with zero scale instead of dividing by
    /// zero; dequantization then reproduces the constant `min`.
    pub fn quantize(vector: &[f32]) -> Self {
        if vector.is_empty() {
            return Self {
                data: Vec::new(),
                min: 0.0,
                max: 0.0,
                scale: 0.0,
            };
        }

        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for &v in vector {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }

        let range = max - min;
        let (data, scale) = if range < f32::EPSILON {
            (vec![127u8; vector.len()], 0.0)
        } else {
            let inv_scale = U8_LEVELS / range;
            let data = vector
                .iter()
                .map(|&v| ((v - min) * inv_scale).round().clamp(0.0, U8_LEVELS) as u8)
                .collect();
            (data, range / U8_LEVELS)
        };

        Self {
            data,
            min,
            max,
            scale,
        }
    }

    /// Dequantize back to f32. Lossy within one step.
    pub fn dequantize(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.data.len()];
        self.dequantize_into(&mut out);
        out
    }

    /// Dequantize into the provided buffer (no allocation).
    pub fn dequantize_into(&self, buf: &mut [f32]) {
        debug_assert_eq!(buf.len(), self.data.len());
        if self.scale == 0.0 {
            buf.fill(self.min);
            return;
        }
        for (slot, &b) in buf.iter_mut().zip(self.data.iter()) {
            *slot = self.min + b as f32 * self.scale;
        }
    }

    /// Returns the dimensionality of the quantized vector.
    pub fn dim(&self) -> usize {
        self.data.len()
    }
}

/// Scalar-quantized vector: f32 -> i16 over the full [-32768, 32767] range.
///
/// Same contract as [`QuantizedVector`] with a step of `range / 65535`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizedVectorI16 {
    pub data: Vec<i16>,
    pub min: f32,
    pub max: f32,
    pub scale: f32,
}

impl QuantizedVectorI16 {
    /// Quantize an f32 vector to i16 using min-max scaling.
    pub fn quantize(vector: &[f32]) -> Self {
        if vector.is_empty() {
            return Self {
                data: Vec::new(),
                min: 0.0,
                max: 0.0,
                scale: 0.0,
            };
        }

        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for &v in vector {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }

        let range = max - min;
        let (data, scale) = if range < f32::EPSILON {
            (vec![0i16; vector.len()], 0.0)
        } else {
            let inv_scale = I16_LEVELS / range;
            let data = vector
                .iter()
                .map(|&v| {
                    let level = ((v - min) * inv_scale).round().clamp(0.0, I16_LEVELS);
                    (level - 32768.0) as i16
                })
                .collect();
            (data, range / I16_LEVELS)
        };

        Self {
            data,
            min,
            max,
            scale,
        }
    }

    /// Dequantize back to f32. Lossy within one step.
    pub fn dequantize(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.data.len()];
        self.dequantize_into(&mut out);
        out
    }

    /// Dequantize into the provided buffer (no allocation).
    pub fn dequantize_into(&self, buf: &mut [f32]) {
        debug_assert_eq!(buf.len(), self.data.len());
        if self.scale == 0.0 {
            buf.fill(self.min);
            return;
        }
        for (slot, &b) in buf.iter_mut().zip(self.data.iter()) {
            *slot = self.min + (b as f32 + 32768.0) * self.scale;
        }
    }

    /// Returns the dimensionality of the quantized vector.
    pub fn dim(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_vector(dim: usize) -> Vec<f32> {
        let mut rng = rand::rng();
        (0..dim).map(|_| rng.random_range(-2.0..2.0)).collect()
    }

    #[test]
    fn test_u8_round_trip_within_one_step() {
        let v = random_vector(128);
        let q = QuantizedVector::quantize(&v);
        let step = (q.max - q.min) / 255.0;
        for (orig, deq) in v.iter().zip(q.dequantize().iter()) {
            assert!(
                (orig - deq).abs() <= step + f32::EPSILON,
                "orig={orig} deq={deq} step={step}"
            );
        }
    }

    #[test]
    fn test_i16_round_trip_within_one_step() {
        let v = random_vector(128);
        let q = QuantizedVectorI16::quantize(&v);
        let step = (q.max - q.min) / 65535.0;
        for (orig, deq) in v.iter().zip(q.dequantize().iter()) {
            assert!(
                (orig - deq).abs() <= step + f32::EPSILON,
                "orig={orig} deq={deq} step={step}"
            );
        }
    }

    #[test]
    fn test_i16_tighter_than_u8() {
        let v = random_vector(256);
        let q8 = QuantizedVector::quantize(&v);
        let q16 = QuantizedVectorI16::quantize(&v);
        let err8: f32 = v
            .iter()
            .zip(q8.dequantize().iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        let err16: f32 = v
            .iter()
            .zip(q16.dequantize().iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(err16 <= err8, "i16 error {err16} should not exceed u8 {err8}");
    }

    #[test]
    fn test_degenerate_range_maps_to_midpoint() {
        let v = vec![0.75; 32];
        let q = QuantizedVector::quantize(&v);
        assert!(q.data.iter().all(|&b| b == 127));
        assert_eq!(q.scale, 0.0);
        for deq in q.dequantize() {
            assert!((deq - 0.75).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_degenerate_range_i16() {
        let v = vec![-1.5; 8];
        let q = QuantizedVectorI16::quantize(&v);
        assert_eq!(q.scale, 0.0);
        for deq in q.dequantize() {
            assert!((deq - (-1.5)).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_empty_vector() {
        let q = QuantizedVector::quantize(&[]);
        assert_eq!(q.dim(), 0);
        assert!(q.dequantize().is_empty());
    }

    #[test]
    fn test_extremes_hit_range_ends() {
        let v = vec![-1.0, 0.0, 1.0];
        let q = QuantizedVector::quantize(&v);
        assert_eq!(q.data[0], 0);
        assert_eq!(q.data[2], 255);

        let q16 = QuantizedVectorI16::quantize(&v);
        assert_eq!(q16.data[0], i16::MIN);
        assert_eq!(q16.data[2], i16::MAX);
    }

    #[test]
    fn test_dequantize_into_matches_dequantize() {
        let v = random_vector(64);
        let q = QuantizedVector::quantize(&v);
        let mut buf = vec![0.0; 64];
        q.dequantize_into(&mut buf);
        assert_eq!(buf, q.dequantize());
    }
}
