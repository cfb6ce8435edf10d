//! Embedding service trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that embedding backends implement, plus
//! pure helpers for vector serialization and similarity computation.
//!
//! Concrete services (Ollama, LM Studio) live in the `slab-search` app
//! crate.

use anyhow::Result;
use async_trait::async_trait;

/// Trait for embedding services.
///
/// Implementations are expected to carry their own (generous) request
/// timeout; the engines never impose one.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Embed a single text into a fixed-length vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Verify that the service is reachable and the model is loaded.
    async fn health_check(&self) -> Result<()>;
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes. Empty input yields an empty BLOB.
///
/// # Example
///
/// ```rust
/// use slab_search_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), Some(v));
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Returns `None` when the BLOB is empty or its length is not a multiple
/// of 4, so a corrupt or missing embedding is skipped rather than failing
/// a whole ranking pass.
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.is_empty() || blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns exactly `0.0` when the lengths differ, either vector has zero
/// magnitude, or a non-finite component makes the result undefined.
/// Vectors from two different models therefore drop out of a ranking
/// instead of aborting it.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let cos = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !cos.is_finite() {
        return 0.0;
    }
    cos.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        for vec in [
            vec![],
            vec![42.5f32],
            vec![1.0f32, -2.5, 3.125, 0.0, -0.001, f32::MAX, f32::MIN_POSITIVE],
        ] {
            let blob = vec_to_blob(&vec);
            assert_eq!(blob.len(), vec.len() * 4);
            if vec.is_empty() {
                // An empty BLOB decodes as absent, not as an empty vector.
                assert_eq!(blob_to_vec(&blob), None);
            } else {
                assert_eq!(blob_to_vec(&blob), Some(vec));
            }
        }
    }

    #[test]
    fn test_blob_little_endian_layout() {
        let blob = vec_to_blob(&[1.0]);
        assert_eq!(blob, vec![0x00, 0x00, 0x80, 0x3f]);
    }

    #[test]
    fn test_blob_bad_length() {
        assert_eq!(blob_to_vec(&[0, 0, 128]), None);
        assert_eq!(blob_to_vec(&[0, 0, 128, 63, 1]), None);
        assert_eq!(blob_to_vec(&[]), None);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_cosine_zero_magnitude() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_non_finite() {
        assert_eq!(cosine_similarity(&[f32::INFINITY, 1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]), 0.0);
        // Squares overflow to infinity.
        assert_eq!(cosine_similarity(&[3e30, 3e30], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_different_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_bounds() {
        let samples: [[f32; 3]; 5] = [
            [0.3, -1.7, 9.2],
            [-4.0, 0.01, 2.5],
            [1e-3, 1e-3, 1e-3],
            [1e6, -1e6, 3.0],
            [-0.5, -0.5, -0.5],
        ];
        for a in &samples {
            for b in &samples {
                let sim = cosine_similarity(a, b);
                assert!((-1.0..=1.0).contains(&sim), "out of range: {}", sim);
            }
            assert!((cosine_similarity(a, a) - 1.0).abs() < 1e-5);
        }
    }
}
