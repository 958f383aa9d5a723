//! Text embedding seam for the activity index.
//!
//! The production sentence-embedding model is an external collaborator; the
//! index only depends on the [`TextEmbedder`] trait. [`HashingEmbedder`] is
//! the in-process fallback: deterministic bag-of-words feature hashing into a
//! fixed-dimension vector. It is not a semantic model, but it preserves the
//! properties the pipeline relies on (identical text → identical vector,
//! shared tokens → higher cosine similarity) and keeps the crate fully
//! testable offline.

use once_cell::sync::Lazy;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// Filler words that carry no signal in activity text or search queries.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["a", "an", "and", "as", "at", "for", "in", "of", "on", "or", "the", "to", "with"]
        .into_iter()
        .collect()
});

/// Maps text to a fixed-dimension vector. Implementations must be
/// deterministic: the same input always yields the same output.
pub trait TextEmbedder: Send + Sync {
    fn dimension(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Default embedding width, matching the external MiniLM-class model the
/// index files are normally built with.
pub const DEFAULT_DIMENSION: usize = 384;

/// Deterministic feature-hashing embedder (local fallback).
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl TextEmbedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let slot = (h % self.dimension as u64) as usize;
            // Sign bit from a higher hash bit spreads collisions across
            // positive and negative contributions.
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(t.as_str()))
}

/// In-place L2 normalization. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Inner product of two equal-length vectors; cosine similarity when both
/// sides are L2-normalized.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
