//! Text embedding seam and the built-in feature-hashing embedder.
//!
//! Real semantic embedding backends plug in through [`Embedder`]; the default
//! [`HashEmbedder`] keeps the pipeline self-contained and deterministic by
//! hashing tokens into a fixed-width bag-of-words vector. It captures lexical
//! overlap, which is enough to separate genuinely different responses.

use std::collections::HashMap;

use nalgebra::DVector;

/// Cache keys hash only a prefix of the text. Responses identical in their
/// first 500 bytes share an embedding.
const CACHE_KEY_PREFIX_BYTES: usize = 500;

/// Maps response text to a fixed-dimension vector.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    fn embed(&self, text: &str) -> DVector<f64>;
}

/// Deterministic token-hash embedder.
///
/// Lowercased alphanumeric tokens are hashed into `dimension` buckets and
/// counted; the count vector is L2-normalised. No model downloads, no
/// network, identical output across runs.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> DVector<f64> {
        let mut counts = DVector::zeros(self.dimension);
        for token in tokenize(text) {
            let hash = blake3::hash(token.as_bytes());
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&hash.as_bytes()[..8]);
            let bucket = (u64::from_le_bytes(raw) % self.dimension as u64) as usize;
            counts[bucket] += 1.0;
        }
        let norm = counts.norm();
        if norm > 0.0 {
            counts / norm
        } else {
            counts
        }
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Embedding cache keyed by a blake3 hash of the text's leading bytes.
///
/// Grows without bound for the life of the clusterer; clusterers are built
/// per run, so the bound is the run's sample count.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: HashMap<blake3::Hash, DVector<f64>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(text: &str) -> blake3::Hash {
        let bytes = text.as_bytes();
        let prefix = &bytes[..bytes.len().min(CACHE_KEY_PREFIX_BYTES)];
        blake3::hash(prefix)
    }

    pub fn get_or_insert_with(
        &mut self,
        text: &str,
        compute: impl FnOnce() -> DVector<f64>,
    ) -> DVector<f64> {
        self.entries
            .entry(Self::key(text))
            .or_insert_with(compute)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("the migration carries data quality risk");
        let b = embedder.embed("the migration carries data quality risk");
        assert_eq!(a, b);
    }

    #[test]
    fn embedding_is_unit_length() {
        let embedder = HashEmbedder::default();
        let v = embedder.embed("some nonempty response text");
        assert!((v.norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embedder = HashEmbedder::default();
        let v = embedder.embed("   ");
        assert_eq!(v.norm(), 0.0);
    }

    #[test]
    fn similar_texts_are_closer_than_dissimilar() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("data quality risk in the migration project");
        let b = embedder.embed("migration project has a data quality risk");
        let c = embedder.embed("quarterly marketing budget review meeting");
        assert!(a.dot(&b) > a.dot(&c));
    }

    #[test]
    fn cache_hits_on_identical_prefix() {
        let embedder = HashEmbedder::default();
        let mut cache = EmbeddingCache::new();
        let text = "response body";
        let first = cache.get_or_insert_with(text, || embedder.embed(text));
        let mut computed_again = false;
        let second = cache.get_or_insert_with(text, || {
            computed_again = true;
            embedder.embed(text)
        });
        assert!(!computed_again);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_key_ignores_text_past_the_prefix() {
        let mut cache = EmbeddingCache::new();
        let base = "x".repeat(600);
        let variant = format!("{}different tail", &base[..500]);
        cache.get_or_insert_with(&base, || DVector::zeros(4));
        cache.get_or_insert_with(&variant, || DVector::zeros(4));
        assert_eq!(cache.len(), 1);
    }
}
