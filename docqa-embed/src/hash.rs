//! Deterministic feature-hashing embeddings.
//!
//! [`FeatureHashProvider`] maps lowercase word unigrams and bigrams into a fixed
//! number of buckets with FNV hashing (the "hashing trick"), then normalizes. It
//! needs no model files or network access, always returns the same vector for the
//! same text, and still ranks passages that share vocabulary with a query above
//! passages that don't. Useful for air-gapped installs and for tests.

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, to_f16_vector};
use async_trait::async_trait;
use fnv::FnvHasher;
use half::f16;
use std::hash::Hasher;

const BIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct FeatureHashProvider {
    dimension: usize,
}

impl FeatureHashProvider {
    pub const DEFAULT_DIMENSION: usize = 384;
    pub const MODEL_NAME: &'static str = "fnv-word-bigram-v1";

    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config(
                "feature hash dimension must be at least 1",
            ));
        }
        Ok(Self { dimension })
    }

    /// Embed synchronously; the async trait methods delegate here.
    pub fn embed_sync(&self, text: &str) -> Vec<f16> {
        let mut buckets = vec![0.0f32; self.dimension];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        for word in &words {
            self.add_feature(&mut buckets, &[word.as_bytes()], 1.0);
        }
        for pair in words.windows(2) {
            self.add_feature(
                &mut buckets,
                &[pair[0].as_bytes(), b"\x1f", pair[1].as_bytes()],
                BIGRAM_WEIGHT,
            );
        }

        to_f16_vector(&buckets, true)
    }

    fn add_feature(&self, buckets: &mut [f32], parts: &[&[u8]], weight: f32) {
        let mut hasher = FnvHasher::default();
        for part in parts {
            hasher.write(part);
        }
        let hash = hasher.finish();
        let index = (hash % self.dimension as u64) as usize;
        // Top bit picks the sign so collisions tend to cancel rather than pile up
        let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
        buckets[index] += sign * weight;
    }
}

impl Default for FeatureHashProvider {
    fn default() -> Self {
        Self {
            dimension: Self::DEFAULT_DIMENSION,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FeatureHashProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        tracing::debug!("Hashing {} texts into {} buckets", texts.len(), self.dimension);
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| self.embed_sync(t)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "feature-hash"
    }

    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f16], b: &[f16]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum()
    }

    #[test]
    fn test_deterministic() {
        let provider = FeatureHashProvider::default();
        let a = provider.embed_sync("The quick brown fox");
        let b = provider.embed_sync("the QUICK brown fox!");

        assert_eq!(a.len(), 384);
        assert_eq!(a, b, "case and punctuation should not matter");
    }

    #[test]
    fn test_unit_length() {
        let v = FeatureHashProvider::new(64).unwrap().embed_sync("some words here");
        let norm: f32 = v.iter().map(|x| x.to_f32() * x.to_f32()).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-2, "norm was {norm}");
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let v = FeatureHashProvider::default().embed_sync("   ");
        assert!(v.iter().all(|x| x.to_f32() == 0.0));
    }

    #[test]
    fn test_shared_vocabulary_ranks_higher() {
        let provider = FeatureHashProvider::default();
        let query = provider.embed_sync("how do solar panels generate electricity");
        let related = provider.embed_sync("Solar panels generate electricity from sunlight.");
        let unrelated = provider.embed_sync("Bake the bread for forty minutes at high heat.");

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(FeatureHashProvider::new(0).is_err());
    }

    #[test]
    fn test_batch_through_trait() {
        let provider = FeatureHashProvider::new(32).unwrap();
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let result = tokio_test::block_on(provider.embed_texts(&texts)).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 32);
        assert_eq!(provider.model_id(), "feature-hash:fnv-word-bigram-v1:32:norm");
    }
}
