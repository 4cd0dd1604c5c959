//! Deterministic feature-hashing embedder.
//!
//! [`HashEmbedder`] needs no model download: each lowercase word of the input is
//! hashed into one of `dimension` buckets with a hash-derived sign, and the
//! resulting bag-of-words vector is L2-normalized. Texts that share vocabulary end
//! up close together, which is enough for offline runs and tests.

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, l2_normalize};
use async_trait::async_trait;
use fnv::FnvHasher;
use std::hash::Hasher;

pub const DEFAULT_HASH_DIMENSION: usize = 256;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_HASH_DIMENSION,
        }
    }
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config(
                "hash embedder dimension must be positive",
            ));
        }
        Ok(Self { dimension })
    }

    /// Embeds one text synchronously.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty());

        for token in tokens {
            let mut hasher = FnvHasher::default();
            hasher.write(token.as_bytes());
            let hash = hasher.finish();

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let embeddings = texts.iter().map(|t| self.embed(t)).collect::<Vec<_>>();
        Ok(EmbeddingResult {
            embeddings,
            dimension: self.dimension,
        })
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("Kidney stones cause flank pain.");
        let b = embedder.embed("Kidney stones cause flank pain.");

        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_HASH_DIMENSION);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = HashEmbedder::default();
        assert_eq!(embedder.embed("Blood, urine!"), embedder.embed("blood urine"));
    }

    #[test]
    fn test_shared_words_are_closer() {
        let embedder = HashEmbedder::new(512).expect("valid dimension");
        let query = embedder.embed("blood in urine");
        let related = embedder.embed("there was blood in the urine sample");
        let unrelated = embedder.embed("quarterly revenue grew steadily");

        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(8).expect("valid dimension");
        assert_eq!(embedder.embed("   "), vec![0.0; 8]);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashEmbedder::new(0).is_err());
    }

    #[test]
    fn test_provider_batch() -> Result<()> {
        let embedder = HashEmbedder::new(32)?;
        let texts = vec!["one".to_string(), "two".to_string()];
        let result = tokio_test::block_on(embedder.embed_texts(&texts))?;

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 32);
        assert_eq!(result.embeddings[0], embedder.embed("one"));
        assert_eq!(embedder.provider_name(), "hash");
        Ok(())
    }
}
