//! Multi-query retrieval.
//!
//! Every query variant is embedded and searched on its own; the hits are scored,
//! pooled, and reduced to at most `top_k` results with one entry per position.
//! Embedding calls for the variants run concurrently, bounded by
//! `max_concurrent_embeddings`; the merge runs once after all of them finish.

use crate::error::{Result, RetrieverError};
use crate::retrieval::context::context;
use crate::retrieval::expansion::dedup_variants;
use crate::retrieval::scoring::RelevanceScorer;
use crate::retrieval::vector_index::VectorIndex;
use docsift_embed::{EmbedError, EmbeddingProvider};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredResult {
    pub position: usize,
    pub relevance_score: f32,
    pub raw_distance: f32,
    pub context: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrieverOptions {
    pub context_window: usize,
    pub max_concurrent_embeddings: usize,
    /// Extra attempts after a failed embedding call
    pub embed_retries: usize,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self {
            context_window: 2,
            max_concurrent_embeddings: 4,
            embed_retries: 1,
        }
    }
}

pub struct MultiQueryRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    scorer: RelevanceScorer,
    options: RetrieverOptions,
}

impl std::fmt::Debug for MultiQueryRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiQueryRetriever")
            .field("embedder", &self.embedder.provider_name())
            .field("scorer", &self.scorer)
            .field("options", &self.options)
            .finish()
    }
}

impl MultiQueryRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        scorer: RelevanceScorer,
        options: RetrieverOptions,
    ) -> Self {
        Self {
            embedder,
            scorer,
            options,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Searches `index` once per variant and merges the scored hits.
    ///
    /// Fails with [`RetrieverError::IndexNotFound`] when there is no index, before
    /// anything else is looked at. A variant whose embedding still fails after the
    /// configured retries is skipped with a warning; only when every variant fails
    /// is the last embedding error returned.
    pub async fn retrieve(
        &self,
        variants: &[String],
        index: Option<&VectorIndex>,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredResult>> {
        let index = index.ok_or(RetrieverError::IndexNotFound)?;

        let variants = dedup_variants(variants);
        if variants.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let embedded: Vec<(&str, std::result::Result<Vec<f32>, EmbedError>)> =
            stream::iter(0..variants.len())
                .map(|i| {
                    let variant = &variants[i];
                    async move { (variant.as_str(), self.embed_variant(variant).await) }
                })
                .buffered(self.options.max_concurrent_embeddings.max(1))
                .collect()
                .await;

        let mut candidates = Vec::new();
        let mut succeeded = 0;
        let mut last_error = None;

        for (variant, outcome) in embedded {
            let query_vector = match outcome {
                Ok(vector) => vector,
                Err(e) => {
                    tracing::warn!("Dropping query variant {:?}: {}", variant, e);
                    last_error = Some(e);
                    continue;
                }
            };
            succeeded += 1;

            let hits = index.search(&query_vector, top_k)?;
            tracing::debug!("Variant {:?} matched {} chunks", variant, hits.len());

            for hit in hits {
                let Some(chunk_vector) = index.vector(hit.position) else {
                    continue;
                };
                candidates.push(ScoredResult {
                    position: hit.position,
                    relevance_score: self.scorer.score(&query_vector, chunk_vector, hit.distance),
                    raw_distance: hit.distance,
                    context: String::new(),
                });
            }
        }

        if succeeded == 0 {
            if let Some(e) = last_error {
                return Err(e.into());
            }
        }

        let mut results = merge_ranked(candidates, top_k, min_score);
        for result in &mut results {
            result.context = context(index.chunks(), result.position, self.options.context_window);
        }
        Ok(results)
    }

    async fn embed_variant(&self, variant: &str) -> std::result::Result<Vec<f32>, EmbedError> {
        let mut attempt = 0;
        loop {
            match self.embedder.embed_text(variant).await {
                Ok(vector) => return Ok(vector),
                Err(e) if attempt < self.options.embed_retries => {
                    attempt += 1;
                    tracing::debug!("Embedding attempt {} for {:?} failed: {}", attempt, variant, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Orders candidates by score (ties by position), keeps the first occurrence of
/// each position, drops scores below `min_score`, and stops at `top_k`.
///
/// Because the walk is in descending score order, the entry kept for a position is
/// its highest-scoring one.
pub fn merge_ranked(
    mut candidates: Vec<ScoredResult>,
    top_k: usize,
    min_score: f32,
) -> Vec<ScoredResult> {
    candidates.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then(a.position.cmp(&b.position))
    });

    let mut seen = HashSet::new();
    let mut accepted = Vec::with_capacity(top_k.min(candidates.len()));

    for candidate in candidates {
        if accepted.len() >= top_k {
            break;
        }
        if !seen.insert(candidate.position) || candidate.relevance_score < min_score {
            continue;
        }
        accepted.push(candidate);
    }

    accepted
}
