//! Relevance scoring.
//!
//! A hit's relevance blends the cosine similarity of the two vectors with a
//! similarity derived from the raw index distance, then boosts and clamps the
//! blend into `[0, 1]`:
//!
//! ```text
//! similarity = 1 - raw_distance / max_distance
//! combined   = cosine_weight * cosine + distance_weight * similarity
//! score      = clamp(combined * boost, 0, 1)
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Distance that maps to a distance-similarity of zero
    pub max_distance: f32,
    pub cosine_weight: f32,
    pub distance_weight: f32,
    pub boost: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_distance: 2.0,
            cosine_weight: 0.7,
            distance_weight: 0.3,
            boost: 1.2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceScorer {
    config: ScoringConfig,
}

impl RelevanceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Scores one hit. Always returns a value in `[0, 1]`; anything non-finite scores 0.
    pub fn score(&self, query: &[f32], chunk: &[f32], raw_distance: f32) -> f32 {
        let similarity = 1.0 - raw_distance / self.config.max_distance;
        let cosine = cosine_similarity(query, chunk);
        let combined =
            self.config.cosine_weight * cosine + self.config.distance_weight * similarity;
        let boosted = combined * self.config.boost;

        if boosted.is_finite() {
            boosted.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Cosine similarity of two vectors. Mismatched lengths or a zero vector give 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
