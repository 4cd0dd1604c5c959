//! `docsift.toml` configuration.
//!
//! Every field has a default, so a missing file or a file that sets only one key
//! both work:
//!
//! ```toml
//! [retrieval]
//! top_k = 8
//! min_score = 0.25
//!
//! [embedding]
//! provider = "hash"
//! dimension = 384
//! ```

use crate::error::{Result, RetrieverError};
use crate::retrieval::scoring::ScoringConfig;
use docsift_chunk::ChunkerConfig;
use docsift_embed::{
    DEFAULT_HASH_DIMENSION, DEFAULT_MODEL_NAME, EmbedConfig, EmbeddingProvider, FastEmbedProvider,
    HashEmbedder,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "docsift.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub chunking: ChunkerConfig,
    pub scoring: ScoringConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Results returned per query
    pub top_k: usize,
    /// Results scoring below this are dropped
    pub min_score: f32,
    /// Neighbouring chunks on each side included as context
    pub context_window: usize,
    pub max_concurrent_embeddings: usize,
    /// Extra attempts per query variant after a failed embedding call
    pub embed_retries: usize,
    pub query_timeout_secs: u64,
    /// Chunks handed to theme synthesis
    pub theme_chunks: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.3,
            context_window: 2,
            max_concurrent_embeddings: 4,
            embed_retries: 1,
            query_timeout_secs: 30,
            theme_chunks: 10,
        }
    }
}

impl RetrievalConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    #[default]
    Fastembed,
    Hash,
}

impl std::str::FromStr for EmbedderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fastembed" => Ok(EmbedderKind::Fastembed),
            "hash" => Ok(EmbedderKind::Hash),
            _ => Err(format!("Invalid embedder: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbedderKind,
    pub model_name: String,
    pub batch_size: usize,
    /// Only used by the hash embedder
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderKind::default(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            batch_size: 16,
            dimension: DEFAULT_HASH_DIMENSION,
        }
    }
}

impl EmbeddingConfig {
    /// Instantiates the configured embedder. Loading fastembed may download the model.
    pub async fn create_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let provider: Arc<dyn EmbeddingProvider> = match self.provider {
            EmbedderKind::Fastembed => {
                let config = EmbedConfig::new(self.model_name.clone())
                    .with_batch_size(self.batch_size);
                Arc::new(FastEmbedProvider::create(config).await?)
            }
            EmbedderKind::Hash => Arc::new(HashEmbedder::new(self.dimension)?),
        };
        Ok(provider)
    }
}

impl RetrieverConfig {
    pub fn path_in(base: &Path) -> PathBuf {
        base.join(CONFIG_FILE_NAME)
    }

    /// Reads `docsift.toml` from `base`, falling back to defaults when it is absent.
    pub fn load(base: &Path) -> Result<Self> {
        let path = Self::path_in(base);
        if !path.exists() {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, base.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&raw)
            .map_err(|e| RetrieverError::config(format!("{}: {e}", path.display())))?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| RetrieverError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.target_words == 0 {
            return Err(RetrieverError::config("chunking.target_words must be positive"));
        }
        let scoring = &self.scoring;
        if !(scoring.max_distance.is_finite() && scoring.max_distance > 0.0) {
            return Err(RetrieverError::config(
                "scoring.max_distance must be a positive number",
            ));
        }
        if ![scoring.cosine_weight, scoring.distance_weight, scoring.boost]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(RetrieverError::config("scoring weights must be finite"));
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(RetrieverError::config(
                "retrieval.min_score must be within [0, 1]",
            ));
        }
        if self.retrieval.max_concurrent_embeddings == 0 {
            return Err(RetrieverError::config(
                "retrieval.max_concurrent_embeddings must be positive",
            ));
        }
        if self.retrieval.query_timeout_secs == 0 {
            return Err(RetrieverError::config(
                "retrieval.query_timeout_secs must be positive",
            ));
        }
        if self.embedding.batch_size == 0 || self.embedding.dimension == 0 {
            return Err(RetrieverError::config(
                "embedding.batch_size and embedding.dimension must be positive",
            ));
        }
        Ok(())
    }
}
