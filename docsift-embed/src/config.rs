//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};

/// Name of the built-in sentence embedding model.
pub const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Configuration for embedding models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Name of the embedding model to use
    pub model_name: String,
    /// Maximum batch size for embedding generation
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    pub normalize: bool,
    /// Print download progress the first time a model is fetched
    pub show_download_progress: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            batch_size: 16,
            normalize: true,
            show_download_progress: false,
        }
    }
}

impl EmbedConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_download_progress(mut self, show: bool) -> Self {
        self.show_download_progress = show;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model_name must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be positive"));
        }
        Ok(())
    }
}
