//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use fnv::FnvHasher;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// A batch of embeddings produced by a provider.
///
/// `embeddings[i]` belongs to the i-th input text. All vectors share
/// `dimension`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    pub embeddings: Vec<Vec<f32>>,
    pub dimension: usize,
}

impl EmbeddingResult {
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

// Loading ONNX weights is slow, so models are shared process-wide by config.
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn get_model_cache() -> &'static Mutex<HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Something that maps text to fixed-length vectors.
///
/// Implementations must be deterministic for a given model: the same text always
/// yields the same vector, and every vector has [`embedding_dimension`] entries.
///
/// [`embedding_dimension`]: EmbeddingProvider::embedding_dimension
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbedError::CountMismatch {
                expected: 1,
                actual: 0,
            })
    }

    /// Embed a batch of texts, preserving order.
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    fn embedding_dimension(&self) -> usize;

    fn provider_name(&self) -> &str;
}

/// Scales `vector` to unit length in place. Zero vectors are left alone.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn builtin_model(name: &str) -> Result<EmbeddingModel> {
    match name.to_ascii_lowercase().as_str() {
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            Ok(EmbeddingModel::AllMiniLML6V2)
        }
        "all-minilm-l12-v2" | "sentence-transformers/all-minilm-l12-v2" => {
            Ok(EmbeddingModel::AllMiniLML12V2)
        }
        "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        other => Err(EmbedError::invalid_config(format!(
            "Unsupported embedding model: {other}"
        ))),
    }
}

/// Local ONNX sentence embeddings through fastembed.
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Load (or reuse from the process cache) the model named in `config`.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        config.validate()?;
        let cache_key = create_cache_key(&config)?;

        let cached = {
            let cache = lock(get_model_cache());
            cache
                .get(&cache_key)
                .map(|(model, dim)| (Arc::clone(model), *dim))
        };

        if let Some((model, dimension)) = cached {
            tracing::info!("Using cached model for: {}", config.model_name());
            return Ok(Self {
                config,
                model,
                dimension,
            });
        }

        let model_kind = builtin_model(config.model_name())?;
        let show_progress = config.show_download_progress;
        let model_name = config.model_name().to_string();

        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                tracing::info!("Loading embedding model: {}", model_name);

                let init_options =
                    InitOptions::new(model_kind).with_show_download_progress(show_progress);
                let mut model =
                    TextEmbedding::try_new(init_options).map_err(EmbedError::model_init)?;

                // embed once so the dimension comes from the model itself
                let sample = model
                    .embed(vec!["dimension check".to_string()], None)
                    .map_err(EmbedError::model_init)?;
                let dimension = sample.first().map(|emb| emb.len()).unwrap_or(0);
                if dimension == 0 {
                    return Err(EmbedError::invalid_config(
                        "Model validation failed: empty embedding",
                    ));
                }

                tracing::info!("Model loaded successfully. Dimension: {}", dimension);
                Ok((model, dimension))
            })
            .await??;

        let model = Arc::new(Mutex::new(model));
        lock(get_model_cache()).insert(cache_key, (Arc::clone(&model), dimension));

        Ok(Self {
            config,
            model,
            dimension,
        })
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }
}

fn create_cache_key(config: &EmbedConfig) -> Result<String> {
    let config_json =
        serde_json::to_string(config).map_err(|e| EmbedError::External { source: e.into() })?;

    let mut hasher = FnvHasher::default();
    hasher.write(b"v1:");
    hasher.write(config_json.as_bytes());

    Ok(format!("v1:{:x}", hasher.finish()))
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.batch_size) {
            let batch = batch.to_vec();
            let model = Arc::clone(&self.model);

            let batch_embeddings =
                tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                    let mut model_guard = lock(&model);
                    model_guard
                        .embed(batch, None)
                        .map_err(EmbedError::embedding_gen)
                })
                .await??;

            all_embeddings.extend(batch_embeddings);
        }

        if all_embeddings.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: all_embeddings.len(),
            });
        }

        if self.config.normalize {
            for embedding in &mut all_embeddings {
                l2_normalize(embedding);
            }
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_result() {
        let embeddings = vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]];
        let result = EmbeddingResult::new(embeddings);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());
        assert!(EmbeddingResult::new(vec![]).is_empty());
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_builtin_model_lookup() {
        assert!(matches!(
            builtin_model("all-MiniLM-L6-v2"),
            Ok(EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(matches!(
            builtin_model("ModernBERT-large"),
            Err(EmbedError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_cache_key_is_stable_and_config_sensitive() -> Result<()> {
        let a = create_cache_key(&EmbedConfig::default())?;
        let b = create_cache_key(&EmbedConfig::default())?;
        let c = create_cache_key(&EmbedConfig::default().with_batch_size(2))?;

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("v1:"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_model_fails_before_download() {
        let result = FastEmbedProvider::create(EmbedConfig::new("no-such-model")).await;
        assert!(matches!(result, Err(EmbedError::InvalidConfig { .. })));
    }

    #[tokio::test]
    #[ignore] // Downloads all-MiniLM-L6-v2: cargo test -p docsift-embed -- --ignored
    async fn test_minilm_embeddings() -> Result<()> {
        let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
        assert_eq!(provider.provider_name(), "fastembed");
        assert_eq!(provider.embedding_dimension(), 384);

        let texts = vec![
            "Blood in the urine is called hematuria.".to_string(),
            "Hematuria means there is blood in your urine.".to_string(),
            "The stock market closed higher on Friday.".to_string(),
        ];
        let result = provider.embed_texts(&texts).await?;
        assert_eq!(result.len(), 3);
        assert_eq!(result.dimension, 384);

        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        let related = dot(&result.embeddings[0], &result.embeddings[1]);
        let unrelated = dot(&result.embeddings[0], &result.embeddings[2]);
        assert!(related > unrelated, "{related} <= {unrelated}");

        // second provider comes from the cache
        let again = FastEmbedProvider::create(EmbedConfig::default()).await?;
        assert_eq!(again.embed_text(&texts[0]).await?, result.embeddings[0]);
        Ok(())
    }
}
