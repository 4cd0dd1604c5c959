//! # docsift-embed
//!
//! Text embeddings for docsift, behind one async trait so the retrieval pipeline
//! never cares which model produced a vector.
//!
//! ## Providers
//!
//! - [`FastEmbedProvider`]: local ONNX sentence embeddings through fastembed
//!   (`all-MiniLM-L6-v2` by default). Loaded models are cached process-wide by
//!   configuration, and inference runs on the blocking thread pool.
//! - [`HashEmbedder`]: deterministic feature hashing with no download, for offline
//!   runs and tests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docsift_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}",
//!          result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`] type.

pub mod config;
pub mod error;
pub mod hashing;
pub mod provider;

pub use config::{DEFAULT_MODEL_NAME, EmbedConfig};
pub use error::{EmbedError, Result};
pub use hashing::{DEFAULT_HASH_DIMENSION, HashEmbedder};
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, l2_normalize};
