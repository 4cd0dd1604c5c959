//! Error types for indexing and retrieval

use docsift_embed::EmbedError;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, RetrieverError>;

#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// An index was requested over zero chunks
    #[error("No chunks to index")]
    EmptyInput,

    /// A query arrived before any index was built or loaded
    #[error("No index available. Upload documents first")]
    IndexNotFound,

    /// Persisted chunks and vectors disagree
    #[error("Index is corrupt: {reason}")]
    IndexCorrupt { reason: String },

    #[error("Embedding failed: {source}")]
    Embedding {
        #[from]
        source: EmbedError,
    },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Build input was not positioned `0..n` in order
    #[error("Chunk at index {index} has position {found}")]
    InvalidPositions { index: usize, found: usize },

    #[error("Storage error: {source}")]
    Storage {
        #[from]
        source: sqlx::Error,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Query timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl RetrieverError {
    pub fn corrupt<S: Into<String>>(reason: S) -> Self {
        Self::IndexCorrupt {
            reason: reason.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True when a stored index is unusable as is and has to be cleared or rebuilt.
    pub fn requires_rebuild(&self) -> bool {
        matches!(
            self,
            Self::IndexCorrupt { .. } | Self::DimensionMismatch { .. }
        )
    }
}
