//! docsift-retriever: semantic retrieval over extracted document text
//!
//! Documents are split into citable chunks, embedded, and searched with several
//! phrasings of each query. Every result carries its page, paragraph and sentence
//! so it can be cited, plus the surrounding chunks as context.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: Index, scoring, multi-query search and the [`RetrievalEngine`]
//! - **[`storage`]**: Snapshot persistence with a SQLite implementation
//! - **[`config`]**: `docsift.toml` loading
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docsift_retriever::{DocumentText, QueryRequest, RetrievalEngine, RetrieverConfig};
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RetrieverConfig::load(Path::new("."))?;
//! let embedder = config.embedding.create_provider().await?;
//! let engine = RetrievalEngine::open(Path::new("."), config, embedder).await?;
//!
//! engine
//!     .ingest(vec![DocumentText::from_form_feeds("report.txt", "Page one.\u{c}Page two.")])
//!     .await?;
//! let response = engine.query(&QueryRequest::new("what is on page two")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Pages → Chunker → Embeddings → VectorIndex → Snapshot → SQLite
//!                                     ↓
//! Query → Variants → MultiQueryRetriever → Scorer → Context → Results
//! ```

pub mod config;
pub mod error;
pub mod retrieval;
pub mod storage;

pub use config::RetrieverConfig;
pub use error::{Result, RetrieverError};
pub use retrieval::engine::{
    Citation, DocumentText, IndexStats, IngestReport, IngestStatus, IngestSummary, QueryRequest,
    QueryResponse, RetrievalEngine, SearchResult,
};
