//! The retrieval engine: ingestion, querying and index lifecycle.
//!
//! [`RetrievalEngine`] owns the published snapshot and the store it is persisted
//! in. Ingestion chunks and embeds new documents, appends them after the current
//! entries, saves the combined snapshot and only then publishes it. Queries read
//! whatever snapshot is published when they start.
//!
//! ```no_run
//! use docsift_embed::HashEmbedder;
//! use docsift_retriever::config::RetrieverConfig;
//! use docsift_retriever::retrieval::engine::{DocumentText, QueryRequest, RetrievalEngine};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = RetrievalEngine::open(
//!     Path::new("."),
//!     RetrieverConfig::default(),
//!     Arc::new(HashEmbedder::default()),
//! )
//! .await?;
//!
//! engine
//!     .ingest(vec![DocumentText::single("notes.txt", "Fever is also called pyrexia.")])
//!     .await?;
//!
//! let response = engine.query(&QueryRequest::new("what is pyrexia")).await?;
//! for result in &response.results {
//!     println!("{:.2} {}", result.relevance_score, result.citation);
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::RetrieverConfig;
use crate::error::{Result, RetrieverError};
use crate::retrieval::context::ContextAssembler;
use crate::retrieval::expansion::{QueryExpander, expand_or_fallback, normalize_query};
use crate::retrieval::multi_query::{MultiQueryRetriever, RetrieverOptions};
use crate::retrieval::scoring::RelevanceScorer;
use crate::retrieval::snapshot::{PublishedIndex, Snapshot};
use crate::retrieval::themes::{THEME_FAILURE_MESSAGE, ThemeSynthesizer, build_theme_prompt};
use crate::retrieval::vector_index::{VectorIndex, embed_chunks};
use crate::storage::{SnapshotStore, SqliteSnapshotStore};
use chrono::{DateTime, Utc};
use docsift_chunk::{Chunk, Chunker};
use docsift_embed::EmbeddingProvider;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

const PREVIEW_CHARS: usize = 500;
const ANSWER_CHARS: usize = 300;

/// Extracted text of one document, page by page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentText {
    pub document_id: String,
    pub pages: Vec<String>,
}

impl DocumentText {
    pub fn new(document_id: impl Into<String>, pages: Vec<String>) -> Self {
        Self {
            document_id: document_id.into(),
            pages,
        }
    }

    /// A document without page structure.
    pub fn single(document_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(document_id, vec![text.into()])
    }

    /// Splits `text` into pages at form feed characters.
    pub fn from_form_feeds(document_id: impl Into<String>, text: &str) -> Self {
        Self::new(document_id, text.split('\u{000C}').map(str::to_string).collect())
    }

    /// All pages joined with newlines.
    pub fn full_text(&self) -> String {
        self.pages.join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub status: IngestStatus,
    pub num_chunks: usize,
    pub extracted_text_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub files_processed: usize,
    pub total_files: usize,
    pub results: Vec<IngestReport>,
    pub stats: IndexStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub entries: usize,
    pub documents: usize,
    pub dimension: usize,
    pub version: String,
    pub built_at: DateTime<Utc>,
    pub embedder: String,
}

impl IndexStats {
    fn of(snapshot: &Snapshot) -> Self {
        Self {
            entries: snapshot.meta.entries,
            documents: snapshot.index.document_count(),
            dimension: snapshot.meta.dimension,
            version: snapshot.meta.version.clone(),
            built_at: snapshot.meta.built_at,
            embedder: snapshot.meta.embedder.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub top_k: usize,
    pub include_context: bool,
    pub min_score: f32,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: 5,
            include_context: true,
            min_score: 0.3,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_context(mut self, include_context: bool) -> Self {
        self.include_context = include_context;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub document: String,
    pub page: u32,
    pub paragraph: u32,
    pub sentence: u32,
}

impl Citation {
    pub fn of(chunk: &Chunk) -> Self {
        Self {
            document: chunk.document_id.clone(),
            page: chunk.page,
            paragraph: chunk.paragraph,
            sentence: chunk.sentence,
        }
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Page {}, Para {}, Sent {}",
            self.page, self.paragraph, self.sentence
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub context: String,
    pub relevance_score: f32,
    pub distance: f32,
    pub position: usize,
    pub citation: Citation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub processed_query: String,
    pub variants: Vec<String>,
    pub results: Vec<SearchResult>,
    pub total_matches: usize,
}

impl QueryResponse {
    /// One display row per result.
    pub fn rows(&self) -> Vec<ResultRow> {
        self.results.iter().map(ResultRow::of).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub document: String,
    pub extracted_answer: String,
    pub citation: String,
}

impl ResultRow {
    pub fn of(result: &SearchResult) -> Self {
        Self {
            document: result.chunk.document_id.clone(),
            extracted_answer: truncate_chars(&result.chunk.text, ANSWER_CHARS, "..."),
            citation: result.citation.to_string(),
        }
    }
}

/// A stored chunk with its surrounding text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkView {
    pub chunk: Chunk,
    pub context: String,
    pub citation: Citation,
}

fn truncate_chars(text: &str, max_chars: usize, ellipsis: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{ellipsis}", &text[..cut]),
        None => text.to_string(),
    }
}

pub struct RetrievalEngine {
    config: RetrieverConfig,
    chunker: Chunker,
    assembler: ContextAssembler,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: MultiQueryRetriever,
    store: Arc<dyn SnapshotStore>,
    published: PublishedIndex,
    expander: Option<Arc<dyn QueryExpander>>,
    themes: Option<Arc<dyn ThemeSynthesizer>>,
}

impl fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("config", &self.config)
            .field("embedder", &self.embedder.provider_name())
            .field("expander", &self.expander.is_some())
            .field("themes", &self.themes.is_some())
            .finish()
    }
}

impl RetrievalEngine {
    pub fn new(
        config: RetrieverConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let retriever = MultiQueryRetriever::new(
            Arc::clone(&embedder),
            RelevanceScorer::new(config.scoring),
            RetrieverOptions {
                context_window: config.retrieval.context_window,
                max_concurrent_embeddings: config.retrieval.max_concurrent_embeddings,
                embed_retries: config.retrieval.embed_retries,
            },
        );

        Self {
            chunker: Chunker::new(config.chunking),
            assembler: ContextAssembler::new(config.retrieval.context_window),
            config,
            embedder,
            retriever,
            store,
            published: PublishedIndex::new(),
            expander: None,
            themes: None,
        }
    }

    /// Opens the SQLite store under `base` and publishes any snapshot it holds.
    pub async fn open(
        base: &Path,
        config: RetrieverConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let engine = Self::open_unloaded(base, config, embedder).await?;
        engine.load().await?;
        Ok(engine)
    }

    /// Opens the SQLite store under `base` without reading the stored snapshot.
    ///
    /// Nothing is published until [`load`](Self::load) succeeds, and an
    /// [`ingest`](Self::ingest) before that replaces whatever is stored. This is
    /// the way back from a stored index that fails to load with an error for which
    /// [`RetrieverError::requires_rebuild`] holds.
    pub async fn open_unloaded(
        base: &Path,
        config: RetrieverConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let store = SqliteSnapshotStore::open(base).await?;
        Ok(Self::new(config, embedder, Arc::new(store)))
    }

    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn with_theme_synthesizer(mut self, themes: Arc<dyn ThemeSynthesizer>) -> Self {
        self.themes = Some(themes);
        self
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// A request carrying this engine's configured defaults.
    pub fn request(&self, query: impl Into<String>) -> QueryRequest {
        QueryRequest::new(query)
            .with_top_k(self.config.retrieval.top_k)
            .with_min_score(self.config.retrieval.min_score)
    }

    /// Publishes the persisted snapshot, if there is one.
    pub async fn load(&self) -> Result<Option<IndexStats>> {
        let _guard = self.published.begin_write().await;

        let Some(snapshot) = self.store.load().await? else {
            tracing::info!("No stored index found");
            return Ok(None);
        };
        self.check_dimension(snapshot.meta.dimension)?;

        let snapshot = self.published.publish(snapshot).await;
        Ok(Some(IndexStats::of(&snapshot)))
    }

    pub async fn stats(&self) -> Option<IndexStats> {
        self.published
            .current()
            .await
            .map(|snapshot| IndexStats::of(&snapshot))
    }

    /// Deletes the stored snapshot and stops serving it.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.published.begin_write().await;
        self.store.clear().await?;
        self.published.unpublish().await;
        Ok(())
    }

    /// Chunks, embeds and appends `documents` to the index.
    ///
    /// A document that fails is reported and skipped; the others are still
    /// indexed. A document whose id is already indexed replaces the earlier copy,
    /// and within one call the last document with a given id wins.
    ///
    /// When nothing is published, the stored snapshot is replaced rather than
    /// extended. If no document could be indexed, fails with
    /// [`RetrieverError::Embedding`] when every failure came from the embedder and
    /// with [`RetrieverError::EmptyInput`] otherwise.
    pub async fn ingest(&self, documents: Vec<DocumentText>) -> Result<IngestSummary> {
        let _guard = self.published.begin_write().await;
        let current = self.published.current().await;
        if let Some(snapshot) = &current {
            self.check_dimension(snapshot.meta.dimension)?;
        }

        let total_files = documents.len();
        let mut results = Vec::with_capacity(total_files);
        let mut prepared: Vec<(String, Vec<Chunk>, Vec<Vec<f32>>)> = Vec::new();
        let mut embedding_failure = None;
        let mut other_failures = 0;

        for document in documents {
            let preview = truncate_chars(&document.full_text(), PREVIEW_CHARS, "");

            match self.prepare_document(&document).await {
                Ok((chunks, vectors)) => {
                    tracing::info!(
                        "Prepared {} chunks for {}",
                        chunks.len(),
                        document.document_id
                    );
                    results.push(IngestReport {
                        document_id: document.document_id.clone(),
                        status: IngestStatus::Success,
                        num_chunks: chunks.len(),
                        extracted_text_preview: preview,
                        error: None,
                    });
                    prepared.retain(|(id, _, _)| *id != document.document_id);
                    prepared.push((document.document_id, chunks, vectors));
                }
                Err(e) => {
                    let message = match &e {
                        RetrieverError::EmptyInput => "No text chunks generated".to_string(),
                        other => other.to_string(),
                    };
                    tracing::warn!("Failed to ingest {}: {}", document.document_id, message);
                    results.push(IngestReport {
                        document_id: document.document_id,
                        status: IngestStatus::Error,
                        num_chunks: 0,
                        extracted_text_preview: preview,
                        error: Some(message),
                    });
                    match e {
                        RetrieverError::Embedding { source } => embedding_failure = Some(source),
                        _ => other_failures += 1,
                    }
                }
            }
        }

        let files_processed = results
            .iter()
            .filter(|r| r.status == IngestStatus::Success)
            .count();
        if files_processed == 0 {
            return Err(match embedding_failure {
                Some(source) if other_failures == 0 => RetrieverError::Embedding { source },
                _ => RetrieverError::EmptyInput,
            });
        }

        let replaced: HashSet<String> = prepared.iter().map(|(id, _, _)| id.clone()).collect();
        let mut new_chunks = Vec::new();
        let mut new_vectors = Vec::new();
        for (_, chunks, vectors) in prepared {
            new_chunks.extend(chunks);
            new_vectors.extend(vectors);
        }

        let kept = current.as_ref().and_then(|snapshot| {
            let before = snapshot.index.len();
            let kept = snapshot.index.without_documents(&replaced);
            let after = kept.as_ref().map_or(0, VectorIndex::len);
            if after < before {
                tracing::info!("Replacing {} previously indexed chunks", before - after);
            }
            kept
        });

        let index = match kept {
            Some(index) => index.append(new_chunks, new_vectors)?,
            None => {
                let chunks = new_chunks
                    .into_iter()
                    .enumerate()
                    .map(|(i, chunk)| chunk.with_position(i))
                    .collect();
                VectorIndex::from_parts(chunks, new_vectors)?
            }
        };

        let snapshot = Snapshot::new(index, self.embedder.provider_name());
        self.store.save(&snapshot).await?;
        let snapshot = self.published.publish(snapshot).await;

        tracing::info!(
            "Indexed {} of {} documents, {} entries total",
            files_processed,
            total_files,
            snapshot.meta.entries
        );

        Ok(IngestSummary {
            files_processed,
            total_files,
            results,
            stats: IndexStats::of(&snapshot),
        })
    }

    async fn prepare_document(&self, document: &DocumentText) -> Result<(Vec<Chunk>, Vec<Vec<f32>>)> {
        let chunks = self
            .chunker
            .chunk_pages(&document.pages, &document.document_id);
        if chunks.is_empty() {
            return Err(RetrieverError::EmptyInput);
        }

        let vectors = embed_chunks(&chunks, self.embedder.as_ref()).await?;
        let expected = self.embedder.embedding_dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(RetrieverError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        Ok((chunks, vectors))
    }

    /// Answers `request` against the published snapshot.
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let snapshot = self
            .published
            .current()
            .await
            .ok_or(RetrieverError::IndexNotFound)?;

        let timeout = self.config.retrieval.query_timeout();
        let search = async {
            let variants = expand_or_fallback(self.expander.as_deref(), &request.query).await;
            tracing::debug!("Searching {} variants of {:?}", variants.len(), request.query);
            let scored = self
                .retriever
                .retrieve(
                    &variants,
                    Some(&snapshot.index),
                    request.top_k,
                    request.min_score,
                )
                .await?;
            Ok::<_, RetrieverError>((variants, scored))
        };

        let (variants, scored) = tokio::time::timeout(timeout, search)
            .await
            .map_err(|_| RetrieverError::Timeout(timeout))??;

        let results: Vec<SearchResult> = scored
            .into_iter()
            .filter_map(|hit| {
                let chunk = snapshot.index.chunk(hit.position)?.clone();
                Some(SearchResult {
                    citation: Citation::of(&chunk),
                    context: if request.include_context {
                        hit.context
                    } else {
                        String::new()
                    },
                    relevance_score: hit.relevance_score,
                    distance: hit.raw_distance,
                    position: hit.position,
                    chunk,
                })
            })
            .collect();

        tracing::info!(
            "Query {:?} matched {} chunks",
            request.query,
            results.len()
        );

        Ok(QueryResponse {
            query: request.query.clone(),
            processed_query: normalize_query(&request.query),
            variants,
            total_matches: results.len(),
            results,
        })
    }

    /// The chunk at `position` with its context window.
    pub async fn get(&self, position: usize) -> Result<Option<ChunkView>> {
        let snapshot = self
            .published
            .current()
            .await
            .ok_or(RetrieverError::IndexNotFound)?;

        Ok(snapshot.index.chunk(position).map(|chunk| ChunkView {
            chunk: chunk.clone(),
            context: self.assembler.assemble(snapshot.index.chunks(), position),
            citation: Citation::of(chunk),
        }))
    }

    /// Summarizes the leading results into themes.
    ///
    /// Returns `None` when no synthesizer is configured. A failing synthesizer
    /// yields [`THEME_FAILURE_MESSAGE`].
    pub async fn synthesize_themes(&self, query: &str, results: &[SearchResult]) -> Option<String> {
        let themes = self.themes.as_ref()?;

        let chunks: Vec<Chunk> = results
            .iter()
            .take(self.config.retrieval.theme_chunks)
            .map(|r| r.chunk.clone())
            .collect();
        let prompt = build_theme_prompt(query, &chunks);

        match themes.synthesize(&prompt).await {
            Ok(summary) => Some(summary.trim().to_string()),
            Err(e) => {
                tracing::warn!("Error synthesizing themes: {}", e);
                Some(THEME_FAILURE_MESSAGE.to_string())
            }
        }
    }

    fn check_dimension(&self, stored: usize) -> Result<()> {
        let expected = self.embedder.embedding_dimension();
        if stored != expected {
            return Err(RetrieverError::DimensionMismatch {
                expected,
                actual: stored,
            });
        }
        Ok(())
    }
}
