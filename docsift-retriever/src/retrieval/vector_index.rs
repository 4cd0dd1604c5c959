//! Exact nearest-neighbour index over chunk embeddings.
//!
//! Entries are stored in `position` order, so a chunk's position doubles as the
//! offset of its vector. Search is a brute-force scan by squared Euclidean
//! distance; an index is immutable once built, and [`VectorIndex::extend`]
//! returns a new index rather than mutating the current one.

use crate::error::{Result, RetrieverError};
use docsift_chunk::Chunk;
use docsift_embed::{EmbedError, EmbeddingProvider};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    pub position: usize,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl VectorIndex {
    /// Embeds every chunk and indexes the result.
    ///
    /// Chunks must be positioned `0..n` in order.
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn EmbeddingProvider) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RetrieverError::EmptyInput);
        }
        check_positions(&chunks)?;

        let vectors = embed_chunks(&chunks, embedder).await?;
        tracing::info!(
            "Built index of {} chunks with {}",
            chunks.len(),
            embedder.provider_name()
        );
        Self::from_parts(chunks, vectors)
    }

    /// Assembles an index from chunks and their already computed vectors.
    pub fn from_parts(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.is_empty() && vectors.is_empty() {
            return Err(RetrieverError::EmptyInput);
        }
        if chunks.len() != vectors.len() {
            return Err(RetrieverError::corrupt(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        check_positions(&chunks)?;

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(RetrieverError::corrupt("vectors have zero dimension"));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(RetrieverError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        Ok(Self {
            chunks,
            vectors,
            dimension,
        })
    }

    /// Returns a new index holding the current entries followed by `new_chunks`.
    ///
    /// The new chunks are renumbered to continue after the last existing position
    /// and only they are embedded.
    pub async fn extend(
        &self,
        new_chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        if new_chunks.is_empty() {
            return Ok(self.clone());
        }
        let new_vectors = embed_chunks(&new_chunks, embedder).await?;
        self.append(new_chunks, new_vectors)
    }

    /// Like [`extend`](Self::extend) with vectors that were already computed.
    pub fn append(&self, new_chunks: Vec<Chunk>, new_vectors: Vec<Vec<f32>>) -> Result<Self> {
        if new_chunks.len() != new_vectors.len() {
            return Err(RetrieverError::corrupt(format!(
                "{} new chunks but {} new vectors",
                new_chunks.len(),
                new_vectors.len()
            )));
        }
        if let Some(bad) = new_vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RetrieverError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        let offset = self.len();
        let mut chunks = self.chunks.clone();
        chunks.extend(
            new_chunks
                .into_iter()
                .enumerate()
                .map(|(i, chunk)| chunk.with_position(offset + i)),
        );
        let mut vectors = self.vectors.clone();
        vectors.extend(new_vectors);

        tracing::info!("Extended index from {} to {} chunks", offset, chunks.len());
        Ok(Self {
            chunks,
            vectors,
            dimension: self.dimension,
        })
    }

    /// The `k` entries closest to `query`, nearest first. Equal distances are
    /// ordered by position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(RetrieverError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| SearchHit {
                position,
                distance: squared_euclidean(query, vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Same as [`len`](Self::len).
    pub fn size(&self) -> usize {
        self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Length shared by every stored vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// All chunks in position order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The chunk at `position`, or `None` past the end.
    pub fn chunk(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    /// The vector stored for `position`, or `None` past the end.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.vectors.get(position).map(Vec::as_slice)
    }

    /// All vectors, aligned with [`chunks`](Self::chunks).
    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    /// A copy without any chunk whose document id is in `document_ids`.
    ///
    /// The remaining entries keep their order and are renumbered from 0. Returns
    /// `None` when nothing remains.
    pub fn without_documents(&self, document_ids: &HashSet<String>) -> Option<Self> {
        let (chunks, vectors): (Vec<Chunk>, Vec<Vec<f32>>) = self
            .chunks
            .iter()
            .zip(&self.vectors)
            .filter(|(chunk, _)| !document_ids.contains(&chunk.document_id))
            .enumerate()
            .map(|(i, (chunk, vector))| (chunk.clone().with_position(i), vector.clone()))
            .unzip();

        if chunks.is_empty() {
            return None;
        }
        Some(Self {
            chunks,
            vectors,
            dimension: self.dimension,
        })
    }

    /// Number of distinct document ids in the index.
    pub fn document_count(&self) -> usize {
        let mut ids: Vec<&str> = self.chunks.iter().map(|c| c.document_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

fn check_positions(chunks: &[Chunk]) -> Result<()> {
    for (index, chunk) in chunks.iter().enumerate() {
        if chunk.position != index {
            return Err(RetrieverError::InvalidPositions {
                index,
                found: chunk.position,
            });
        }
    }
    Ok(())
}

/// Embeds the text of every chunk, in order.
pub async fn embed_chunks(
    chunks: &[Chunk],
    embedder: &dyn EmbeddingProvider,
) -> Result<Vec<Vec<f32>>> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let result = embedder.embed_texts(&texts).await?;

    if result.len() != texts.len() {
        return Err(EmbedError::CountMismatch {
            expected: texts.len(),
            actual: result.len(),
        }
        .into());
    }
    Ok(result.embeddings)
}

fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
