//! Versioned index snapshots and their publication.
//!
//! A [`Snapshot`] is a complete, immutable index plus the metadata that is
//! persisted with it. [`PublishedIndex`] holds the snapshot queries currently
//! read. Writers build a whole new snapshot off to the side and swap it in;
//! readers that already cloned the previous `Arc` keep using it until they finish.

use crate::retrieval::vector_index::VectorIndex;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotMeta {
    /// Hex blake3 digest over every chunk and vector
    pub version: String,
    pub dimension: usize,
    pub entries: usize,
    /// Name of the provider that produced the vectors
    pub embedder: String,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub index: VectorIndex,
}

impl Snapshot {
    /// Wraps `index`, stamping it with its digest and the current time.
    pub fn new(index: VectorIndex, embedder: &str) -> Self {
        Self::with_built_at(index, embedder, Utc::now())
    }

    pub fn with_built_at(index: VectorIndex, embedder: &str, built_at: DateTime<Utc>) -> Self {
        let meta = SnapshotMeta {
            version: snapshot_version(&index),
            dimension: index.dimension(),
            entries: index.len(),
            embedder: embedder.to_string(),
            built_at,
        };
        Self { meta, index }
    }
}

/// Content digest of an index. Any change to a chunk field or a vector changes it.
pub fn snapshot_version(index: &VectorIndex) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(index.dimension() as u64).to_le_bytes());

    for (chunk, vector) in index.chunks().iter().zip(index.vectors()) {
        hasher.update(&(chunk.position as u64).to_le_bytes());
        update_str(&mut hasher, &chunk.document_id);
        hasher.update(&chunk.page.to_le_bytes());
        hasher.update(&chunk.paragraph.to_le_bytes());
        hasher.update(&chunk.sentence.to_le_bytes());
        update_str(&mut hasher, &chunk.text);
        hasher.update(bytemuck::cast_slice::<f32, u8>(vector));
    }

    hex::encode(hasher.finalize().as_bytes())
}

// Length prefix keeps ("ab", "c") and ("a", "bc") apart.
fn update_str(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// The current snapshot plus the lock that serializes writers.
#[derive(Debug, Default)]
pub struct PublishedIndex {
    current: RwLock<Option<Arc<Snapshot>>>,
    writer: Mutex<()>,
}

impl PublishedIndex {
    /// Starts with nothing published.
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot queries should read, if any.
    pub async fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().await.clone()
    }

    /// Makes `snapshot` current. Readers holding the previous one are unaffected.
    pub async fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write().await = Some(Arc::clone(&snapshot));
        tracing::debug!(
            "Published snapshot {} ({} entries)",
            snapshot.meta.version,
            snapshot.meta.entries
        );
        snapshot
    }

    /// Leaves nothing published; later reads see `None`.
    pub async fn unpublish(&self) {
        *self.current.write().await = None;
    }

    /// Serializes rebuilds. Hold the guard from reading the current snapshot
    /// until the replacement is published.
    pub async fn begin_write(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }
}
