//! Persistence for index snapshots.
//!
//! A snapshot is stored and loaded as one unit: the chunk sequence, its vectors
//! and the metadata describing them. Loading never returns a partial snapshot;
//! any disagreement between the parts is reported as
//! [`RetrieverError::IndexCorrupt`](crate::error::RetrieverError::IndexCorrupt).

use crate::error::Result;
use crate::retrieval::snapshot::Snapshot;
use async_trait::async_trait;

pub mod sqlite_store;

pub use sqlite_store::SqliteSnapshotStore;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replaces whatever is stored with `snapshot`.
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// The stored snapshot, or `None` if nothing has been saved.
    async fn load(&self) -> Result<Option<Snapshot>>;

    async fn clear(&self) -> Result<()>;
}
