//! SQLite snapshot storage.
//!
//! ## Database Schema
//!
//! ```sql
//! -- At most one row: the snapshot currently stored
//! CREATE TABLE snapshot_meta (
//!     id INTEGER PRIMARY KEY CHECK (id = 1),
//!     version TEXT NOT NULL,          -- hex blake3 content digest
//!     dimension INTEGER NOT NULL,
//!     entries INTEGER NOT NULL,
//!     embedder TEXT NOT NULL,
//!     built_at TIMESTAMP NOT NULL
//! );
//!
//! CREATE TABLE chunks (
//!     position INTEGER PRIMARY KEY,   -- 0..entries
//!     version TEXT NOT NULL,
//!     document_id TEXT NOT NULL,
//!     page INTEGER NOT NULL,
//!     paragraph INTEGER NOT NULL,
//!     sentence INTEGER NOT NULL,
//!     text TEXT NOT NULL
//! );
//!
//! CREATE TABLE vectors (
//!     position INTEGER PRIMARY KEY REFERENCES chunks(position) ON DELETE CASCADE,
//!     version TEXT NOT NULL,
//!     embedding BLOB NOT NULL         -- native-endian f32 values
//! );
//! ```
//!
//! Saves replace all three tables inside one transaction. Loads check that the
//! tables agree with each other and that the recomputed digest matches the stored
//! version before anything is returned.

use crate::error::{Result, RetrieverError};
use crate::retrieval::snapshot::{Snapshot, SnapshotMeta, snapshot_version};
use crate::retrieval::vector_index::VectorIndex;
use crate::storage::SnapshotStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsift_chunk::Chunk;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DATA_DIR: &str = ".docsift";
pub const DATABASE_FILE: &str = "index.db";

#[derive(Clone, Debug)]
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl SqliteSnapshotStore {
    /// Opens (creating if needed) `<base>/.docsift/index.db`.
    pub async fn open(base: &Path) -> Result<Self> {
        let dir = base.join(DATA_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        let db_path = dir.join(DATABASE_FILE);

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(&db_path)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true),
        )
        .await?;

        let store = Self {
            pool,
            path: Some(db_path),
        };
        store.create_tables().await?;
        tracing::debug!("Opened snapshot store at {}", base.display());
        Ok(store)
    }

    /// A private in-memory database. Everything is lost when the store is dropped.
    pub async fn open_memory() -> Result<Self> {
        let options = "sqlite::memory:"
            .parse::<SqliteConnectOptions>()?
            .foreign_keys(true);

        // each connection to :memory: is its own database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool, path: None };
        store.create_tables().await?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshot_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                entries INTEGER NOT NULL,
                embedder TEXT NOT NULL,
                built_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                position INTEGER PRIMARY KEY,
                version TEXT NOT NULL,
                document_id TEXT NOT NULL,
                page INTEGER NOT NULL,
                paragraph INTEGER NOT NULL,
                sentence INTEGER NOT NULL,
                text TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                position INTEGER PRIMARY KEY REFERENCES chunks(position) ON DELETE CASCADE,
                version TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_meta(&self) -> Result<Option<SnapshotMeta>> {
        let row = sqlx::query(
            "SELECT version, dimension, entries, embedder, built_at FROM snapshot_meta WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(SnapshotMeta {
            version: row.get("version"),
            dimension: to_usize(row.get::<i64, _>("dimension"), "dimension")?,
            entries: to_usize(row.get::<i64, _>("entries"), "entries")?,
            embedder: row.get("embedder"),
            built_at: row.try_get::<DateTime<Utc>, _>("built_at")?,
        }))
    }

    async fn load_chunks(&self, meta: &SnapshotMeta) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT position, version, document_id, page, paragraph, sentence, text
             FROM chunks ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut chunks = Vec::with_capacity(rows.len());
        for (expected, row) in rows.iter().enumerate() {
            let position = to_usize(row.get::<i64, _>("position"), "position")?;
            if position != expected {
                return Err(RetrieverError::corrupt(format!(
                    "chunk positions are not contiguous: expected {expected}, found {position}"
                )));
            }
            check_version(row.get("version"), &meta.version, "chunk", position)?;

            chunks.push(Chunk {
                text: row.get("text"),
                document_id: row.get("document_id"),
                page: to_u32(row.get::<i64, _>("page"), "page")?,
                paragraph: to_u32(row.get::<i64, _>("paragraph"), "paragraph")?,
                sentence: to_u32(row.get::<i64, _>("sentence"), "sentence")?,
                position,
            });
        }
        Ok(chunks)
    }

    async fn load_vectors(&self, meta: &SnapshotMeta) -> Result<Vec<Vec<f32>>> {
        let rows = sqlx::query("SELECT position, version, embedding FROM vectors ORDER BY position")
            .fetch_all(&self.pool)
            .await?;

        let expected_len = meta.dimension * std::mem::size_of::<f32>();
        let mut vectors = Vec::with_capacity(rows.len());
        for (expected, row) in rows.iter().enumerate() {
            let position = to_usize(row.get::<i64, _>("position"), "position")?;
            if position != expected {
                return Err(RetrieverError::corrupt(format!(
                    "vector positions are not contiguous: expected {expected}, found {position}"
                )));
            }
            check_version(row.get("version"), &meta.version, "vector", position)?;

            let blob: Vec<u8> = row.get("embedding");
            if blob.len() != expected_len {
                return Err(RetrieverError::corrupt(format!(
                    "vector {position} is {} bytes, expected {expected_len}",
                    blob.len()
                )));
            }
            // blobs carry no alignment guarantee, so copy instead of casting in place
            vectors.push(bytemuck::pod_collect_to_vec::<u8, f32>(&blob));
        }
        Ok(vectors)
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let meta = &snapshot.meta;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM vectors").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM snapshot_meta").execute(&mut *tx).await?;

        sqlx::query(
            "INSERT INTO snapshot_meta (id, version, dimension, entries, embedder, built_at)
             VALUES (1, ?, ?, ?, ?, ?)",
        )
        .bind(&meta.version)
        .bind(meta.dimension as i64)
        .bind(meta.entries as i64)
        .bind(&meta.embedder)
        .bind(meta.built_at)
        .execute(&mut *tx)
        .await?;

        for (chunk, vector) in snapshot.index.chunks().iter().zip(snapshot.index.vectors()) {
            sqlx::query(
                "INSERT INTO chunks (position, version, document_id, page, paragraph, sentence, text)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(chunk.position as i64)
            .bind(&meta.version)
            .bind(&chunk.document_id)
            .bind(i64::from(chunk.page))
            .bind(i64::from(chunk.paragraph))
            .bind(i64::from(chunk.sentence))
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO vectors (position, version, embedding) VALUES (?, ?, ?)")
                .bind(chunk.position as i64)
                .bind(&meta.version)
                .bind(bytemuck::cast_slice::<f32, u8>(vector))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(
            "Saved snapshot {} with {} entries",
            meta.version,
            meta.entries
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<Snapshot>> {
        let meta = self.load_meta().await?;

        let Some(meta) = meta else {
            let orphans = self.count("chunks").await? + self.count("vectors").await?;
            if orphans > 0 {
                return Err(RetrieverError::corrupt(
                    "chunk or vector rows exist without snapshot metadata",
                ));
            }
            return Ok(None);
        };

        let chunks = self.load_chunks(&meta).await?;
        let vectors = self.load_vectors(&meta).await?;

        if chunks.len() != meta.entries || vectors.len() != meta.entries {
            return Err(RetrieverError::corrupt(format!(
                "metadata lists {} entries but found {} chunks and {} vectors",
                meta.entries,
                chunks.len(),
                vectors.len()
            )));
        }

        let index = VectorIndex::from_parts(chunks, vectors)
            .map_err(|e| RetrieverError::corrupt(e.to_string()))?;

        let digest = snapshot_version(&index);
        if digest != meta.version {
            return Err(RetrieverError::corrupt(format!(
                "content digest {digest} does not match stored version {}",
                meta.version
            )));
        }

        tracing::info!("Loaded snapshot {} with {} entries", meta.version, meta.entries);
        Ok(Some(Snapshot { meta, index }))
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM vectors").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM snapshot_meta").execute(&mut *tx).await?;
        tx.commit().await?;
        tracing::info!("Cleared stored snapshot");
        Ok(())
    }
}

fn check_version(found: String, expected: &str, what: &str, position: usize) -> Result<()> {
    if found != expected {
        return Err(RetrieverError::corrupt(format!(
            "{what} {position} belongs to snapshot {found}, expected {expected}"
        )));
    }
    Ok(())
}

fn to_usize(value: i64, column: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| RetrieverError::corrupt(format!("negative {column}: {value}")))
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| RetrieverError::corrupt(format!("{column} out of range: {value}")))
}
