//! SQLite-backed [`VectorStore`].
//!
//! An index lives in a directory holding one database file, [`INDEX_FILE_NAME`].
//! Vectors are stored as raw little-endian f16 blobs and scored in memory with
//! [`cosine_similarity`]; a search reads every row in one statement, so it sees either
//! all or none of a concurrent batch.
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE chunks (
//!     seq INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order, breaks score ties
//!     chunk_id TEXT NOT NULL UNIQUE,          -- hex blake3
//!     source_id TEXT NOT NULL,
//!     start_offset INTEGER NOT NULL,          -- character offsets
//!     end_offset INTEGER NOT NULL,
//!     content TEXT NOT NULL,
//!     embedding BLOB NOT NULL,                -- f16 vector
//!     created_at INTEGER NOT NULL
//! );
//!
//! CREATE TABLE index_metadata (               -- exactly one row
//!     id INTEGER PRIMARY KEY CHECK (id = 1),
//!     retriever_version TEXT NOT NULL,
//!     dimension INTEGER,                      -- set by the first insert
//!     embedding_model_id TEXT,
//!     created_at INTEGER NOT NULL,
//!     updated_at INTEGER NOT NULL
//! );
//!
//! CREATE TABLE embedding_models (...);        -- every model ever registered
//! ```
//!
//! Writes are serialised on an async mutex; reads go straight to the pool.

use super::metadata::{EmbeddingModelMetadata, IndexMetadata};
use super::{
    Chunk, ChunkSummary, EmbeddedChunk, IndexStats, InsertOutcome, Result, RetrievedResult,
    VectorStore, cosine_similarity,
};
use crate::error::IndexError;
use async_trait::async_trait;
use half::f16;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// File name of the database inside an index directory.
pub const INDEX_FILE_NAME: &str = "docqa-index.db";

/// Default index directory, relative to the working directory.
pub const DEFAULT_INDEX_DIR: &str = "vectorstore";

#[derive(Debug)]
pub struct SqliteVectorIndex {
    dir: Option<PathBuf>,
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteVectorIndex {
    /// Opens the index in `dir`, creating the directory and database if needed.
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        Self::connect(dir, true).await
    }

    /// Opens an index that must already exist. Used on the query side, where an
    /// empty freshly-created index would only hide a wrong path.
    pub async fn open_existing(dir: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(dir.join(INDEX_FILE_NAME)).await? {
            return Err(IndexError::Unavailable {
                path: dir.to_path_buf(),
            });
        }
        Self::connect(dir, false).await
    }

    async fn connect(dir: &Path, create: bool) -> Result<Self> {
        let db_path = dir.join(INDEX_FILE_NAME);

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(&db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(create)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await?;

        let index = Self {
            dir: Some(dir.to_path_buf()),
            pool,
            write_lock: Mutex::new(()),
        };
        index.create_tables().await?;
        info!("Opened vector index at {}", db_path.display());
        Ok(index)
    }

    /// Non-persistent index for tests and one-off runs.
    pub async fn open_memory() -> Result<Self> {
        // A single, never-recycled connection: each new in-memory connection is a
        // fresh empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;

        let index = Self {
            dir: None,
            pool,
            write_lock: Mutex::new(()),
        };
        index.create_tables().await?;
        Ok(index)
    }

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                chunk_id TEXT NOT NULL UNIQUE,
                source_id TEXT NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source_id ON chunks(source_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_metadata (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                retriever_version TEXT NOT NULL,
                dimension INTEGER,
                embedding_model_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embedding_models (
                model_id TEXT PRIMARY KEY,
                model_name TEXT NOT NULL,
                provider TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                normalized BOOLEAN NOT NULL,
                registered_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let fresh = IndexMetadata::new();
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO index_metadata
                (id, retriever_version, dimension, embedding_model_id, created_at, updated_at)
            VALUES (1, ?, NULL, NULL, ?, ?)
            "#,
        )
        .bind(&fresh.retriever_version)
        .bind(fresh.created_at)
        .bind(fresh.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Directory backing this index, `None` for in-memory indexes.
    pub fn directory(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub async fn metadata(&self) -> Result<IndexMetadata> {
        let row = sqlx::query(
            r#"
            SELECT retriever_version, dimension, embedding_model_id, created_at, updated_at
            FROM index_metadata WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| IndexError::Metadata("index_metadata row is missing".to_string()))?;

        Ok(IndexMetadata {
            retriever_version: row.get("retriever_version"),
            dimension: row
                .get::<Option<i64>, _>("dimension")
                .map(|d| d as usize),
            embedding_model_id: row.get("embedding_model_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Record the embedding model used with this index.
    ///
    /// The first registration becomes the index's model. Registering a different model
    /// later is allowed but logged, because its vectors will not be comparable; if the
    /// dimension differs too, every insert and search will fail with
    /// [`IndexError::DimensionMismatch`].
    pub async fn register_model(&self, model: &EmbeddingModelMetadata) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let model_id = model.model_id();
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO embedding_models
                (model_id, model_name, provider, dimension, normalized, registered_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(model_id) DO NOTHING
            "#,
        )
        .bind(&model_id)
        .bind(&model.model_name)
        .bind(&model.provider)
        .bind(model.dimension as i64)
        .bind(model.normalized)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let row =
            sqlx::query("SELECT dimension, embedding_model_id FROM index_metadata WHERE id = 1")
                .fetch_one(&mut *tx)
                .await?;
        let dimension: Option<i64> = row.get("dimension");
        let recorded: Option<String> = row.get("embedding_model_id");

        if recorded.is_none() {
            sqlx::query(
                "UPDATE index_metadata SET embedding_model_id = ?, updated_at = ? WHERE id = 1",
            )
            .bind(&model_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            debug!("Index model set to {model_id}");
        }
        warn_on_model_mismatch(recorded.as_deref(), dimension.map(|d| d as usize), model);

        tx.commit().await?;
        Ok(())
    }

    /// Compare `model` with the one recorded for this index without writing anything.
    ///
    /// Query paths use this instead of [`register_model`](Self::register_model): a
    /// mismatch is only logged.
    pub async fn check_model(&self, model: &EmbeddingModelMetadata) -> Result<()> {
        let metadata = self.metadata().await?;
        if metadata.embedding_model_id.is_none() {
            debug!("Index has no embedding model recorded yet");
        }
        warn_on_model_mismatch(
            metadata.embedding_model_id.as_deref(),
            metadata.dimension,
            model,
        );
        Ok(())
    }

    pub async fn embedding_models(&self) -> Result<Vec<EmbeddingModelMetadata>> {
        let rows = sqlx::query(
            "SELECT model_name, provider, dimension, normalized FROM embedding_models \
             ORDER BY registered_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                EmbeddingModelMetadata::new(
                    row.get::<String, _>("model_name"),
                    row.get::<String, _>("provider"),
                    row.get::<i64, _>("dimension") as usize,
                )
                .with_normalized(row.get("normalized"))
            })
            .collect())
    }

    pub async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query(
            "SELECT chunk_id, source_id, start_offset, end_offset, content FROM chunks \
             WHERE chunk_id = ?",
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(chunk_from_row))
    }

    /// Chunks in insertion order, optionally restricted to sources starting with
    /// `source_prefix`.
    pub async fn list_chunks(
        &self,
        source_prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChunkSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT seq, chunk_id, source_id, start_offset, end_offset, length(content) AS char_count
            FROM chunks
            WHERE ? IS NULL OR instr(source_id, ?) = 1
            ORDER BY seq
            LIMIT ?
            "#,
        )
        .bind(source_prefix)
        .bind(source_prefix)
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ChunkSummary {
                seq: row.get("seq"),
                chunk_id: row.get("chunk_id"),
                source_id: row.get("source_id"),
                start_offset: row.get::<i64, _>("start_offset") as usize,
                end_offset: row.get::<i64, _>("end_offset") as usize,
                char_count: row.get::<i64, _>("char_count") as usize,
            })
            .collect())
    }

    /// The subset of `chunk_ids` already stored.
    pub async fn contains(&self, chunk_ids: &[String]) -> Result<HashSet<String>> {
        let mut conn = self.pool.acquire().await?;
        existing_ids(&mut conn, chunk_ids).await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS chunks, COUNT(DISTINCT source_id) AS documents FROM chunks",
        )
        .fetch_one(&self.pool)
        .await?;
        let metadata = self.metadata().await?;

        let database_size_bytes = match &self.dir {
            Some(dir) => tokio::fs::metadata(dir.join(INDEX_FILE_NAME))
                .await
                .ok()
                .map(|m| m.len()),
            None => None,
        };

        Ok(IndexStats {
            documents: row.get::<i64, _>("documents") as usize,
            chunks: row.get::<i64, _>("chunks") as usize,
            dimension: metadata.dimension,
            embedding_model: metadata.embedding_model_id,
            database_size_bytes,
        })
    }

    async fn write_batch(
        &self,
        batch: Vec<EmbeddedChunk>,
        skip_existing: bool,
    ) -> Result<InsertOutcome> {
        if batch.is_empty() {
            return Ok(InsertOutcome::default());
        }

        let mut tx = self.pool.begin().await?;

        let established = read_dimension(&mut *tx).await?;
        let expected = established.unwrap_or(batch[0].vector.len());
        if let Some(bad) = batch.iter().find(|item| item.vector.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: bad.vector.len(),
            });
        }

        let ids: Vec<String> = batch.iter().map(|item| item.chunk.chunk_id.clone()).collect();
        let existing = existing_ids(&mut *tx, &ids).await?;

        let mut seen = HashSet::new();
        let mut rejected = Vec::new();
        let mut accepted = Vec::with_capacity(batch.len());
        for item in batch {
            let id = &item.chunk.chunk_id;
            if existing.contains(id) || !seen.insert(id.clone()) {
                rejected.push(id.clone());
            } else {
                accepted.push(item);
            }
        }

        if !rejected.is_empty() && !skip_existing {
            return Err(IndexError::DuplicateChunk {
                chunk_ids: rejected,
            });
        }

        let now = chrono::Utc::now().timestamp();
        for item in &accepted {
            let blob: &[u8] = bytemuck::cast_slice(item.vector.as_slice());
            sqlx::query(
                r#"
                INSERT INTO chunks
                    (chunk_id, source_id, start_offset, end_offset, content, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.chunk.chunk_id)
            .bind(&item.chunk.source_id)
            .bind(item.chunk.start_offset as i64)
            .bind(item.chunk.end_offset as i64)
            .bind(&item.chunk.text)
            .bind(blob)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        if established.is_none() && !accepted.is_empty() {
            sqlx::query("UPDATE index_metadata SET dimension = ?, updated_at = ? WHERE id = 1")
                .bind(expected as i64)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            info!("Index dimension established at {expected}");
        } else {
            sqlx::query("UPDATE index_metadata SET updated_at = ? WHERE id = 1")
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(
            "Stored {} chunks, skipped {} duplicates",
            accepted.len(),
            rejected.len()
        );
        Ok(InsertOutcome {
            inserted: accepted.len(),
            duplicates: rejected.len(),
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorIndex {
    async fn insert(&self, batch: Vec<EmbeddedChunk>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_batch(batch, false).await.map(|_| ())
    }

    async fn insert_new(&self, batch: Vec<EmbeddedChunk>) -> Result<InsertOutcome> {
        let _guard = self.write_lock.lock().await;
        self.write_batch(batch, true).await
    }

    async fn search(&self, query: &[f16], k: usize) -> Result<Vec<RetrievedResult>> {
        let Some(dimension) = self.dimension().await? else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT chunk_id, source_id, start_offset, end_offset, content, embedding \
             FROM chunks ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<RetrievedResult> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector: Vec<f16> = bytemuck::pod_collect_to_vec(blob.as_slice());
                RetrievedResult {
                    similarity_score: cosine_similarity(query, &vector),
                    chunk: chunk_from_row(row),
                }
            })
            .collect();

        // Stable sort over rows already in insertion order keeps ties in that order
        scored.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        let mut conn = self.pool.acquire().await?;
        read_dimension(&mut conn).await
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.dir.is_some() {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                .execute(&self.pool)
                .await?;
            debug!("Checkpointed vector index WAL");
        }
        Ok(())
    }
}

fn chunk_from_row(row: &SqliteRow) -> Chunk {
    Chunk {
        chunk_id: row.get("chunk_id"),
        source_id: row.get("source_id"),
        text: row.get("content"),
        start_offset: row.get::<i64, _>("start_offset") as usize,
        end_offset: row.get::<i64, _>("end_offset") as usize,
    }
}

async fn read_dimension(conn: &mut SqliteConnection) -> Result<Option<usize>> {
    let dimension: Option<Option<i64>> =
        sqlx::query_scalar("SELECT dimension FROM index_metadata WHERE id = 1")
            .fetch_optional(&mut *conn)
            .await?;
    Ok(dimension.flatten().map(|d| d as usize))
}

async fn existing_ids(conn: &mut SqliteConnection, ids: &[String]) -> Result<HashSet<String>> {
    let mut found = HashSet::new();
    for id in ids {
        let hit: Option<i64> = sqlx::query_scalar("SELECT seq FROM chunks WHERE chunk_id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        if hit.is_some() {
            found.insert(id.clone());
        }
    }
    Ok(found)
}

fn warn_on_model_mismatch(
    recorded: Option<&str>,
    dimension: Option<usize>,
    model: &EmbeddingModelMetadata,
) {
    let model_id = model.model_id();
    if let Some(recorded) = recorded.filter(|recorded| *recorded != model_id) {
        warn!("Index was built with embedding model {recorded}, now used with {model_id}");
    }
    if let Some(dimension) = dimension.filter(|d| *d != model.dimension) {
        warn!(
            "Index holds {dimension}-dimensional vectors but {model_id} produces {}; \
             inserts and searches will be rejected",
            model.dimension
        );
    }
}
