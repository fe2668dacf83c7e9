//! Storage abstraction for embedded document chunks.
//!
//! This module separates the vector index contract from its SQLite implementation so
//! the ingestion and query pipelines only depend on [`VectorStore`].
//!
//! ## Key Components
//!
//! - **Chunk / EmbeddedChunk**: a located slice of a source document, and the same
//!   slice paired with its vector
//! - **RetrievedResult**: a search hit with its cosine similarity
//! - **VectorStore**: atomic batch insert, ranked search, durable persistence
//!
//! ## Architecture
//!
//! ```text
//! IngestionPipeline ─┐                     ┌─ chunks table (f16 blobs, insertion seq)
//!                    ├─ VectorStore ── SqliteVectorIndex
//! Retriever ─────────┘                     └─ index_metadata / embedding_models
//! ```
//!
//! ## Guarantees
//!
//! - The first successful insert fixes the index dimension; later vectors of another
//!   length are rejected with `DimensionMismatch`.
//! - A batch is stored completely or not at all.
//! - Search results are ordered by descending similarity, ties by insertion order.

use crate::error::IndexError;
use async_trait::async_trait;
use half::f16;
use serde::Serialize;

pub mod metadata;
pub mod sqlite_store;

pub type Result<T> = std::result::Result<T, IndexError>;

/// A bounded slice of one source document. Offsets are characters, `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub source_id: String,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl Chunk {
    /// Build a chunk, deriving its content-addressed id.
    pub fn new(
        source_id: impl Into<String>,
        text: impl Into<String>,
        start: usize,
        end: usize,
    ) -> Self {
        let source_id = source_id.into();
        let text = text.into();
        Self {
            chunk_id: chunk_id(&source_id, start, end, &text),
            source_id,
            text,
            start_offset: start,
            end_offset: end,
        }
    }
}

/// Stable chunk identity: hex blake3 over source, offsets and text.
pub fn chunk_id(source_id: &str, start: usize, end: usize, text: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(&(start as u64).to_le_bytes());
    hasher.update(&(end as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedResult {
    pub chunk: Chunk,
    pub similarity_score: f32,
}

/// Outcome of [`VectorStore::insert_new`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Chunk listing entry without the text.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkSummary {
    pub seq: i64,
    pub chunk_id: String,
    pub source_id: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub char_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: Option<usize>,
    pub embedding_model: Option<String>,
    pub database_size_bytes: Option<u64>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert a batch atomically. Fails with `DimensionMismatch` or `DuplicateChunk`
    /// without storing anything.
    async fn insert(&self, batch: Vec<EmbeddedChunk>) -> Result<()>;

    /// Insert the chunks not already present; report how many were skipped.
    async fn insert_new(&self, batch: Vec<EmbeddedChunk>) -> Result<InsertOutcome>;

    /// Top `k` chunks by cosine similarity to `query`.
    async fn search(&self, query: &[f16], k: usize) -> Result<Vec<RetrievedResult>>;

    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Dimension fixed by the first insert, if any.
    async fn dimension(&self) -> Result<Option<usize>>;

    /// Flush everything to durable storage.
    async fn persist(&self) -> Result<()>;
}

/// Cosine similarity accumulated in f32. Zero for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        let x = x.to_f32();
        let y = y.to_f32();
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
