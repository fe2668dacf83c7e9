use crate::loader::RawDocument;
use crate::storage::Chunk;
use docqa_context::{ChunkError, DEFAULT_BOUNDARY_LOOKBACK, TextSplitter};
use serde::{Deserialize, Serialize};

/// Configuration for chunking documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum size of each chunk in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
    /// How far back from a hard cut to look for a natural boundary
    pub boundary_lookback: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            boundary_lookback: DEFAULT_BOUNDARY_LOOKBACK,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        }
    }

    pub fn with_boundary_lookback(mut self, boundary_lookback: usize) -> Self {
        self.boundary_lookback = boundary_lookback;
        self
    }
}

/// Turns loaded documents into located [`Chunk`]s.
#[derive(Debug, Clone)]
pub struct ChunkingStrategy {
    splitter: TextSplitter,
}

impl ChunkingStrategy {
    /// Fails when `chunk_overlap >= chunk_size`.
    pub fn new(config: &ChunkingConfig) -> Result<Self, ChunkError> {
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)?
            .with_lookback(config.boundary_lookback);
        Ok(Self { splitter })
    }

    pub fn chunk_document(&self, document: &RawDocument) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = self
            .splitter
            .split(&document.text)
            .into_iter()
            .map(|span| Chunk::new(&document.source_id, span.text, span.start, span.end))
            .collect();

        tracing::debug!(
            "Chunked {} into {} chunks (size {}, overlap {})",
            document.source_id,
            chunks.len(),
            self.splitter.chunk_size(),
            self.splitter.chunk_overlap()
        );

        chunks
    }
}
