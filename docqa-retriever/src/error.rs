//! Error types for loading documents, the vector index and ingestion.

use std::path::PathBuf;

/// Why a single file could not be turned into a [`RawDocument`](crate::loader::RawDocument).
///
/// Ingestion treats every variant as "skip this file and report it".
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unsupported document format: {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8 text")]
    Encoding {
        path: PathBuf,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("{path} is corrupt or unreadable: {message}")]
    Corrupt { path: PathBuf, message: String },
}

impl LoadError {
    pub fn corrupt(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::UnsupportedFormat { path }
            | Self::Io { path, .. }
            | Self::Encoding { path, .. }
            | Self::Corrupt { path, .. } => path,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedFormat { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A vector's length disagrees with the dimension the index was built with.
    #[error("vector dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// One or more chunk ids are already stored, or repeated within the batch.
    #[error("duplicate chunk ids: {}", chunk_ids.join(", "))]
    DuplicateChunk { chunk_ids: Vec<String> },

    /// No persisted index exists where one was expected.
    #[error("no vector index found at {path}")]
    Unavailable { path: PathBuf },

    #[error("index metadata is corrupt: {0}")]
    Metadata(String),

    #[error("index storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures that abort a whole ingestion batch.
///
/// Per-file problems are not errors at this level; they are collected in the
/// [`IngestReport`](crate::retrieval::ingestion::IngestReport).
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Chunking(#[from] docqa_context::ChunkError),

    #[error("embedding service error: {0}")]
    Embedding(#[from] docqa_embed::EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("failed to read intake directory {path}: {source}")]
    IntakeDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
