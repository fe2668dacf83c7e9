//! docqa-retriever: document ingestion and vector retrieval
//!
//! This crate turns PDF, plain-text and Word documents into embedded chunks, stores them
//! in a persistent SQLite vector index, and answers nearest-neighbour queries over them.
//!
//! ## Key Modules
//!
//! - **[`loader`]**: format detection and text extraction
//! - **[`retrieval`]**: chunking, the ingestion pipeline and the top-k retriever
//! - **[`storage`]**: the [`VectorStore`](storage::VectorStore) trait and its SQLite index
//! - **[`error`]**: load, index and ingestion errors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docqa_embed::FeatureHashProvider;
//! use docqa_retriever::loader::FileLoader;
//! use docqa_retriever::retrieval::ingestion::{IngestionConfig, IngestionPipeline};
//! use docqa_retriever::storage::sqlite_store::SqliteVectorIndex;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let index = Arc::new(SqliteVectorIndex::open(Path::new("vectorstore")).await?);
//! let pipeline = IngestionPipeline::new(
//!     Arc::new(FileLoader),
//!     Arc::new(FeatureHashProvider::default()),
//!     index,
//!     IngestionConfig::default(),
//! )?;
//! let report = pipeline.ingest_directory(Path::new("data")).await?;
//! println!("{:?}", report.counts());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Files → Loader → ChunkingStrategy → EmbeddingProvider → SqliteVectorIndex
//!                                                               ↓
//!                                    question vector → Retriever (top-k)
//! ```

pub mod error;
pub mod loader;
pub mod retrieval;
pub mod storage;

pub use error::{IndexError, IngestError, LoadError};
