//! Ingestion: files on disk to embedded chunks in the vector index.
//!
//! ## Pipeline Flow
//!
//! ```text
//! paths → DocumentLoader → ChunkingStrategy → EmbeddingProvider → VectorStore::insert_new
//!   |          |                                    |                   |
//! skipped    failed                              timeout             persist
//! ```
//!
//! Per-file problems (unsupported extension, unreadable or corrupt file) never abort a
//! batch; they are recorded in the [`IngestReport`]. Embedding failures and index errors
//! other than duplicates abort the whole batch before anything is written.

use crate::error::IngestError;
use crate::loader::{DocumentLoader, RawDocument};
use crate::retrieval::chunking_strategy::{ChunkingConfig, ChunkingStrategy};
use crate::storage::{EmbeddedChunk, VectorStore};
use docqa_embed::{EmbeddingProvider, embed_texts_within};
use futures::stream::{self, StreamExt};
use half::f16;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default intake directory, relative to the working directory.
pub const DEFAULT_INTAKE_DIR: &str = "data";

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub chunking: ChunkingConfig,
    /// Upper bound for embedding one sub-batch of `embed_batch_size` chunks
    pub embed_timeout: Duration,
    /// Chunks sent to the embedding provider per call
    pub embed_batch_size: usize,
    /// Files read and extracted concurrently
    pub load_concurrency: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            embed_timeout: Duration::from_secs(60),
            embed_batch_size: 64,
            load_concurrency: 4,
        }
    }
}

impl IngestionConfig {
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_embed_timeout(mut self, embed_timeout: Duration) -> Self {
        self.embed_timeout = embed_timeout;
        self
    }

    pub fn with_embed_batch_size(mut self, embed_batch_size: usize) -> Self {
        self.embed_batch_size = embed_batch_size.max(1);
        self
    }

    pub fn with_load_concurrency(mut self, load_concurrency: usize) -> Self {
        self.load_concurrency = load_concurrency.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileIssue {
    pub path: PathBuf,
    pub reason: String,
}

/// What one call to [`IngestionPipeline::ingest`] did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Documents successfully loaded
    pub num_documents: usize,
    /// Chunks produced from those documents, including ones already indexed
    pub num_chunks: usize,
    pub chunks_inserted: usize,
    pub duplicates_skipped: usize,
    /// Files not attempted (unsupported extension)
    pub skipped: Vec<FileIssue>,
    /// Files that could not be loaded
    pub failed: Vec<FileIssue>,
}

impl IngestReport {
    /// `(num_documents, num_chunks)`
    pub fn counts(&self) -> (usize, usize) {
        (self.num_documents, self.num_chunks)
    }
}

/// Running totals across every batch handled by one pipeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingStats {
    pub batches: usize,
    pub documents_loaded: usize,
    pub chunks_created: usize,
    pub embeddings_generated: usize,
    pub chunks_inserted: usize,
    pub duplicates_skipped: usize,
    pub errors: usize,
}

pub struct IngestionPipeline {
    loader: Arc<dyn DocumentLoader>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorStore>,
    chunking: ChunkingStrategy,
    config: IngestionConfig,
    stats: RwLock<ProcessingStats>,
}

impl IngestionPipeline {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorStore>,
        config: IngestionConfig,
    ) -> Result<Self, IngestError> {
        let chunking = ChunkingStrategy::new(&config.chunking)?;
        Ok(Self {
            loader,
            embedder,
            index,
            chunking,
            config,
            stats: RwLock::new(ProcessingStats::default()),
        })
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    pub async fn stats(&self) -> ProcessingStats {
        self.stats.read().await.clone()
    }

    /// Ingest every regular file directly inside `dir`, in file-name order.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport, IngestError> {
        let intake_err = |source| IngestError::IntakeDir {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(intake_err)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(intake_err)? {
            let file_type = entry.file_type().await.map_err(intake_err)?;
            if file_type.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        debug!("Found {} files in {}", paths.len(), dir.display());
        self.ingest(&paths).await
    }

    pub async fn ingest(&self, paths: &[PathBuf]) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();

        let mut candidates = Vec::new();
        for path in paths {
            if self.loader.can_load(path) {
                candidates.push(path.clone());
            } else {
                warn!("Skipping {}: unsupported document format", path.display());
                report.skipped.push(FileIssue {
                    path: path.clone(),
                    reason: "unsupported document format".to_string(),
                });
            }
        }

        let documents = self.load_all(candidates, &mut report).await;
        report.num_documents = documents.len();
        if documents.is_empty() {
            info!("No documents loaded; index untouched");
            self.record(&report, 0).await;
            return Ok(report);
        }

        let chunks: Vec<_> = documents
            .iter()
            .flat_map(|doc| self.chunking.chunk_document(doc))
            .collect();
        report.num_chunks = chunks.len();
        if chunks.is_empty() {
            info!("Loaded {} documents with no text", documents.len());
            self.record(&report, 0).await;
            return Ok(report);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_all(&texts).await?;
        let generated = vectors.len();

        let batch: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
            .collect();

        let outcome = self.index.insert_new(batch).await?;
        self.index.persist().await?;

        report.chunks_inserted = outcome.inserted;
        report.duplicates_skipped = outcome.duplicates;
        self.record(&report, generated).await;

        info!(
            "Ingested {} documents: {} chunks, {} new, {} already indexed, {} failed, {} skipped",
            report.num_documents,
            report.num_chunks,
            report.chunks_inserted,
            report.duplicates_skipped,
            report.failed.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Embed in sub-batches, each under its own deadline. Nothing is returned unless
    /// every sub-batch succeeds.
    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f16>>, IngestError> {
        let batch_size = self.config.embed_batch_size.max(1);
        let mut vectors = Vec::with_capacity(texts.len());
        for (i, part) in texts.chunks(batch_size).enumerate() {
            let embedded =
                embed_texts_within(self.embedder.as_ref(), part, self.config.embed_timeout)
                    .await?;
            debug!("Embedded sub-batch {} ({} chunks)", i + 1, part.len());
            vectors.extend(embedded.embeddings);
        }
        Ok(vectors)
    }

    async fn load_all(
        &self,
        paths: Vec<PathBuf>,
        report: &mut IngestReport,
    ) -> Vec<RawDocument> {
        let loader = &self.loader;
        // `buffered` keeps results in input order
        let results: Vec<_> = stream::iter(paths)
            .map(|path| async move {
                let result = loader.load(&path).await;
                (path, result)
            })
            .buffered(self.config.load_concurrency)
            .collect()
            .await;

        let mut documents = Vec::with_capacity(results.len());
        for (path, result) in results {
            match result {
                Ok(document) => documents.push(document),
                Err(e) => {
                    warn!("Failed to load {}: {}", path.display(), e);
                    report.failed.push(FileIssue {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }
        documents
    }

    async fn record(&self, report: &IngestReport, embeddings_generated: usize) {
        let mut stats = self.stats.write().await;
        stats.batches += 1;
        stats.documents_loaded += report.num_documents;
        stats.chunks_created += report.num_chunks;
        stats.embeddings_generated += embeddings_generated;
        stats.chunks_inserted += report.chunks_inserted;
        stats.duplicates_skipped += report.duplicates_skipped;
        stats.errors += report.failed.len();
    }
}
