use crate::config::{ConfigError, DocqaConfig};
use crate::generator::{self, AnswerGenerator};
use crate::query::{AnswerRecord, QueryError, QueryOptions, QueryPipeline};
use docqa_embed::{EmbedError, EmbeddingProvider};
use docqa_retriever::loader::FileLoader;
use docqa_retriever::retrieval::ingestion::{IngestReport, IngestionPipeline};
use docqa_retriever::retrieval::retriever::Retriever;
use docqa_retriever::storage::metadata::EmbeddingModelMetadata;
use docqa_retriever::storage::sqlite_store::SqliteVectorIndex;
use docqa_retriever::storage::{IndexStats, VectorStore};
use docqa_retriever::{IndexError, IngestError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start embedding provider: {0}")]
    Embedding(#[from] EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// How [`RagService::open`] treats a missing index directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAccess {
    /// Create an empty index (ingestion)
    CreateIfMissing,
    /// Fail with [`IndexError::Unavailable`] (querying)
    ExistingOnly,
}

/// The index, embedding provider and generator shared by ingestion and querying.
///
/// Built once per process and handed around explicitly.
pub struct RagService {
    config: DocqaConfig,
    index: Arc<SqliteVectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn AnswerGenerator>,
    ingestion: IngestionPipeline,
    query: QueryPipeline,
}

impl RagService {
    pub async fn open(config: DocqaConfig, access: IndexAccess) -> Result<Self, ServiceError> {
        config.validate()?;

        let index_dir = &config.paths.index_dir;
        let index = match access {
            IndexAccess::CreateIfMissing => SqliteVectorIndex::open(index_dir).await?,
            IndexAccess::ExistingOnly => SqliteVectorIndex::open_existing(index_dir).await?,
        };

        let embedder = config
            .embedding
            .provider
            .build(&config.embedding.embed_config(), config.embedding.dimension)
            .await?;
        let generator = generator::from_config(&config.generation);

        let service = Self::from_parts(config, Arc::new(index), embedder, generator).await?;
        if access == IndexAccess::CreateIfMissing {
            service.register_model().await?;
        }
        Ok(service)
    }

    /// Assemble a service from already-built parts.
    ///
    /// Only compares the embedder with the index's recorded model; the model is
    /// registered when documents are ingested.
    pub async fn from_parts(
        config: DocqaConfig,
        index: Arc<SqliteVectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        index
            .check_model(&EmbeddingModelMetadata::from_provider(embedder.as_ref()))
            .await?;

        let ingestion = IngestionPipeline::new(
            Arc::new(FileLoader),
            embedder.clone(),
            index.clone(),
            config.ingestion_config(),
        )?;

        let query = QueryPipeline::new(
            embedder.clone(),
            Retriever::new(index.clone(), config.query.top_k),
            config.strategy()?.build(config.query.max_context_chars),
            generator.clone(),
            QueryOptions {
                generation: config.generation.params(),
                embed_timeout: config.embedding.timeout(),
                generation_timeout: config.generation.timeout(),
                snippet_chars: config.query.snippet_chars,
            },
        );

        info!(
            "Service ready: embedder {}, generator {}, top_k {}",
            embedder.model_id(),
            generator.name(),
            config.query.top_k
        );

        Ok(Self {
            config,
            index,
            embedder,
            generator,
            ingestion,
            query,
        })
    }

    pub fn config(&self) -> &DocqaConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<SqliteVectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn generator(&self) -> &Arc<dyn AnswerGenerator> {
        &self.generator
    }

    async fn register_model(&self) -> Result<(), ServiceError> {
        let model = EmbeddingModelMetadata::from_provider(self.embedder.as_ref());
        Ok(self.index.register_model(&model).await?)
    }

    pub async fn ingest(&self, paths: &[PathBuf]) -> Result<IngestReport, ServiceError> {
        self.register_model().await?;
        Ok(self.ingestion.ingest(paths).await?)
    }

    /// Ingest everything in the configured intake directory.
    pub async fn ingest_intake(&self) -> Result<IngestReport, ServiceError> {
        self.register_model().await?;
        Ok(self
            .ingestion
            .ingest_directory(&self.config.paths.intake_dir)
            .await?)
    }

    pub async fn answer(&self, question: &str) -> Result<AnswerRecord, QueryError> {
        self.query.answer(question).await
    }

    pub async fn stats(&self) -> Result<IndexStats, ServiceError> {
        Ok(self.index.stats().await?)
    }

    pub async fn is_empty(&self) -> Result<bool, ServiceError> {
        Ok(self.index.is_empty().await?)
    }
}
