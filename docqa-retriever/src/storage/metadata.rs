use docqa_embed::EmbeddingProvider;
use serde::{Deserialize, Serialize};

/// The embedding model an index was (or is about to be) populated with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModelMetadata {
    /// Name of the embedding model (e.g., "all-MiniLM-L6-v2")
    pub model_name: String,
    /// Provider of the embedding model (e.g., "fastembed")
    pub provider: String,
    pub dimension: usize,
    pub normalized: bool,
}

impl EmbeddingModelMetadata {
    pub fn new(
        model_name: impl Into<String>,
        provider: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            provider: provider.into(),
            dimension,
            normalized: false,
        }
    }

    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    pub fn from_provider(provider: &dyn EmbeddingProvider) -> Self {
        Self::new(
            provider.model_name(),
            provider.provider_name(),
            provider.embedding_dimension(),
        )
        .with_normalized(provider.is_normalized())
    }

    /// `provider:model:dimension:norm|raw`, identical to [`EmbeddingProvider::model_id`].
    pub fn model_id(&self) -> String {
        let normalized_part = if self.normalized { "norm" } else { "raw" };
        format!(
            "{}:{}:{}:{}",
            self.provider, self.model_name, self.dimension, normalized_part
        )
    }
}

/// Bookkeeping stored alongside the vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Version of docqa-retriever that created this index
    pub retriever_version: String,
    /// Fixed by the first successful insert
    pub dimension: Option<usize>,
    /// Model id of the first registered embedding model
    pub embedding_model_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl IndexMetadata {
    pub fn new() -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            retriever_version: env!("CARGO_PKG_VERSION").to_string(),
            dimension: None,
            embedding_model_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for IndexMetadata {
    fn default() -> Self {
        Self::new()
    }
}
