//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use fastembed::EmbeddingModel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Built-in fastembed models addressable by name, with their output dimension.
const KNOWN_MODELS: &[(&str, usize)] = &[
    ("all-MiniLM-L6-v2", 384),
    ("all-MiniLM-L12-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("nomic-embed-text-v1.5", 768),
];

/// Configuration for local ONNX embedding models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Name of the embedding model to use
    pub model_name: String,
    /// Where fastembed caches downloaded model files (fastembed's default when unset)
    pub cache_dir: Option<PathBuf>,
    /// Maximum batch size for embedding generation
    pub batch_size: usize,
    /// Whether to normalize embeddings to unit length
    pub normalize: bool,
    /// Show a progress bar while a model downloads
    pub show_download_progress: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            cache_dir: None,
            batch_size: 16,
            normalize: true,
            show_download_progress: true,
        }
    }
}

impl EmbedConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Default::default()
        }
    }

    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    pub fn with_cache_dir(self, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
            ..self
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Resolve the configured name to a fastembed model.
    pub fn fastembed_model(&self) -> Result<EmbeddingModel> {
        match self.model_name.as_str() {
            "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
                Ok(EmbeddingModel::AllMiniLML6V2)
            }
            "all-MiniLM-L12-v2" | "sentence-transformers/all-MiniLM-L12-v2" => {
                Ok(EmbeddingModel::AllMiniLML12V2)
            }
            "bge-small-en-v1.5" | "BAAI/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" | "BAAI/bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            "nomic-embed-text-v1.5" | "nomic-ai/nomic-embed-text-v1.5" => {
                Ok(EmbeddingModel::NomicEmbedTextV15)
            }
            other => Err(EmbedError::invalid_config(format!(
                "unknown embedding model {other:?}; expected one of: {}",
                known_model_names().join(", ")
            ))),
        }
    }

    /// Expected output dimension of the configured model, when known up front.
    pub fn expected_dimension(&self) -> Option<usize> {
        let short_name = self.model_name.rsplit('/').next().unwrap_or(&self.model_name);
        KNOWN_MODELS
            .iter()
            .find(|(name, _)| *name == short_name)
            .map(|(_, dim)| *dim)
    }

    /// Check the configuration without loading anything.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be at least 1"));
        }
        self.fastembed_model()?;
        tracing::debug!("Embedding configuration valid for: {}", self.model_name);
        Ok(())
    }
}

/// Names accepted by [`EmbedConfig::fastembed_model`].
pub fn known_model_names() -> Vec<&'static str> {
    KNOWN_MODELS.iter().map(|(name, _)| *name).collect()
}
