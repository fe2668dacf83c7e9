//! Choosing an [`EmbeddingProvider`] by name.

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::hash::FeatureHashProvider;
use crate::provider::{EmbeddingProvider, FastEmbedProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    /// Local ONNX model through fastembed
    #[default]
    #[serde(rename = "fastembed")]
    FastEmbed,
    /// Offline [`FeatureHashProvider`]
    FeatureHash,
}

impl EmbeddingBackend {
    /// Build a ready-to-use provider. `hash_dimension` only applies to the hashing backend.
    pub async fn build(
        self,
        config: &EmbedConfig,
        hash_dimension: usize,
    ) -> Result<Arc<dyn EmbeddingProvider>> {
        match self {
            Self::FastEmbed => {
                config.validate()?;
                Ok(Arc::new(FastEmbedProvider::create(config.clone()).await?))
            }
            Self::FeatureHash => Ok(Arc::new(FeatureHashProvider::new(hash_dimension)?)),
        }
    }
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FastEmbed => "fastembed",
            Self::FeatureHash => "feature-hash",
        })
    }
}

impl FromStr for EmbeddingBackend {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fastembed" => Ok(Self::FastEmbed),
            "feature-hash" | "hash" => Ok(Self::FeatureHash),
            other => Err(EmbedError::invalid_config(format!(
                "unknown embedding provider '{other}' (expected fastembed or feature-hash)"
            ))),
        }
    }
}
