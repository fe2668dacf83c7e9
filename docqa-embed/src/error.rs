//! Embedding errors.
//!
//! Ingestion and querying treat every variant as an embedding service failure:
//! fatal to the current request and never retried automatically.

use std::time::Duration;

pub type Result<T> = std::result::Result<T, EmbedError>;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// The model could not be downloaded or loaded
    #[error("failed to load embedding model: {source}")]
    ModelInitialization {
        #[source]
        source: anyhow::Error,
    },

    #[error("embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: anyhow::Error,
    },

    #[error("embedding provider returned {actual} vectors for {expected} texts")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// A thread panicked while holding the shared model
    #[error("embedding model lock poisoned")]
    LockPoisoned,

    #[error("embedding task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl EmbedError {
    pub fn model_init(source: impl Into<anyhow::Error>) -> Self {
        Self::ModelInitialization {
            source: source.into(),
        }
    }

    pub fn embedding_gen(source: impl Into<anyhow::Error>) -> Self {
        Self::EmbeddingGeneration {
            source: source.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether the same request might succeed if tried again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Task(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = EmbedError::invalid_config("batch_size must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid embedding configuration: batch_size must be at least 1"
        );

        let err = EmbedError::embedding_gen(std::io::Error::other("onnx session died"));
        assert!(err.to_string().ends_with("onnx session died"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = EmbedError::Timeout {
            timeout: Duration::from_secs(60),
        };
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "embedding request timed out after 60s");
    }
}
