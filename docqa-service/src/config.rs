//! `docqa.toml` configuration.
//!
//! Every section and field is optional; a missing file means all defaults.
//!
//! ```toml
//! [paths]
//! intake_dir = "data"
//! index_dir = "vectorstore"
//!
//! [chunking]
//! chunk_size = 500
//! chunk_overlap = 50
//!
//! [embedding]
//! provider = "fastembed"        # or "feature-hash"
//! model = "all-MiniLM-L6-v2"
//! timeout_secs = 60
//!
//! [generation]
//! backend = "http"              # or "extractive"
//! endpoint = "http://localhost:11434"
//! model = "falcon:7b-instruct"
//! max_tokens = 200
//! temperature = 0.0
//!
//! [query]
//! top_k = 3
//! strategy = "stuff"
//! ```

use crate::generator::GenerationParams;
use docqa_context::{AssemblyError, AssemblyStrategy};
use docqa_embed::{EmbedConfig, EmbeddingBackend, FeatureHashProvider};
use docqa_retriever::retrieval::chunking_strategy::ChunkingConfig;
use docqa_retriever::retrieval::ingestion::{DEFAULT_INTAKE_DIR, IngestionConfig};
use docqa_retriever::storage::sqlite_store::DEFAULT_INDEX_DIR;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File read when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "docqa.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid context strategy: {0}")]
    Strategy(#[from] AssemblyError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocqaConfig {
    pub paths: PathsConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Uploaded documents waiting to be ingested
    pub intake_dir: PathBuf,
    /// Directory holding the persisted vector index
    pub index_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            intake_dir: PathBuf::from(DEFAULT_INTAKE_DIR),
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    /// fastembed model name
    pub model: String,
    /// Vector size of the feature-hash provider
    pub dimension: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::default(),
            model: docqa_embed::DEFAULT_MODEL_NAME.to_string(),
            dimension: FeatureHashProvider::DEFAULT_DIMENSION,
            batch_size: 16,
            timeout_secs: 60,
            cache_dir: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn embed_config(&self) -> EmbedConfig {
        let config = EmbedConfig::new(&self.model).with_batch_size(self.batch_size);
        match &self.cache_dir {
            Some(dir) => config.with_cache_dir(dir),
            None => config,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    /// Ollama-compatible `/api/generate` endpoint
    #[default]
    Http,
    /// Offline answers quoted from the context
    Extractive,
}

impl std::str::FromStr for GeneratorBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "extractive" => Ok(Self::Extractive),
            other => Err(ConfigError::Invalid(format!(
                "unknown generator backend '{other}' (expected http or extractive)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub backend: GeneratorBackend,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::default(),
            endpoint: "http://localhost:11434".to_string(),
            model: "falcon:7b-instruct".to_string(),
            max_tokens: 200,
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

impl GenerationConfig {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub top_k: usize,
    /// Characters of chunk text shown per source
    pub snippet_chars: usize,
    pub max_context_chars: usize,
    pub strategy: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            snippet_chars: 200,
            max_context_chars: 4000,
            strategy: AssemblyStrategy::Stuff.to_string(),
        }
    }
}

impl DocqaConfig {
    /// Load `path`, or [`DEFAULT_CONFIG_FILE`] when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!("No {} found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        let config: Self =
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        config.validate()?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be at least 1".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.query.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.embedding.provider == EmbeddingBackend::FeatureHash && self.embedding.dimension == 0
        {
            return Err(ConfigError::Invalid("embedding dimension must be at least 1".into()));
        }
        if self.embedding.timeout_secs == 0 || self.generation.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least one second".into()));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature {} is outside 0.0..=2.0",
                self.generation.temperature
            )));
        }
        self.strategy()?;
        Ok(())
    }

    pub fn strategy(&self) -> Result<AssemblyStrategy, ConfigError> {
        Ok(self.query.strategy.parse()?)
    }

    pub fn ingestion_config(&self) -> IngestionConfig {
        IngestionConfig::default()
            .with_chunking(self.chunking.clone())
            .with_embed_timeout(self.embedding.timeout())
            .with_embed_batch_size(self.embedding.batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    #[test]
    fn test_defaults() {
        let config = DocqaConfig::default();
        assert_eq!(config.paths.intake_dir, PathBuf::from("data"));
        assert_eq!(config.paths.index_dir, PathBuf::from("vectorstore"));
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.query.top_k, 3);
        assert_eq!(config.query.max_context_chars, 4000);
        assert_eq!(config.generation.max_tokens, 200);
        assert_eq!(config.generation.temperature, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: DocqaConfig = toml::from_str(
            r#"
            [embedding]
            provider = "feature-hash"
            dimension = 128

            [generation]
            backend = "extractive"

            [query]
            top_k = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.embedding.provider, EmbeddingBackend::FeatureHash);
        assert_eq!(config.embedding.dimension, 128);
        assert_eq!(config.generation.backend, GeneratorBackend::Extractive);
        assert_eq!(config.query.top_k, 5);
        assert_eq!(config.query.snippet_chars, 200);
        assert_eq!(config.chunking.chunk_size, 500);
    }

    #[test]
    fn test_validation() {
        let mut config = DocqaConfig::default();
        config.chunking.chunk_overlap = 500;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = DocqaConfig::default();
        config.query.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = DocqaConfig::default();
        config.query.strategy = "map-reduce".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Strategy(AssemblyError::Unsupported(_)))
        ));

        config.query.strategy = "summarize-everything".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Strategy(AssemblyError::Unknown(_)))
        ));
    }

    #[test]
    fn test_load_files() -> anyhow::Result<()> {
        let dir = tempdir()?;

        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            DocqaConfig::load(Some(&missing)),
            Err(ConfigError::Io { .. })
        ));

        let path = dir.path().join("docqa.toml");
        std::fs::write(&path, "[paths]\nindex_dir = \"/srv/index\"\n")?;
        let config = DocqaConfig::load(Some(&path))?;
        assert_eq!(config.paths.index_dir, PathBuf::from("/srv/index"));
        assert_eq!(config.paths.intake_dir, PathBuf::from("data"));

        std::fs::write(&path, "[chunking]\nchunk_size = \"big\"\n")?;
        assert!(matches!(
            DocqaConfig::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
        Ok(())
    }

    #[test]
    #[traced_test]
    fn test_load_logs_source() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[query]\ntop_k = 4\n")?;

        let config = DocqaConfig::load(Some(&path))?;
        assert_eq!(config.query.top_k, 4);
        assert!(logs_contain("Loaded configuration from"));
        Ok(())
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("HTTP".parse::<GeneratorBackend>().unwrap(), GeneratorBackend::Http);
        assert!("gpt".parse::<GeneratorBackend>().is_err());
    }
}
