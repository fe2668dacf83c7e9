//! The [`EmbeddingProvider`] seam, deadline helpers and the fastembed provider.

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};
use half::f16;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

/// Vectors for a batch of texts, in input order.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub embeddings: Vec<Vec<f16>>,
    pub dimension: usize,
}

impl EmbeddingResult {
    /// `dimension` is the length of the first vector, 0 for an empty batch.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map_or(0, Vec::len);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Model session and its measured output dimension.
type LoadedModel = (Arc<Mutex<TextEmbedding>>, usize);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ModelKey {
    model_name: String,
    cache_dir: Option<PathBuf>,
}

/// Every provider for the same model and cache directory shares one session.
static LOADED_MODELS: OnceLock<Mutex<HashMap<ModelKey, LoadedModel>>> = OnceLock::new();

fn loaded_models() -> Result<MutexGuard<'static, HashMap<ModelKey, LoadedModel>>> {
    LOADED_MODELS
        .get_or_init(Default::default)
        .lock()
        .map_err(|_| EmbedError::LockPoisoned)
}

/// Trait for embedding providers that can generate embeddings from text.
///
/// The same provider instance must serve both ingestion and querying; vectors
/// from different providers are not comparable.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;

    /// Name of the model behind this provider
    fn model_name(&self) -> &str;

    /// Whether produced vectors have unit length
    fn is_normalized(&self) -> bool {
        true
    }

    /// Stable identity of the vector space, e.g. `fastembed:all-MiniLM-L6-v2:384:norm`.
    fn model_id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.provider_name(),
            self.model_name(),
            self.embedding_dimension(),
            if self.is_normalized() { "norm" } else { "raw" }
        )
    }
}

/// Embed a batch, failing with [`EmbedError::Timeout`] once `timeout` elapses.
///
/// Also checks that exactly one vector came back per input text.
pub async fn embed_texts_within(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    timeout: Duration,
) -> Result<EmbeddingResult> {
    let result = tokio::time::timeout(timeout, provider.embed_texts(texts))
        .await
        .map_err(|_| EmbedError::Timeout { timeout })??;

    if result.len() != texts.len() {
        return Err(EmbedError::CountMismatch {
            expected: texts.len(),
            actual: result.len(),
        });
    }
    Ok(result)
}

/// Embed one text, failing with [`EmbedError::Timeout`] once `timeout` elapses.
pub async fn embed_text_within(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f16>> {
    tokio::time::timeout(timeout, provider.embed_text(text))
        .await
        .map_err(|_| EmbedError::Timeout { timeout })?
}

/// Convert an f32 vector to f16, optionally scaling it to unit length first.
pub(crate) fn to_f16_vector(values: &[f32], normalize: bool) -> Vec<f16> {
    let norm = if normalize {
        values.iter().map(|x| x * x).sum::<f32>().sqrt()
    } else {
        0.0
    };

    if norm > 0.0 {
        values.iter().map(|v| f16::from_f32(v / norm)).collect()
    } else {
        values.iter().copied().map(f16::from_f32).collect()
    }
}

/// FastEmbed-based embedding provider using local ONNX models
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Option<Arc<Mutex<TextEmbedding>>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Creates a new uninitialized provider. Call [`initialize`](Self::initialize)
    /// (or use [`create`](Self::create)) before embedding.
    pub fn new(config: EmbedConfig) -> Self {
        let dimension = config.expected_dimension().unwrap_or(384);
        Self {
            config,
            model: None,
            dimension,
        }
    }

    /// Load the model, or attach to the copy another provider already loaded.
    pub async fn initialize(&mut self) -> Result<()> {
        self.config.validate()?;
        let key = self.model_key();

        let loaded = loaded_models()?
            .get(&key)
            .map(|(model, dim)| (Arc::clone(model), *dim));
        if let Some((model, dimension)) = loaded {
            tracing::debug!("Reusing loaded model {}", key.model_name);
            self.model = Some(model);
            self.dimension = dimension;
            return Ok(());
        }

        let config = self.config.clone();
        let (model, dimension) = tokio::task::spawn_blocking(move || load_model(&config)).await??;

        let model = Arc::new(Mutex::new(model));
        loaded_models()?.insert(key, (Arc::clone(&model), dimension));
        self.model = Some(model);
        self.dimension = dimension;
        Ok(())
    }

    /// Creates and initializes a provider in one step.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut provider = Self::new(config);
        provider.initialize().await?;
        Ok(provider)
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    fn model_key(&self) -> ModelKey {
        ModelKey {
            model_name: self.config.model_name().to_string(),
            cache_dir: self.config.cache_dir.clone(),
        }
    }
}

/// Blocking: downloads the model on first use, then measures its output size.
fn load_model(config: &EmbedConfig) -> Result<(TextEmbedding, usize)> {
    tracing::info!("Loading embedding model {}", config.model_name());

    let mut options = InitOptions::new(config.fastembed_model()?)
        .with_show_download_progress(config.show_download_progress);
    if let Some(cache_dir) = &config.cache_dir {
        options = options.with_cache_dir(cache_dir.clone());
    }
    let mut model = TextEmbedding::try_new(options).map_err(EmbedError::model_init)?;

    let probe = model
        .embed(vec!["dimension probe".to_string()], None)
        .map_err(EmbedError::model_init)?;
    let dimension = probe.first().map_or(0, Vec::len);
    if dimension == 0 {
        return Err(EmbedError::invalid_config(format!(
            "model {} produced an empty embedding",
            config.model_name()
        )));
    }

    tracing::info!("Loaded {} ({dimension} dimensions)", config.model_name());
    Ok((model, dimension))
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbedError::CountMismatch {
                expected: 1,
                actual: 0,
            })
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(Vec::new()));
        }
        let model = match &self.model {
            Some(model) => Arc::clone(model),
            None => {
                return Err(EmbedError::invalid_config(
                    "fastembed model is not loaded; use FastEmbedProvider::create",
                ));
            }
        };

        let texts = texts.to_vec();
        let batch_size = self.config.batch_size.max(1);
        let normalize = self.config.normalize;

        // One lock for the whole request keeps its batches together
        let embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f16>>> {
            let mut model = model.lock().map_err(|_| EmbedError::LockPoisoned)?;
            let mut out = Vec::with_capacity(texts.len());
            for batch in texts.chunks(batch_size) {
                let raw = model
                    .embed(batch.to_vec(), None)
                    .map_err(EmbedError::embedding_gen)?;
                out.extend(raw.iter().map(|v| to_f16_vector(v, normalize)));
            }
            Ok(out)
        })
        .await??;

        tracing::debug!("Embedded {} texts", embeddings.len());
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model_name(&self) -> &str {
        self.config.model_name()
    }

    fn is_normalized(&self) -> bool {
        self.config.normalize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Never answers; used to exercise timeouts.
    struct StalledProvider;

    #[async_trait]
    impl EmbeddingProvider for StalledProvider {
        async fn embed_text(&self, _text: &str) -> Result<Vec<f16>> {
            std::future::pending().await
        }

        async fn embed_texts(&self, _texts: &[String]) -> Result<EmbeddingResult> {
            std::future::pending().await
        }

        fn embedding_dimension(&self) -> usize {
            3
        }

        fn provider_name(&self) -> &str {
            "stalled"
        }

        fn model_name(&self) -> &str {
            "none"
        }
    }

    /// Drops one vector from every batch.
    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        async fn embed_text(&self, _text: &str) -> Result<Vec<f16>> {
            Ok(vec![f16::ONE])
        }

        async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
            Ok(EmbeddingResult::new(vec![
                vec![f16::ONE];
                texts.len().saturating_sub(1)
            ]))
        }

        fn embedding_dimension(&self) -> usize {
            1
        }

        fn provider_name(&self) -> &str {
            "short"
        }

        fn model_name(&self) -> &str {
            "none"
        }

        fn is_normalized(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_embedding_result() {
        let embeddings = vec![
            vec![f16::from_f32(0.1), f16::from_f32(0.2), f16::from_f32(0.3)],
            vec![f16::from_f32(0.4), f16::from_f32(0.5), f16::from_f32(0.6)],
        ];
        let result = EmbeddingResult::new(embeddings);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());
        assert_eq!(EmbeddingResult::new(vec![]).dimension, 0);
    }

    #[test]
    fn test_fastembed_provider_creation() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());

        assert_eq!(provider.provider_name(), "fastembed");
        assert_eq!(provider.embedding_dimension(), 384);
        assert_eq!(provider.model_id(), "fastembed:all-MiniLM-L6-v2:384:norm");
    }

    #[test]
    fn test_to_f16_vector_normalizes() {
        let v = to_f16_vector(&[3.0, 4.0], true);
        assert!((v[0].to_f32() - 0.6).abs() < 1e-3);
        assert!((v[1].to_f32() - 0.8).abs() < 1e-3);

        let raw = to_f16_vector(&[3.0, 4.0], false);
        assert_eq!(raw[0].to_f32(), 3.0);

        let zero = to_f16_vector(&[0.0, 0.0], true);
        assert!(zero.iter().all(|x| x.to_f32() == 0.0));
    }

    #[tokio::test]
    async fn test_uninitialized_provider_errors() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());
        let err = provider
            .embed_texts(&["hello".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));

        let empty = provider.embed_texts(&[]).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let timeout = Duration::from_millis(20);
        let err = embed_texts_within(&StalledProvider, &["q".to_string()], timeout)
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::Timeout { timeout: t } if t == timeout));
        assert!(err.is_transient());

        let err = embed_text_within(&StalledProvider, "q", timeout)
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_count_mismatch_is_reported() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = embed_texts_within(&ShortProvider, &texts, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EmbedError::CountMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(ShortProvider.model_id(), "short:none:1:raw");
    }

    #[test]
    fn test_model_key_ignores_batching() {
        let a = FastEmbedProvider::new(EmbedConfig::default()).model_key();
        let b = FastEmbedProvider::new(EmbedConfig::default().with_batch_size(4)).model_key();
        let c = FastEmbedProvider::new(EmbedConfig::new("bge-small-en-v1.5")).model_key();
        let d = FastEmbedProvider::new(EmbedConfig::default().with_cache_dir("/tmp/models"))
            .model_key();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[tokio::test]
    #[ignore] // Downloads all-MiniLM-L6-v2; run with: cargo test -p docqa-embed -- --ignored
    async fn test_minilm_download_and_embedding() -> Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();

        let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
        assert_eq!(provider.embedding_dimension(), 384);
        assert!(provider.is_initialized());

        let texts = vec![
            "Machine learning models process natural language efficiently.".to_string(),
            "Deep neural networks enable semantic understanding of text.".to_string(),
            "The recipe calls for two cups of flour.".to_string(),
        ];
        let result = provider.embed_texts(&texts).await?;
        assert_eq!(result.len(), 3);
        assert_eq!(result.dimension, 384);

        let dot = |a: &[f16], b: &[f16]| -> f32 {
            a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum()
        };
        let related = dot(&result.embeddings[0], &result.embeddings[1]);
        let unrelated = dot(&result.embeddings[0], &result.embeddings[2]);
        assert!(related > unrelated, "{related} <= {unrelated}");

        Ok(())
    }
}
