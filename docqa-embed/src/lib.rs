//! # docqa-embed
//!
//! Text embeddings for the document question-answering pipeline. One provider
//! instance embeds both the document chunks at ingestion time and the questions
//! at query time, so both live in the same vector space.
//!
//! ## Features
//!
//! - **Local ONNX Models**: run sentence-embedding models locally through FastEmbed
//!   (default `all-MiniLM-L6-v2`, 384 dimensions)
//! - **Offline Hashing Provider**: a deterministic feature-hashing embedder that needs
//!   no model files at all
//! - **Async-First Design**: blocking inference runs on tokio's blocking pool
//! - **Caller Deadlines**: [`embed_texts_within`] bounds every call with a timeout
//! - **Half-Precision**: f16 vectors to halve index size
//!
//! ## Quick Start
//!
//! ```no_run
//! use docqa_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}",
//!          result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`backend`]: picking a provider by name
//! - [`config`]: model selection and batching
//! - [`provider`]: the [`EmbeddingProvider`] trait, timeouts and the FastEmbed provider
//! - [`hash`]: the offline [`FeatureHashProvider`]
//! - [`error`]: error types and result handling

pub mod backend;
pub mod config;
pub mod error;
pub mod hash;
pub mod provider;

// Re-export main types for easy access
pub use backend::EmbeddingBackend;
pub use config::{DEFAULT_MODEL_NAME, EmbedConfig, known_model_names};
pub use error::{EmbedError, Result};
pub use hash::FeatureHashProvider;
pub use provider::{
    EmbeddingProvider, EmbeddingResult, FastEmbedProvider, embed_text_within, embed_texts_within,
};
