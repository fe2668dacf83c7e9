//! # docqa-service
//!
//! Question answering over a private document collection. This crate ties the
//! lower layers together:
//! - [`docqa-retriever`] loads documents, stores chunk vectors and runs ingestion
//! - [`docqa-embed`] embeds chunks and questions with one shared provider
//! - [`docqa-context`] chunks text and assembles the retrieved context
//!
//! and adds the answer generator, the query pipeline and the `docqa` front-end.
//!
//! ## Quick Start
//!
//! ```bash
//! # Put .pdf, .txt and .docx files in ./data, then
//! docqa ingest
//! docqa query "What does the warranty cover?"
//! docqa ask          # interactive session
//! ```
//!
//! ## As a library
//!
//! ```no_run
//! use docqa_service::{DocqaConfig, IndexAccess, RagService};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = DocqaConfig::load(None)?;
//! let service = RagService::open(config, IndexAccess::CreateIfMissing).await?;
//!
//! let report = service.ingest_intake().await?;
//! println!("{} documents, {} chunks", report.num_documents, report.num_chunks);
//!
//! let record = service.answer("What does the warranty cover?").await?;
//! println!("{}", record.answer_text);
//! for source in &record.sources {
//!     println!("  {}: {}", source.title, source.snippet);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: `docqa.toml` loading and validation
//! - [`generator`]: the [`AnswerGenerator`] trait, HTTP and extractive generators
//! - [`query`]: [`QueryPipeline`] and [`AnswerRecord`]
//! - [`service`]: [`RagService`], owner of the shared index, embedder and generator
//! - [`session`]: bounded question history for the REPL

pub mod config;
pub mod generator;
pub mod query;
pub mod service;
pub mod session;

pub use config::{ConfigError, DocqaConfig, GeneratorBackend};
pub use generator::{
    AnswerGenerator, ExtractiveGenerator, GenerationError, GenerationParams, HttpGenerator,
};
pub use query::{AnswerRecord, QueryError, QueryOptions, QueryPipeline, Source};
pub use service::{IndexAccess, RagService, ServiceError};
pub use session::Session;
