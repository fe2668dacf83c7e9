//! Question answering over the vector index.
//!
//! ```text
//! question → embed (timeout) → Retriever top-k → ContextAssembler → AnswerGenerator (timeout)
//!                                     |                                      |
//!                                  sources                              answer_text
//! ```
//!
//! The query path only reads the index. Any failure aborts the query with a typed
//! [`QueryError`]; nothing is retried and no partial answer is returned.

use crate::generator::{AnswerGenerator, GenerationError, GenerationParams, generate_within};
use docqa_context::ContextAssembler;
use docqa_embed::{EmbedError, EmbeddingProvider, embed_text_within};
use docqa_retriever::IndexError;
use docqa_retriever::retrieval::retriever::Retriever;
use docqa_retriever::storage::RetrievedResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("failed to embed question: {0}")]
    Embedding(#[from] EmbedError),

    #[error("failed to search index: {0}")]
    Index(#[from] IndexError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// A document passage an answer was drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Source id of the document (the path it was ingested from)
    pub title: String,
    pub snippet: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    pub answer_text: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub generation: GenerationParams,
    pub embed_timeout: Duration,
    pub generation_timeout: Duration,
    /// Characters of chunk text kept in each [`Source::snippet`]
    pub snippet_chars: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            generation: GenerationParams::default(),
            embed_timeout: Duration::from_secs(60),
            generation_timeout: Duration::from_secs(120),
            snippet_chars: 200,
        }
    }
}

pub struct QueryPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    assembler: Box<dyn ContextAssembler>,
    generator: Arc<dyn AnswerGenerator>,
    options: QueryOptions,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        retriever: Retriever,
        assembler: Box<dyn ContextAssembler>,
        generator: Arc<dyn AnswerGenerator>,
        options: QueryOptions,
    ) -> Self {
        Self {
            embedder,
            retriever,
            assembler,
            generator,
            options,
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub async fn answer(&self, question: &str) -> Result<AnswerRecord, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let query_vector =
            embed_text_within(self.embedder.as_ref(), question, self.options.embed_timeout)
                .await?;
        let results = self.retriever.retrieve(&query_vector).await?;

        let passages: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        let context = self.assembler.assemble(&passages);
        debug!(
            "Assembled {} chars from {} of {} passages ({}, truncated: {})",
            context.text.chars().count(),
            context.passages_used,
            passages.len(),
            self.assembler.name(),
            context.truncated
        );

        let answer_text = generate_within(
            self.generator.as_ref(),
            question,
            &context.text,
            &self.options.generation,
            self.options.generation_timeout,
        )
        .await?;

        info!(
            "Answered with {} ({} sources)",
            self.generator.name(),
            results.len()
        );

        Ok(AnswerRecord {
            question: question.to_string(),
            answer_text,
            sources: sources(&results, self.options.snippet_chars),
        })
    }
}

fn sources(results: &[RetrievedResult], snippet_chars: usize) -> Vec<Source> {
    results
        .iter()
        .map(|r| Source {
            title: r.chunk.source_id.clone(),
            snippet: r.chunk.text.chars().take(snippet_chars).collect(),
            score: r.similarity_score,
        })
        .collect()
}
