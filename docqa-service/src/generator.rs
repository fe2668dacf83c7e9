//! Answer generators: the text model that turns `(question, context)` into an answer.
//!
//! - [`HttpGenerator`] talks to an Ollama-compatible `/api/generate` endpoint
//! - [`ExtractiveGenerator`] answers offline by quoting the context

use crate::config::{GenerationConfig, GeneratorBackend};
use async_trait::async_trait;
use docqa_context::render_prompt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Answer returned by [`ExtractiveGenerator`] when there is nothing to quote.
pub const NO_CONTEXT_ANSWER: &str =
    "I don't know. None of the indexed documents contain anything relevant to this question.";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Rate limit or capacity exhaustion reported by the backend
    #[error("generation backend exhausted: {0}")]
    Exhausted(String),

    #[error("generation backend failed: {0}")]
    Backend(String),

    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 200,
            temperature: 0.0,
        }
    }
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        question: &str,
        context: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError>;
}

/// Run `generator`, failing with [`GenerationError::Timeout`] once `timeout` elapses.
pub async fn generate_within(
    generator: &dyn AnswerGenerator,
    question: &str,
    context: &str,
    params: &GenerationParams,
    timeout: Duration,
) -> Result<String, GenerationError> {
    tokio::time::timeout(timeout, generator.generate(question, context, params))
        .await
        .map_err(|_| GenerationError::Timeout { timeout })?
}

/// Build the generator named by `config.backend`.
pub fn from_config(config: &GenerationConfig) -> Arc<dyn AnswerGenerator> {
    match config.backend {
        GeneratorBackend::Http => Arc::new(HttpGenerator::new(&config.endpoint, &config.model)),
        GeneratorBackend::Extractive => Arc::new(ExtractiveGenerator::default()),
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for an Ollama-style `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpGenerator {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl AnswerGenerator for HttpGenerator {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(
        &self,
        question: &str,
        context: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.endpoint.trim_end_matches('/'));
        let body = GenerateRequest {
            model: &self.model,
            prompt: render_prompt(question, context),
            stream: false,
            options: GenerateOptions {
                num_predict: params.max_tokens,
                temperature: params.temperature,
            },
        };

        debug!("POST {} (model {})", url, self.model);
        let resp = self.client.post(&url).json(&body).send().await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(GenerationError::Exhausted(status.to_string()));
        }
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Backend(format!("{status}: {}", detail.trim())));
        }

        let reply: GenerateResponse = resp.json().await?;
        let answer = reply.response.trim();
        if answer.is_empty() {
            return Err(GenerationError::Backend("empty response".to_string()));
        }
        Ok(answer.to_string())
    }
}

/// Offline generator that quotes the opening sentences of the context.
///
/// Deterministic, which makes it the generator of choice for tests and air-gapped use.
#[derive(Debug, Clone)]
pub struct ExtractiveGenerator {
    max_sentences: usize,
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self { max_sentences: 3 }
    }
}

impl ExtractiveGenerator {
    pub fn new(max_sentences: usize) -> Self {
        Self {
            max_sentences: max_sentences.max(1),
        }
    }

    /// Leading sentences of `context` with whitespace collapsed, capped at `max_words`.
    fn extract(&self, context: &str, max_words: usize) -> String {
        let mut answer = String::new();
        let mut sentences = 0;

        for (i, word) in context.split_whitespace().enumerate() {
            if i >= max_words {
                break;
            }
            if !answer.is_empty() {
                answer.push(' ');
            }
            answer.push_str(word);

            if word.ends_with(['.', '!', '?']) {
                sentences += 1;
                if sentences >= self.max_sentences {
                    break;
                }
            }
        }
        answer
    }
}

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn generate(
        &self,
        _question: &str,
        context: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let answer = self.extract(context, params.max_tokens.max(1));
        if answer.is_empty() {
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StalledGenerator;

    #[async_trait]
    impl AnswerGenerator for StalledGenerator {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn generate(
            &self,
            _question: &str,
            _context: &str,
            _params: &GenerationParams,
        ) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn test_extractive_quotes_leading_sentences() -> anyhow::Result<()> {
        let generator = ExtractiveGenerator::new(2);
        let context = "Solar panels convert light.  They last   25 years.\nInverters fail sooner.";
        let answer = generator
            .generate("how long?", context, &GenerationParams::default())
            .await?;
        assert_eq!(answer, "Solar panels convert light. They last 25 years.");
        Ok(())
    }

    #[tokio::test]
    async fn test_extractive_word_budget() -> anyhow::Result<()> {
        let generator = ExtractiveGenerator::default();
        let params = GenerationParams {
            max_tokens: 4,
            temperature: 0.0,
        };
        let answer = generator
            .generate("q", "one two three four five six", &params)
            .await?;
        assert_eq!(answer, "one two three four");
        Ok(())
    }

    #[tokio::test]
    async fn test_extractive_empty_context() -> anyhow::Result<()> {
        let answer = ExtractiveGenerator::default()
            .generate("anything?", "  \n ", &GenerationParams::default())
            .await?;
        assert_eq!(answer, NO_CONTEXT_ANSWER);
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_within_times_out() {
        let result = generate_within(
            &StalledGenerator,
            "q",
            "ctx",
            &GenerationParams::default(),
            Duration::from_millis(20),
        )
        .await;
        assert!(matches!(result, Err(GenerationError::Timeout { .. })));
    }

    #[test]
    fn test_from_config() {
        let mut config = GenerationConfig::default();
        assert_eq!(from_config(&config).name(), "http");
        config.backend = GeneratorBackend::Extractive;
        assert_eq!(from_config(&config).name(), "extractive");
    }
}
