//! Context assembly: turning ranked retrieval passages into the single context
//! string handed to an answer generator.
//!
//! Assembly is a pluggable strategy behind [`ContextAssembler`]. The only strategy
//! implemented is "stuff": concatenate passages in rank order until a character
//! budget is reached. Strategies that need extra generator round-trips
//! ("map-reduce", "refine") are recognised by name and rejected.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Question-answering prompt used with the "stuff" strategy.
///
/// `{context}` and `{question}` are substituted by [`render_prompt`].
pub const STUFF_PROMPT_TEMPLATE: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.

{context}

Question: {question}
Helpful Answer:";

/// Separator placed between passages.
pub const PASSAGE_SEPARATOR: &str = "\n\n";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("context assembly strategy {0:?} is not supported")]
    Unsupported(String),

    #[error("unknown context assembly strategy {0:?}")]
    Unknown(String),
}

/// Result of assembling a context from ranked passages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    /// Number of passages that contributed at least one character.
    pub passages_used: usize,
    /// True when the budget cut a passage short or dropped later passages.
    pub truncated: bool,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

pub trait ContextAssembler: Send + Sync {
    /// Strategy name as used in configuration.
    fn name(&self) -> &str;

    /// Combine `passages` (already in rank order) into one context.
    fn assemble(&self, passages: &[&str]) -> AssembledContext;
}

/// "Stuff" strategy: every passage, in order, bounded by `max_chars` characters.
#[derive(Debug, Clone)]
pub struct StuffAssembler {
    max_chars: usize,
}

impl StuffAssembler {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }
}

impl ContextAssembler for StuffAssembler {
    fn name(&self) -> &str {
        "stuff"
    }

    fn assemble(&self, passages: &[&str]) -> AssembledContext {
        let separator_len = PASSAGE_SEPARATOR.chars().count();
        let mut text = String::new();
        let mut used_chars = 0;
        let mut passages_used = 0;
        let mut truncated = false;

        for passage in passages.iter().filter(|p| !p.is_empty()) {
            let sep = if passages_used > 0 { separator_len } else { 0 };
            let remaining = self.max_chars.saturating_sub(used_chars + sep);
            if remaining == 0 {
                truncated = true;
                break;
            }

            if passages_used > 0 {
                text.push_str(PASSAGE_SEPARATOR);
                used_chars += sep;
            }

            let passage_chars = passage.chars().count();
            if passage_chars > remaining {
                text.extend(passage.chars().take(remaining));
                passages_used += 1;
                truncated = true;
                break;
            }

            text.push_str(passage);
            used_chars += passage_chars;
            passages_used += 1;
        }

        AssembledContext {
            text,
            passages_used,
            truncated,
        }
    }
}

/// Named context-assembly strategies accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssemblyStrategy {
    #[default]
    Stuff,
}

impl AssemblyStrategy {
    /// Build the assembler for this strategy with a character budget.
    pub fn build(self, max_chars: usize) -> Box<dyn ContextAssembler> {
        match self {
            AssemblyStrategy::Stuff => Box::new(StuffAssembler::new(max_chars)),
        }
    }
}

impl fmt::Display for AssemblyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyStrategy::Stuff => write!(f, "stuff"),
        }
    }
}

impl FromStr for AssemblyStrategy {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stuff" => Ok(AssemblyStrategy::Stuff),
            "map-reduce" | "map_reduce" | "refine" | "map-rerank" | "map_rerank" => {
                Err(AssemblyError::Unsupported(s.to_string()))
            }
            _ => Err(AssemblyError::Unknown(s.to_string())),
        }
    }
}

/// Fill [`STUFF_PROMPT_TEMPLATE`] with a context and a question.
pub fn render_prompt(question: &str, context: &str) -> String {
    STUFF_PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question)
}
