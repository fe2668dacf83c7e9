use crate::error::IndexError;
use crate::storage::{RetrievedResult, VectorStore};
use half::f16;
use std::sync::Arc;

/// Number of chunks handed to context assembly by default.
pub const DEFAULT_TOP_K: usize = 3;

/// Read-only top-k view over a [`VectorStore`].
#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn VectorStore>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self { index, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// The `top_k` closest chunks, best first.
    pub async fn retrieve(&self, query: &[f16]) -> Result<Vec<RetrievedResult>, IndexError> {
        let results = self.index.search(query, self.top_k).await?;
        tracing::debug!(
            "Retrieved {} of top {} chunks (best score {:?})",
            results.len(),
            self.top_k,
            results.first().map(|r| r.similarity_score)
        );
        Ok(results)
    }
}
