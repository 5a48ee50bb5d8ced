use async_trait::async_trait;

use crate::error::Result;
use crate::types::RerankScore;

/// An embedding service: one fixed-dimension vector per input string.
///
/// Implementations make at most one request per `embed_batch` call and never
/// retry; failures come back as `Error::Embedding` tagged transient or permanent.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider and model (e.g. `openai:text-embedding-3-small:d1536`).
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality.
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// A relevance-scoring service used for the second-stage rerank.
#[async_trait]
pub trait RerankService: Send + Sync {
    fn name(&self) -> &str;
    /// Score `documents` against `query` in one batched call and return at most
    /// `top_n` entries, most relevant first. Indices refer to `documents`.
    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankScore>>;
}
