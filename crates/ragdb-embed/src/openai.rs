//! Embedding client for OpenAI-compatible `/embeddings` endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use ragdb_core::config::EmbeddingConfig;
use ragdb_core::error::{Error, Result, ServiceErrorKind};
use ragdb_core::http::{self, classify};
use ragdb_core::traits::Embedder;

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dim: usize,
    id: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::InvalidConfig("embedding API key must not be empty".into()));
        }
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dim: config.dim,
            id: format!("openai:{}:d{}", config.model, config.dim),
        })
    }

    /// Build from config, reading the key from the configured environment variable.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        Self::new(config, config.api_key()?)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Put the response rows back in request order and check their shape.
fn into_vectors(response: EmbeddingResponse, expected: usize, dim: usize) -> Result<Vec<Vec<f32>>> {
    if response.data.len() != expected {
        return Err(Error::embedding(
            ServiceErrorKind::Permanent,
            format!("expected {expected} embeddings, got {}", response.data.len()),
        ));
    }
    let mut data = response.data;
    data.sort_by_key(|d| d.index);
    if data.iter().enumerate().any(|(i, d)| d.index != i) {
        return Err(Error::embedding(ServiceErrorKind::Permanent, "embedding indices do not cover the batch"));
    }
    if let Some(bad) = data.iter().find(|d| d.embedding.len() != dim) {
        return Err(Error::embedding(
            ServiceErrorKind::Permanent,
            format!("dimension mismatch: got {} expected {dim}", bad.embedding.len()),
        ));
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, batch_size = texts.len(), "embedding batch");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest { model: &self.model, input: texts })
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "embedding request failed");
                Error::embedding(classify(&e), format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let (kind, message) = http::describe_failure(response).await;
            error!(%message, "embedding API error");
            return Err(Error::embedding(kind, message));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(classify(&e), format!("failed to parse response: {e}")))?;
        into_vectors(parsed, texts.len(), self.dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> EmbeddingResponse {
        serde_json::from_str(json).expect("valid json")
    }

    #[test]
    fn rows_are_reordered_by_index() {
        let r = response(r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#);
        let v = into_vectors(r, 2, 2).expect("vectors");
        assert_eq!(v, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn wrong_count_or_dimension_is_permanent() {
        let r = response(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#);
        assert!(matches!(into_vectors(r, 2, 1), Err(Error::Embedding { kind: ServiceErrorKind::Permanent, .. })));
        let r = response(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#);
        assert!(matches!(into_vectors(r, 1, 3), Err(Error::Embedding { kind: ServiceErrorKind::Permanent, .. })));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(OpenAiEmbedder::new(&EmbeddingConfig::default(), ""), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn id_carries_model_and_dim() {
        let e = OpenAiEmbedder::new(&EmbeddingConfig::default(), "sk-test").expect("embedder");
        assert_eq!(e.embedder_id(), "openai:text-embedding-3-small:d1536");
        assert_eq!(e.endpoint, "https://api.openai.com/v1/embeddings");
    }
}
