//! Client for Cohere-compatible `/rerank` endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use ragdb_core::config::RerankConfig;
use ragdb_core::error::{Error, Result};
use ragdb_core::http::{self, classify};
use ragdb_core::traits::RerankService;
use ragdb_core::types::RerankScore;

pub struct CohereReranker {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl CohereReranker {
    pub fn new(config: &RerankConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::InvalidConfig("rerank API key must not be empty".into()));
        }
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            endpoint: format!("{}/rerank", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
        })
    }

    pub fn from_config(config: &RerankConfig) -> Result<Self> {
        Self::new(config, config.api_key()?)
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
    return_documents: bool,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

#[async_trait]
impl RerankService for CohereReranker {
    fn name(&self) -> &str { &self.model }

    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankScore>> {
        debug!(model = %self.model, candidates = documents.len(), top_n, "rerank request");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&RerankRequest { model: &self.model, query, documents, top_n, return_documents: false })
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "rerank request failed");
                Error::rerank(classify(&e), format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let (kind, message) = http::describe_failure(response).await;
            error!(%message, "rerank API error");
            return Err(Error::rerank(kind, message));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| Error::rerank(classify(&e), format!("failed to parse response: {e}")))?;
        Ok(parsed.results.into_iter().map(|r| RerankScore { index: r.index, relevance: r.relevance_score }).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_and_name_follow_config() {
        let config = RerankConfig { base_url: "http://localhost:8080/v1/".into(), ..RerankConfig::default() };
        let r = CohereReranker::new(&config, "key").expect("reranker");
        assert_eq!(r.endpoint, "http://localhost:8080/v1/rerank");
        assert_eq!(r.name(), "rerank-english-v2.0");
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(CohereReranker::new(&RerankConfig::default(), ""), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn request_body_shape() {
        let docs = vec!["a".to_string()];
        let body = serde_json::to_value(RerankRequest { model: "m", query: "q", documents: &docs, top_n: 3, return_documents: false })
            .expect("json");
        assert_eq!(body["top_n"], 3);
        assert_eq!(body["documents"][0], "a");
        assert_eq!(body["return_documents"], false);
    }

    #[test]
    fn response_parses_results() {
        let r: RerankResponse = serde_json::from_str(
            r#"{"id":"x","results":[{"index":2,"relevance_score":0.91},{"index":0,"relevance_score":0.12}],"meta":{}}"#,
        )
        .expect("json");
        assert_eq!(r.results.len(), 2);
        assert_eq!(r.results[0].index, 2);
    }

    #[tokio::test]
    async fn unreachable_host_is_transient() {
        let config = RerankConfig { base_url: "http://127.0.0.1:9".into(), timeout_secs: 2, ..RerankConfig::default() };
        let r = CohereReranker::new(&config, "key").expect("reranker");
        let err = r.rerank("q", &["doc".to_string()], 1).await.expect_err("no server");
        assert!(err.is_retryable(), "{err}");
    }
}
