//! ragdb-rerank
//!
//! Second-stage scoring of fused candidates. [`Reranker`] sends one batched
//! request to a [`RerankService`] and maps the returned indices back to chunks.
//! Service failures are returned unchanged; choosing a fallback is the caller's job.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use ragdb_core::error::{Error, Result, ServiceErrorKind};
use ragdb_core::traits::RerankService;
use ragdb_core::types::{FusedHit, RankedChunk, RerankScore};

pub mod cohere;
pub mod overlap;

pub use cohere::CohereReranker;
pub use overlap::TermOverlapReranker;

#[derive(Clone)]
pub struct Reranker {
    service: Arc<dyn RerankService>,
}

impl Reranker {
    pub fn new(service: Arc<dyn RerankService>) -> Self {
        Self { service }
    }

    pub fn service_name(&self) -> &str { self.service.name() }

    /// Rerank `candidates` against `query`, keeping at most `top_n`.
    pub async fn rerank(&self, query: &str, candidates: &[FusedHit], top_n: usize) -> Result<Vec<RankedChunk>> {
        let top_n = top_n.min(candidates.len());
        if top_n == 0 {
            return Ok(Vec::new());
        }
        let documents: Vec<String> = candidates.iter().map(|h| h.chunk.text.clone()).collect();
        let scores = self.service.rerank(query, &documents, top_n).await?;
        debug!(service = self.service.name(), candidates = candidates.len(), returned = scores.len(), "reranked");
        map_scores(candidates, scores, top_n)
    }
}

fn map_scores(candidates: &[FusedHit], scores: Vec<RerankScore>, top_n: usize) -> Result<Vec<RankedChunk>> {
    let mut seen = HashSet::with_capacity(scores.len());
    let mut ranked = Vec::with_capacity(top_n);
    for score in scores.into_iter().take(top_n) {
        let hit = candidates.get(score.index).ok_or_else(|| {
            Error::rerank(ServiceErrorKind::Permanent, format!("index {} out of range for {} candidates", score.index, candidates.len()))
        })?;
        if !seen.insert(score.index) {
            return Err(Error::rerank(ServiceErrorKind::Permanent, format!("index {} returned twice", score.index)));
        }
        ranked.push(RankedChunk { chunk: hit.chunk.clone(), relevance: score.relevance });
    }
    Ok(ranked)
}
