use std::collections::HashSet;

use async_trait::async_trait;

use ragdb_core::error::Result;
use ragdb_core::traits::RerankService;
use ragdb_core::types::{by_score_then_position, RerankScore};

/// Offline scorer: relevance is the fraction of distinct query terms found in
/// the candidate. Ties keep the submitted order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermOverlapReranker;

fn terms(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

impl TermOverlapReranker {
    pub fn score(query: &str, document: &str) -> f32 {
        let q = terms(query);
        if q.is_empty() {
            return 0.0;
        }
        let d = terms(document);
        q.iter().filter(|t| d.contains(*t)).count() as f32 / q.len() as f32
    }
}

#[async_trait]
impl RerankService for TermOverlapReranker {
    fn name(&self) -> &str { "term-overlap" }

    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankScore>> {
        let mut scored: Vec<(f32, usize)> = documents.iter().enumerate().map(|(i, d)| (Self::score(query, d), i)).collect();
        scored.sort_by(|a, b| by_score_then_position(*a, *b));
        scored.truncate(top_n);
        Ok(scored.into_iter().map(|(relevance, index)| RerankScore { index, relevance }).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_of_query_terms() {
        assert_eq!(TermOverlapReranker::score("bias audit", "The audit found bias."), 1.0);
        assert_eq!(TermOverlapReranker::score("bias audit", "An audit."), 0.5);
        assert_eq!(TermOverlapReranker::score("", "anything"), 0.0);
    }
}
