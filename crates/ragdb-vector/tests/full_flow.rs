use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use proptest::prelude::*;
use ragdb_core::error::{Error, Result, ServiceErrorKind};
use ragdb_core::{Chunk, Embedder};
use ragdb_embed::HashEmbedder;
use ragdb_vector::DenseIndex;
use tempfile::TempDir;

fn corpus() -> Vec<Chunk> {
    [
        "The quick brown fox jumps over the lazy dog.",
        "Bias audits of automated hiring tools are required annually.",
        "Quarterly revenue grew by eight percent.",
        "Fire safety drills happen every spring.",
    ]
    .iter()
    .enumerate()
    .map(|(i, t)| Chunk::new("doc", i, i * 100, *t))
    .collect()
}

/// Fails on the n-th call to `embed_batch`, succeeding otherwise.
struct FailingEmbedder {
    inner: HashEmbedder,
    fail_on: usize,
    kind: ServiceErrorKind,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(Error::embedding(self.kind, "scripted failure"));
        }
        self.inner.embed_batch(texts).await
    }
}

/// Returns vectors one value too short.
struct ShortEmbedder;

#[async_trait]
impl Embedder for ShortEmbedder {
    fn embedder_id(&self) -> &str { "short" }
    fn dim(&self) -> usize { 8 }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0; 7]).collect())
    }
}

#[tokio::test]
async fn dense_full_flow() {
    let embedder = HashEmbedder::new(256);
    let chunks = corpus();
    let index = DenseIndex::build(&chunks, &embedder, 3).await.expect("build");
    assert_eq!(index.len(), 4);
    assert_eq!(index.embedder_id(), embedder.embedder_id());

    let hits = index.query(&embedder, "hiring bias audit", 2).await.expect("query");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.ordinal, 1);
    assert!(hits[0].score >= hits[1].score);

    let all = index.query(&embedder, "fox", 10).await.expect("query");
    assert_eq!(all.len(), 4, "k larger than the corpus returns every chunk");
}

#[tokio::test]
async fn empty_corpus_is_rejected() {
    let embedder = HashEmbedder::new(16);
    assert!(matches!(DenseIndex::build(&[], &embedder, 8).await, Err(Error::EmptyCorpus)));
}

#[tokio::test]
async fn save_then_open_preserves_results() {
    let embedder = HashEmbedder::new(64);
    let index = DenseIndex::build(&corpus(), &embedder, 2).await.expect("build");
    let tmp = TempDir::new().expect("tmp");
    let dir = tmp.path().join("dense");
    index.save(&dir).await.expect("save");

    let reopened = DenseIndex::open(&dir).await.expect("open");
    assert_eq!(reopened.chunks(), index.chunks());
    assert_eq!(reopened.dim(), 64);

    let before = index.query(&embedder, "fire drills", 4).await.expect("query");
    let after = reopened.query(&embedder, "fire drills", 4).await.expect("query");
    assert_eq!(before, after);
}

#[tokio::test]
async fn open_missing_dir_is_corpus_not_found() {
    let tmp = TempDir::new().expect("tmp");
    let missing = tmp.path().join("nothing-here");
    assert!(matches!(DenseIndex::open(&missing).await, Err(Error::CorpusNotFound(_))));
    assert!(matches!(DenseIndex::open(tmp.path()).await, Err(Error::CorpusNotFound(_))));
}

#[tokio::test]
async fn query_with_other_embedder_is_format_mismatch() {
    let index = DenseIndex::build(&corpus(), &HashEmbedder::new(32), 8).await.expect("build");
    let other = HashEmbedder::new(64);
    assert!(matches!(index.query(&other, "fox", 1).await, Err(Error::FormatMismatch(_))));
}

#[tokio::test]
async fn embedding_failures_keep_their_kind() {
    for kind in [ServiceErrorKind::Transient, ServiceErrorKind::Permanent] {
        let embedder = FailingEmbedder { inner: HashEmbedder::new(16), fail_on: 1, kind, calls: AtomicUsize::new(0) };
        match DenseIndex::build(&corpus(), &embedder, 2).await {
            Err(Error::Embedding { kind: got, .. }) => assert_eq!(got, kind),
            other => panic!("expected embedding error, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn wrong_dimension_is_permanent() {
    let err = DenseIndex::build(&corpus(), &ShortEmbedder, 4).await.expect_err("short vectors");
    assert!(matches!(err, Error::Embedding { kind: ServiceErrorKind::Permanent, .. }));
    assert!(!err.is_retryable());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn query_returns_exactly_k_built_chunks(
        texts in prop::collection::vec("[a-z]{1,8}( [a-z]{1,8}){0,5}", 1..12),
        query in "[a-z]{1,8}",
        batch in 1usize..5,
    ) {
        let chunks: Vec<Chunk> = texts.iter().enumerate().map(|(i, t)| Chunk::new("gen", i, i * 64, t.as_str())).collect();
        let embedder = HashEmbedder::new(32);
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        let index = rt.block_on(DenseIndex::build(&chunks, &embedder, batch)).expect("build");
        for k in 0..=chunks.len() {
            let hits = rt.block_on(index.query(&embedder, &query, k)).expect("query");
            prop_assert_eq!(hits.len(), k);
            prop_assert!(hits.iter().all(|h| chunks.contains(&h.chunk)));
            let ids: std::collections::HashSet<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
            prop_assert_eq!(ids.len(), k);
        }
    }
}
