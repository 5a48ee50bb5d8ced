use proptest::prelude::*;
use ragdb_core::{Chunk, Chunker, ChunkingConfig, Document, Error};
use ragdb_text::LexicalIndex;
use tempfile::TempDir;

fn policy_chunks() -> Vec<Chunk> {
    let text = "Local Law 144 regulates automated employment decision tools.\n\n\
        Employers must obtain an independent bias audit every year.\n\n\
        The audit reports selection rates and impact ratios by sex and race.\n\n\
        Candidates receive notice ten business days before the tool is used.\n\n\
        The EU AI Act classifies recruitment systems as high risk.";
    let doc = Document::new("policy.txt", text);
    Chunker::new(ChunkingConfig { chunk_size: 80, chunk_overlap: 10 }).expect("chunker").split(&doc).collect()
}

#[test]
fn single_chunk_fox_scenario() {
    let doc = Document::new("fox.txt", "The quick brown fox. The lazy dog sleeps.");
    let chunks: Vec<_> = Chunker::new(ChunkingConfig::default()).expect("chunker").split(&doc).collect();
    assert_eq!(chunks.len(), 1);
    let index = LexicalIndex::build(&chunks).expect("build");
    let hits = index.query("fox", 1).expect("query");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk, chunks[0]);
    assert!(hits[0].score > 0.0);
}

#[test]
fn empty_corpus_is_rejected() {
    assert!(matches!(LexicalIndex::build(&[]), Err(Error::EmptyCorpus)));
}

#[test]
fn relevant_chunk_ranks_first_and_scores_descend() {
    let chunks = policy_chunks();
    let index = LexicalIndex::build(&chunks).expect("build");
    let hits = index.query("impact ratios selection rates", 3).expect("query");
    assert_eq!(hits.len(), 3);
    assert!(hits[0].chunk.text.contains("impact ratios"));
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn save_then_open_gives_identical_results() {
    let chunks = policy_chunks();
    let index = LexicalIndex::build(&chunks).expect("build");
    let tmp = TempDir::new().expect("tmp");
    let dir = tmp.path().join("lexical");
    index.save(&dir).expect("save");
    let reopened = LexicalIndex::open(&dir).expect("open");
    assert_eq!(reopened.chunks(), index.chunks());
    for q in ["bias audit", "EU AI Act high risk", "notice candidates", "zebra"] {
        assert_eq!(index.query(q, 4).expect("before"), reopened.query(q, 4).expect("after"), "query {q}");
    }
}

#[test]
fn open_missing_directory_is_corpus_not_found() {
    let tmp = TempDir::new().expect("tmp");
    assert!(matches!(LexicalIndex::open(&tmp.path().join("lexical")), Err(Error::CorpusNotFound(_))));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]
    #[test]
    fn query_returns_exactly_k_real_chunks(k in 1usize..6, q in "[a-z ]{0,20}") {
        let chunks = policy_chunks();
        let k = k.min(chunks.len());
        let index = LexicalIndex::build(&chunks).expect("build");
        let hits = index.query(&q, k).expect("query");
        prop_assert_eq!(hits.len(), k);
        for h in &hits {
            prop_assert!(chunks.contains(&h.chunk));
        }
    }
}
