use std::fs;

use proptest::prelude::*;
use tempfile::TempDir;

use ragdb_core::config::{Config, Normalization, RerankFallback};
use ragdb_core::{Chunk, Chunker, ChunkingConfig, Document, Error};

fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut prev_end = 0usize;
    for (i, c) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(&c.text);
        } else {
            out.push_str(&c.text[prev_end - c.offset..]);
        }
        prev_end = c.end();
    }
    out
}

#[test]
fn short_document_is_a_single_chunk() {
    let doc = Document::new("fox.txt", "The quick brown fox. The lazy dog sleeps.");
    let chunks: Vec<_> = Chunker::new(ChunkingConfig::default()).expect("chunker").split(&doc).collect();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, doc.text());
    assert_eq!(chunks[0].id, "fox.txt:0");
}

#[test]
fn empty_document_has_no_chunks() {
    let doc = Document::new("empty.txt", "");
    let chunker = Chunker::new(ChunkingConfig::default()).expect("chunker");
    assert_eq!(chunker.split(&doc).count(), 0);
}

#[test]
fn long_document_respects_size_and_overlap() {
    let sentence = "Employers must publish a bias audit summary before using the tool. ";
    let doc = Document::new("law.txt", sentence.repeat(120));
    let config = ChunkingConfig::default();
    let chunks: Vec<_> = Chunker::new(config).expect("chunker").split(&doc).collect();
    assert!(chunks.len() > 1);
    for pair in chunks.windows(2) {
        let overlap = &doc.text()[pair[1].offset..pair[0].end()];
        assert_eq!(overlap.chars().count(), config.chunk_overlap);
    }
    for c in &chunks {
        assert!(!c.text.is_empty());
        assert!(c.text.chars().count() <= config.chunk_size);
    }
    // Sentence breaks are preferred over hard cuts.
    assert!(chunks[0].text.ends_with(". "));
    assert_eq!(reassemble(&chunks), doc.text());
}

#[test]
fn split_is_restartable_and_deterministic() {
    let doc = Document::new("d.txt", "alpha beta gamma delta\n".repeat(50));
    let chunker = Chunker::new(ChunkingConfig { chunk_size: 60, chunk_overlap: 10 }).expect("chunker");
    let first: Vec<_> = chunker.split(&doc).collect();
    let second: Vec<_> = chunker.split(&doc).collect();
    assert_eq!(first, second);
    let ordinals: Vec<_> = first.iter().map(|c| c.ordinal).collect();
    assert_eq!(ordinals, (0..first.len()).collect::<Vec<_>>());
}

#[test]
fn document_from_path_reads_lossily() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("a.txt");
    fs::write(&path, b"caf\xe9 policy").expect("write");
    let doc = Document::from_path(&path).expect("read");
    assert!(doc.text().starts_with("caf"));
    assert!(doc.text().ends_with("policy"));
    assert!(doc.source().ends_with("a.txt"));
}

proptest! {
    #[test]
    fn chunks_reconstruct_original_text(
        text in "[a-zé \n.?!;]{1,400}",
        size in 2usize..60,
        overlap_seed in 0usize..60,
    ) {
        let overlap = overlap_seed % size;
        let doc = Document::new("p", text.clone());
        let chunker = Chunker::new(ChunkingConfig { chunk_size: size, chunk_overlap: overlap }).expect("chunker");
        let chunks: Vec<_> = chunker.split(&doc).collect();
        prop_assert!(!chunks.is_empty());
        prop_assert!(chunks.iter().all(|c| !c.text.is_empty() && c.text.chars().count() <= size));
        prop_assert_eq!(reassemble(&chunks), text);
    }
}

#[test]
fn settings_defaults_and_overrides() {
    figment::Jail::expect_with(|jail| {
        jail.set_env("RUST_ENV", "test");
        jail.create_file("config.toml", r#"
            [storage]
            index_dir = "/tmp/ragdb"

            [retrieval.fusion.normalization]
            kind = "min_max"
        "#)?;
        jail.create_file("config.test.toml", r#"
            [retrieval]
            rerank_fallback = "fail"
        "#)?;
        jail.set_env("APP_RETRIEVAL__TOP_K", "8");

        let settings = Config::load().and_then(|c| c.settings()).map_err(|e| e.to_string())?;
        assert_eq!(settings.storage.index_dir, "/tmp/ragdb");
        assert_eq!(settings.retrieval.top_k, 8);
        assert_eq!(settings.retrieval.rerank_top_n, 3);
        assert_eq!(settings.retrieval.rerank_fallback, RerankFallback::Fail);
        assert_eq!(settings.retrieval.fusion.normalization, Normalization::MinMax);
        assert_eq!(settings.chunking.chunk_size, 2000);
        assert_eq!(settings.embedding.api_key_env, "OPENAI_API_KEY");
        Ok(())
    });
}

#[test]
fn invalid_fusion_weights_are_rejected() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("config.toml", r#"
            [retrieval.fusion.weights]
            lexical = -1.0
        "#)?;
        let result = Config::load().and_then(|c| c.settings());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        Ok(())
    });
}

#[test]
fn index_dir_resolves_against_base() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("config.toml", r#"
            [storage]
            index_dir = "${RAGDB_TEST_ROOT}/index"
        "#)?;
        jail.set_env("RAGDB_TEST_ROOT", "corpora");

        let settings = Config::load().and_then(|c| c.settings()).map_err(|e| e.to_string())?;
        let base = std::path::Path::new("/srv/app");
        assert_eq!(settings.storage.resolve_index_dir(base), base.join("corpora/index"));

        let absolute = ragdb_core::config::StorageConfig { index_dir: "/var/lib/ragdb".into() };
        assert_eq!(absolute.resolve_index_dir(base), std::path::PathBuf::from("/var/lib/ragdb"));
        Ok(())
    });
}
