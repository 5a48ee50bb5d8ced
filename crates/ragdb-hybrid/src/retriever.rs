use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use ragdb_core::chunker::{Chunker, ChunkingConfig};
use ragdb_core::config::{RerankFallback, RetrievalConfig, Settings};
use ragdb_core::error::{Error, Result, Stage};
use ragdb_core::traits::{Embedder, RerankService};
use ragdb_core::types::{Document, FusedHit, RankedChunk};
use ragdb_rerank::Reranker;
use ragdb_text::LexicalIndex;
use ragdb_vector::DenseIndex;

use crate::fusion::fuse;
use crate::persist::{self, Indexes, Manifest};

#[derive(Debug, Clone, Default)]
pub struct RetrieverConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
}

impl From<&Settings> for RetrieverConfig {
    fn from(settings: &Settings) -> Self {
        Self { chunking: settings.chunking, retrieval: settings.retrieval.clone() }
    }
}

struct Loaded {
    indexes: Indexes,
    manifest: Manifest,
}

/// One retrieval session: owns the current indexes, if any.
///
/// Building or loading replaces the previous corpus wholesale. Queries before
/// either has succeeded fail with [`Error::NotReady`].
pub struct Retriever {
    chunker: Chunker,
    config: RetrievalConfig,
    embedder: Arc<dyn Embedder>,
    reranker: Reranker,
    state: Option<Loaded>,
}

impl Retriever {
    pub fn new(config: RetrieverConfig, embedder: Arc<dyn Embedder>, rerank: Arc<dyn RerankService>) -> Result<Self> {
        config.retrieval.validate()?;
        Ok(Self {
            chunker: Chunker::new(config.chunking)?,
            config: config.retrieval,
            embedder,
            reranker: Reranker::new(rerank),
            state: None,
        })
    }

    pub fn is_ready(&self) -> bool { self.state.is_some() }

    pub fn manifest(&self) -> Option<&Manifest> { self.state.as_ref().map(|s| &s.manifest) }

    /// Chunk `documents`, build both indexes, save them to `dir` and make them current.
    ///
    /// On failure the previous indexes (if any) stay loaded in memory.
    pub async fn build(&mut self, documents: &[Document], dir: &Path) -> Result<&Manifest> {
        let chunks = self.chunker.split_all(documents);
        if chunks.is_empty() {
            return Err(Error::EmptyCorpus);
        }
        info!(documents = documents.len(), chunks = chunks.len(), "building indexes");

        let lexical_chunks = chunks.clone();
        let lexical_task = tokio::task::spawn_blocking(move || LexicalIndex::build(&lexical_chunks));
        let lexical = async {
            match lexical_task.await {
                Ok(built) => built,
                Err(e) => Err(Error::backend(Stage::Lexical, e)),
            }
        };
        let dense = DenseIndex::build(&chunks, self.embedder.as_ref(), self.config.embed_batch_size);
        let (lexical, dense) = tokio::try_join!(lexical, dense)?;

        let indexes = Indexes { lexical, dense };
        let manifest = persist::save(&indexes, dir).await?;
        let loaded = self.state.insert(Loaded { indexes, manifest });
        Ok(&loaded.manifest)
    }

    /// Make the corpus saved in `dir` current.
    pub async fn load(&mut self, dir: &Path) -> Result<&Manifest> {
        let (manifest, indexes) = persist::load(dir).await?;
        if manifest.embedder_id != self.embedder.embedder_id() {
            return Err(Error::FormatMismatch(format!(
                "corpus was embedded with '{}' but the configured embedder is '{}'",
                manifest.embedder_id,
                self.embedder.embedder_id()
            )));
        }
        let loaded = self.state.insert(Loaded { indexes, manifest });
        Ok(&loaded.manifest)
    }

    /// Drop the current indexes. Saved files are left alone.
    pub fn reset(&mut self) {
        if self.state.take().is_some() {
            debug!("retriever reset");
        }
    }

    /// Query both indexes with `top_k` and fuse the two rankings.
    pub async fn search(&self, query: &str) -> Result<Vec<FusedHit>> {
        let loaded = self.state.as_ref().ok_or(Error::NotReady)?;
        let top_k = self.config.top_k;
        let lexical = loaded.indexes.lexical.query(query, top_k)?;
        let dense = loaded.indexes.dense.query(self.embedder.as_ref(), query, top_k).await?;
        let fused = fuse(&lexical, &dense, &self.config.fusion);
        debug!(lexical = lexical.len(), dense = dense.len(), fused = fused.len(), "search");
        Ok(fused)
    }

    /// Rerank fused candidates, keeping `rerank_top_n`. Errors are returned as is.
    pub async fn rerank(&self, query: &str, candidates: &[FusedHit]) -> Result<Vec<RankedChunk>> {
        self.reranker.rerank(query, candidates, self.config.rerank_top_n).await
    }

    /// [`search`](Self::search) followed by [`rerank`](Self::rerank), applying
    /// the configured [`RerankFallback`] when the rerank service fails.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RankedChunk>> {
        let fused = self.search(query).await?;
        match self.rerank(query, &fused).await {
            Ok(ranked) => Ok(ranked),
            Err(e @ Error::Rerank { .. }) if self.config.rerank_fallback == RerankFallback::FusedOrder => {
                warn!(error = %e, service = self.reranker.service_name(), "rerank failed, using fused order");
                Ok(fused
                    .into_iter()
                    .take(self.config.rerank_top_n)
                    .map(|hit| RankedChunk { chunk: hit.chunk, relevance: hit.score })
                    .collect())
            }
            Err(e) => Err(e),
        }
    }

    /// Retrieved chunk texts joined by blank lines, ready to hand to a generator.
    pub async fn context(&self, query: &str) -> Result<String> {
        let ranked = self.retrieve(query).await?;
        Ok(ranked.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join("\n\n"))
    }
}
