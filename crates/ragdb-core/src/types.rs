//! Domain types shared by the text, vector and hybrid engines.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;

pub type ChunkId = String;

/// Candidates returned per index when the caller does not choose `k`.
pub const DEFAULT_TOP_K: usize = 5;

/// Raw text of one source document.
///
/// Immutable once loaded; the chunker borrows it and hands out owned chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    source: String,
    text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self { source: source.into(), text: text.into() }
    }

    /// Read a document from disk. Invalid UTF-8 is decoded lossily rather than rejected.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => String::from_utf8_lossy(&fs::read(path)?).into_owned(),
        };
        Ok(Self::new(path.to_string_lossy(), text))
    }

    pub fn source(&self) -> &str { &self.source }
    pub fn text(&self) -> &str { &self.text }
}

/// A contiguous span of a document that is independently indexed.
///
/// - `id`: `"{source}:{ordinal}"`, unique within a corpus
/// - `ordinal`: position of the chunk within its document
/// - `offset`: byte offset of `text` inside the document text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source: String,
    pub ordinal: usize,
    pub offset: usize,
    pub text: String,
}

impl Chunk {
    pub fn new(source: &str, ordinal: usize, offset: usize, text: impl Into<String>) -> Self {
        Self { id: format!("{source}:{ordinal}"), source: source.to_string(), ordinal, offset, text: text.into() }
    }

    /// Byte offset one past the last byte of this chunk in the document.
    pub fn end(&self) -> usize { self.offset + self.text.len() }
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Vector,
    Text,
}

/// A retrieval candidate. `score` is engine-specific but higher is always better.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
    pub source: SourceKind,
}

/// One entry of a fused result list.
///
/// Ranks are zero-based positions in the lexical and dense input lists; `None`
/// when the chunk was retrieved by only one engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub chunk: Chunk,
    pub score: f32,
    pub lexical_rank: Option<usize>,
    pub dense_rank: Option<usize>,
}

/// A chunk with the relevance assigned by the rerank stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk: Chunk,
    pub relevance: f32,
}

/// One entry returned by a rerank service: position in the submitted batch plus its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub relevance: f32,
}

/// Orders two scored entries: higher score first, then lower corpus position.
pub fn by_score_then_position(a: (f32, usize), b: (f32, usize)) -> std::cmp::Ordering {
    b.0.total_cmp(&a.0).then(a.1.cmp(&b.1))
}
