//! Overlapping, boundary-aware text splitting.
//!
//! Sizes are measured in characters, offsets in bytes. A chunk ends at the last
//! natural break inside its size window (paragraph, line, sentence, word, in that
//! order of preference) and the next chunk starts exactly `chunk_overlap`
//! characters before that end, so removing the overlaps from consecutive chunks
//! gives back the original text.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", "; ", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 2000, chunk_overlap: 100 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Lazily split one document. Call again to restart the sequence.
    pub fn split<'a>(&self, document: &'a Document) -> Chunks<'a> {
        Chunks { source: document.source(), text: document.text(), config: self.config, pos: 0, ordinal: 0 }
    }

    /// Split every document, keeping document order. Ordinals restart per document.
    pub fn split_all(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|d| self.split(d)).collect()
    }
}

/// Iterator over the chunks of one document.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    source: &'a str,
    text: &'a str,
    config: ChunkingConfig,
    pos: usize,
    ordinal: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.pos >= self.text.len() {
            return None;
        }
        let rest = &self.text[self.pos..];
        let end = match byte_index_after_chars(rest, self.config.chunk_size) {
            None => self.text.len(),
            Some(limit) => self.pos + break_point(&rest[..limit], self.config.chunk_overlap),
        };
        let chunk = Chunk::new(self.source, self.ordinal, self.pos, &self.text[self.pos..end]);
        self.ordinal += 1;
        self.pos = if end == self.text.len() {
            end
        } else {
            end - trailing_bytes(&self.text[..end], self.config.chunk_overlap)
        };
        Some(chunk)
    }
}

/// Byte index just past the first `n` characters, or `None` when `s` has at most `n` characters.
fn byte_index_after_chars(s: &str, n: usize) -> Option<usize> {
    s.char_indices().nth(n).map(|(i, _)| i)
}

/// Byte length of the last `n` characters of `s`.
fn trailing_bytes(s: &str, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    s.char_indices().rev().nth(n - 1).map_or(s.len(), |(i, _)| s.len() - i)
}

/// End of the chunk inside `window`: after the last preferred separator that still
/// leaves more than `overlap` characters, else the whole window.
fn break_point(window: &str, overlap: usize) -> usize {
    for sep in SEPARATORS {
        if let Some(idx) = window.rfind(sep) {
            let cut = idx + sep.len();
            if window[..cut].chars().count() > overlap {
                return cut;
            }
        }
    }
    window.len()
}
