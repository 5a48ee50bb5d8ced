//! ragdb-text
//!
//! Tantivy-based lexical (BM25) index over document chunks, with on-disk
//! save/open for the persistence layer.

pub mod tantivy_utils;
pub mod index;

pub use index::LexicalIndex;
