//! ragdb-core
//!
//! Shared domain types, the error type, service traits, the chunker and the
//! configuration layer used by every other ragdb crate.

pub mod chunker;
pub mod config;
pub mod error;
pub mod http;
pub mod traits;
pub mod types;

pub use chunker::{Chunker, ChunkingConfig};
pub use error::{Error, Result, ServiceErrorKind, Stage};
pub use traits::{Embedder, RerankService};
pub use types::{Chunk, ChunkId, Document, FusedHit, RankedChunk, RerankScore, SearchHit, SourceKind, DEFAULT_TOP_K};
