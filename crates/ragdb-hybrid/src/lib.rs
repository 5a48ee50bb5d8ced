//! ragdb-hybrid
//!
//! Hybrid retrieval over a chunked corpus: rank fusion of the lexical and
//! dense indexes, persistence of both under one directory, and the
//! [`Retriever`] session that ties build, load, search and rerank together.

pub mod fusion;
pub mod persist;
pub mod retriever;

pub use fusion::fuse;
pub use persist::{Indexes, Manifest};
pub use retriever::{Retriever, RetrieverConfig};
