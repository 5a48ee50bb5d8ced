//! ragdb-vector
//!
//! Dense (embedding) index with exact cosine search. Vectors come from any
//! [`ragdb_core::Embedder`]; saved indexes live in a LanceDB database.

pub mod index;
pub mod schema;
pub mod table;

pub use index::DenseIndex;
