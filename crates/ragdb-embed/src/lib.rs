//! Embedding service clients.
//!
//! [`OpenAiEmbedder`] talks to a hosted OpenAI-compatible API; [`HashEmbedder`]
//! is a deterministic local stand-in. `APP_USE_FAKE_EMBEDDINGS=1` switches
//! [`get_default_embedder`] to the hashing embedder for fast, offline runs.

use std::sync::Arc;

use tracing::info;

use ragdb_core::config::EmbeddingConfig;
use ragdb_core::error::Result;
use ragdb_core::traits::Embedder;

pub mod hashing;
pub mod openai;

pub use hashing::HashEmbedder;
pub use openai::OpenAiEmbedder;

fn fake_embeddings_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// The configured embedding service, or the hashing embedder when `offline` is
/// set or `APP_USE_FAKE_EMBEDDINGS` is enabled.
pub fn get_default_embedder(config: &EmbeddingConfig, offline: bool) -> Result<Arc<dyn Embedder>> {
    if offline || fake_embeddings_requested() {
        info!(dim = config.dim, "using hashing embedder");
        return Ok(Arc::new(HashEmbedder::new(config.dim)));
    }
    info!(model = %config.model, "using hosted embedding service");
    Ok(Arc::new(OpenAiEmbedder::from_config(config)?))
}
