//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`APP_RETRIEVAL__TOP_K=8` sets `retrieval.top_k`). Every section has defaults,
//! so an empty configuration is valid. Provides helpers to expand `~` and
//! `${VAR}` and to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::DEFAULT_TOP_K;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    /// Extract and validate the full typed settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub rerank: RerankConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the persisted lexical and dense artifacts.
    pub index_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { index_dir: "./data/index".to_string() }
    }
}

impl StorageConfig {
    /// `index_dir` with `~` and `$VAR` expanded; relative paths are taken from `base`.
    pub fn resolve_index_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.index_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates taken from each index per query.
    pub top_k: usize,
    /// Chunks kept after reranking.
    pub rerank_top_n: usize,
    /// Texts per embedding request while building.
    pub embed_batch_size: usize,
    pub fusion: FusionConfig,
    pub rerank_fallback: RerankFallback,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            rerank_top_n: 3,
            embed_batch_size: 64,
            fusion: FusionConfig::default(),
            rerank_fallback: RerankFallback::FusedOrder,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 || self.rerank_top_n == 0 || self.embed_batch_size == 0 {
            return Err(Error::InvalidConfig("top_k, rerank_top_n and embed_batch_size must be positive".into()));
        }
        self.fusion.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub lexical: f32,
    pub dense: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self { lexical: 0.5, dense: 0.5 }
    }
}

/// How each result list's scores are made comparable before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// Reciprocal rank: `1 / (c + rank)`, rank starting at 1.
    Rank {
        #[serde(default = "default_rrf_c")]
        c: f32,
    },
    /// `(score - min) / (max - min)`; a constant list maps to 1.0.
    MinMax,
}

fn default_rrf_c() -> f32 { 60.0 }

impl Default for Normalization {
    fn default() -> Self {
        Normalization::Rank { c: default_rrf_c() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub weights: FusionWeights,
    pub normalization: Normalization,
}

impl FusionConfig {
    pub fn validate(&self) -> Result<()> {
        let FusionWeights { lexical, dense } = self.weights;
        if !(lexical.is_finite() && dense.is_finite() && lexical >= 0.0 && dense >= 0.0) {
            return Err(Error::InvalidConfig(format!("fusion weights must be finite and non-negative, got ({lexical}, {dense})")));
        }
        if let Normalization::Rank { c } = self.normalization {
            if !(c.is_finite() && c >= 0.0) {
                return Err(Error::InvalidConfig(format!("rank fusion constant must be non-negative, got {c}")));
            }
        }
        Ok(())
    }
}

/// What the retriever returns when the rerank service fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankFallback {
    /// Log a warning and return the fused order.
    #[default]
    FusedOrder,
    /// Surface the rerank error.
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dim: usize,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dim: 1536,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn api_key(&self) -> Result<String> { read_key(&self.api_key_env) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.cohere.ai/v1".to_string(),
            model: "rerank-english-v2.0".to_string(),
            api_key_env: "COHERE_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

impl RerankConfig {
    pub fn api_key(&self) -> Result<String> { read_key(&self.api_key_env) }
}

fn read_key(var: &str) -> Result<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::InvalidConfig(format!("environment variable {var} is not set"))),
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
