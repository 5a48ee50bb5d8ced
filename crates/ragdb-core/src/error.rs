use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Chunking,
    Lexical,
    Dense,
    Embedding,
    Rerank,
    Persistence,
    Session,
    Config,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Chunking => "chunking",
            Stage::Lexical => "lexical index",
            Stage::Dense => "dense index",
            Stage::Embedding => "embedding service",
            Stage::Rerank => "rerank service",
            Stage::Persistence => "persistence",
            Stage::Session => "retriever session",
            Stage::Config => "configuration",
        };
        f.write_str(s)
    }
}

/// Whether a remote service failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Timeouts, connection failures, rate limits and server errors.
    Transient,
    /// Bad credentials, rejected requests, malformed responses.
    Permanent,
}

impl ServiceErrorKind {
    /// Classify an HTTP status code returned by a hosted model API.
    pub fn from_status(status: u16) -> Self {
        match status {
            408 | 429 | 500..=599 => ServiceErrorKind::Transient,
            _ => ServiceErrorKind::Permanent,
        }
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceErrorKind::Transient => f.write_str("transient"),
            ServiceErrorKind::Permanent => f.write_str("permanent"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot build an index from an empty corpus")]
    EmptyCorpus,

    #[error("no index has been built or loaded")]
    NotReady,

    #[error("embedding service error ({kind}): {message}")]
    Embedding { kind: ServiceErrorKind, message: String },

    #[error("rerank service error ({kind}): {message}")]
    Rerank { kind: ServiceErrorKind, message: String },

    #[error("no persisted corpus found at {0}")]
    CorpusNotFound(PathBuf),

    #[error("persisted corpus is incompatible: {0}")]
    FormatMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{stage} backend error: {source}")]
    Backend {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an error from a storage or search library used by `stage`.
    pub fn backend(stage: Stage, source: impl Into<BoxError>) -> Self {
        Error::Backend { stage, source: source.into() }
    }

    pub fn embedding(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Error::Embedding { kind, message: message.into() }
    }

    pub fn rerank(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Error::Rerank { kind, message: message.into() }
    }

    /// The stage that failed, so callers can decide between retry and abort.
    pub fn stage(&self) -> Stage {
        match self {
            Error::EmptyCorpus => Stage::Chunking,
            Error::NotReady => Stage::Session,
            Error::Embedding { .. } => Stage::Embedding,
            Error::Rerank { .. } => Stage::Rerank,
            Error::CorpusNotFound(_) | Error::FormatMismatch(_) | Error::Io(_) | Error::Json(_) => Stage::Persistence,
            Error::InvalidConfig(_) => Stage::Config,
            Error::Backend { stage, .. } => *stage,
        }
    }

    /// True only for transient service failures; everything else needs caller action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Embedding { kind: ServiceErrorKind::Transient, .. }
                | Error::Rerank { kind: ServiceErrorKind::Transient, .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
