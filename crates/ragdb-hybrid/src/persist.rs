//! On-disk layout for a built corpus.
//!
//! ```text
//! <dir>/manifest.json   written last; its presence marks a complete save
//! <dir>/lexical/        tantivy index
//! <dir>/dense/          LanceDB database
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ragdb_core::error::{Error, Result};
use ragdb_core::types::Chunk;
use ragdb_text::LexicalIndex;
use ragdb_vector::DenseIndex;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const LEXICAL_DIR: &str = "lexical";
pub const DENSE_DIR: &str = "dense";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub chunk_count: usize,
    /// blake3 over the ordered chunk ids and texts.
    pub corpus_fingerprint: String,
    pub embedder_id: String,
    pub dim: usize,
}

/// The pair of indexes built over one chunk sequence.
pub struct Indexes {
    pub lexical: LexicalIndex,
    pub dense: DenseIndex,
}

pub fn corpus_fingerprint(chunks: &[Chunk]) -> String {
    let mut hasher = blake3::Hasher::new();
    for chunk in chunks {
        for field in [chunk.id.as_bytes(), chunk.text.as_bytes()] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field);
        }
    }
    hasher.finalize().to_hex().to_string()
}

fn manifest_path(dir: &Path) -> PathBuf { dir.join(MANIFEST_FILE) }

/// Write both indexes under `dir`, replacing a previous save.
///
/// The old manifest is removed before anything else is touched, so an
/// interrupted save leaves a directory that [`load`] reports as missing.
pub async fn save(indexes: &Indexes, dir: &Path) -> Result<Manifest> {
    let Indexes { lexical, dense } = indexes;
    if lexical.chunks() != dense.chunks() {
        return Err(Error::FormatMismatch("lexical and dense indexes cover different chunks".into()));
    }
    fs::create_dir_all(dir)?;
    let manifest_file = manifest_path(dir);
    if manifest_file.exists() {
        fs::remove_file(&manifest_file)?;
        debug!(dir = %dir.display(), "removed previous manifest");
    }

    lexical.save(&dir.join(LEXICAL_DIR))?;
    dense.save(&dir.join(DENSE_DIR)).await?;

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        created_at: Utc::now(),
        chunk_count: lexical.len(),
        corpus_fingerprint: corpus_fingerprint(lexical.chunks()),
        embedder_id: dense.embedder_id().to_string(),
        dim: dense.dim(),
    };
    let tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));
    fs::write(&tmp, serde_json::to_vec_pretty(&manifest)?)?;
    fs::rename(&tmp, &manifest_file)?;
    info!(dir = %dir.display(), chunks = manifest.chunk_count, "saved corpus");
    Ok(manifest)
}

/// Read the manifest of a saved corpus.
pub fn read_manifest(dir: &Path) -> Result<Manifest> {
    let path = manifest_path(dir);
    if !path.is_file() {
        return Err(Error::CorpusNotFound(dir.to_path_buf()));
    }
    let raw = fs::read(&path)?;
    let manifest: Manifest =
        serde_json::from_slice(&raw).map_err(|e| Error::FormatMismatch(format!("unreadable manifest: {e}")))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(Error::FormatMismatch(format!(
            "format version {} is not supported (expected {FORMAT_VERSION})",
            manifest.format_version
        )));
    }
    Ok(manifest)
}

/// Restore both indexes from `dir` and check them against the manifest.
pub async fn load(dir: &Path) -> Result<(Manifest, Indexes)> {
    let manifest = read_manifest(dir)?;
    let lexical = LexicalIndex::open(&dir.join(LEXICAL_DIR))?;
    let dense = DenseIndex::open(&dir.join(DENSE_DIR)).await?;

    if lexical.len() != manifest.chunk_count || dense.len() != manifest.chunk_count {
        return Err(Error::FormatMismatch(format!(
            "manifest lists {} chunks, lexical index has {}, dense index has {}",
            manifest.chunk_count,
            lexical.len(),
            dense.len()
        )));
    }
    if corpus_fingerprint(lexical.chunks()) != manifest.corpus_fingerprint
        || corpus_fingerprint(dense.chunks()) != manifest.corpus_fingerprint
    {
        return Err(Error::FormatMismatch("index contents do not match the manifest fingerprint".into()));
    }
    if dense.embedder_id() != manifest.embedder_id || dense.dim() != manifest.dim {
        return Err(Error::FormatMismatch("dense index embedder does not match the manifest".into()));
    }

    info!(dir = %dir.display(), chunks = manifest.chunk_count, embedder = %manifest.embedder_id, "loaded corpus");
    Ok((manifest, Indexes { lexical, dense }))
}
