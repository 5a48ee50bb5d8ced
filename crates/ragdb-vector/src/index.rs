use tracing::{debug, info};

use ragdb_core::error::{Error, Result, ServiceErrorKind};
use ragdb_core::traits::Embedder;
use ragdb_core::types::{by_score_then_position, Chunk, SearchHit, SourceKind};

/// Exact cosine-similarity index over embedded chunks.
///
/// Vectors are stored L2-normalised so similarity is a dot product. The index
/// remembers which embedder produced it and refuses queries from another one.
#[derive(Debug, Clone)]
pub struct DenseIndex {
    embedder_id: String,
    dim: usize,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl DenseIndex {
    /// Embed every chunk, `batch_size` texts per request.
    pub async fn build(chunks: &[Chunk], embedder: &dyn Embedder, batch_size: usize) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::EmptyCorpus);
        }
        let dim = embedder.dim();
        let mut vectors = Vec::with_capacity(chunks.len());
        for (batch_no, batch) in chunks.chunks(batch_size.max(1)).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = embedder.embed_batch(&texts).await?;
            check_shape(&embeddings, texts.len(), dim)?;
            debug!(batch = batch_no, size = texts.len(), "embedded batch");
            vectors.extend(embeddings.into_iter().map(normalized));
        }
        info!(chunks = chunks.len(), dim, embedder = embedder.embedder_id(), "built dense index");
        Ok(Self { embedder_id: embedder.embedder_id().to_string(), dim, chunks: chunks.to_vec(), vectors })
    }

    /// Reassemble an index from persisted rows; vectors must already be normalised.
    pub(crate) fn from_parts(embedder_id: String, dim: usize, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::FormatMismatch("dense index has no rows".into()));
        }
        if chunks.len() != vectors.len() || vectors.iter().any(|v| v.len() != dim) {
            return Err(Error::FormatMismatch("dense index rows do not match its dimension".into()));
        }
        Ok(Self { embedder_id, dim, chunks, vectors })
    }

    pub fn embedder_id(&self) -> &str { &self.embedder_id }
    pub fn dim(&self) -> usize { self.dim }
    pub fn chunks(&self) -> &[Chunk] { &self.chunks }
    pub(crate) fn vectors(&self) -> &[Vec<f32>] { &self.vectors }
    pub fn len(&self) -> usize { self.chunks.len() }
    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    /// Embed `text` with the same embedder used to build and return the `k` nearest chunks.
    pub async fn query(&self, embedder: &dyn Embedder, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        if embedder.embedder_id() != self.embedder_id {
            return Err(Error::FormatMismatch(format!(
                "index was built with '{}' but queried with '{}'",
                self.embedder_id,
                embedder.embedder_id()
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let embeddings = embedder.embed_batch(&[text.to_string()]).await?;
        check_shape(&embeddings, 1, self.dim)?;
        let q = embeddings.into_iter().next().map(normalized).unwrap_or_default();
        self.search_vec(&q, k)
    }

    /// Nearest chunks to an already-normalised query vector.
    pub fn search_vec(&self, q: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if q.len() != self.dim {
            return Err(Error::embedding(ServiceErrorKind::Permanent, format!("dimension mismatch: got {} expected {}", q.len(), self.dim)));
        }
        let mut ranked: Vec<(f32, usize)> = self.vectors.iter().enumerate().map(|(p, v)| (dot(q, v), p)).collect();
        ranked.sort_by(|a, b| by_score_then_position(*a, *b));
        ranked.truncate(k);
        Ok(ranked.into_iter().map(|(score, p)| SearchHit { chunk: self.chunks[p].clone(), score, source: SourceKind::Vector }).collect())
    }
}

fn check_shape(embeddings: &[Vec<f32>], expected: usize, dim: usize) -> Result<()> {
    if embeddings.len() != expected {
        return Err(Error::embedding(ServiceErrorKind::Permanent, format!("embedder returned {} vectors for {expected} texts", embeddings.len())));
    }
    if let Some(v) = embeddings.iter().find(|v| v.len() != dim) {
        return Err(Error::embedding(ServiceErrorKind::Permanent, format!("dimension mismatch: got {} expected {dim}", v.len())));
    }
    Ok(())
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalized(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v { *x /= norm; }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_vec_orders_by_similarity_then_position() {
        let chunks = vec![Chunk::new("d", 0, 0, "a"), Chunk::new("d", 1, 1, "b"), Chunk::new("d", 2, 2, "c")];
        let vectors = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]];
        let index = DenseIndex::from_parts("test".into(), 2, chunks, vectors).expect("index");
        let hits = index.search_vec(&[1.0, 0.0], 3).expect("search");
        let ordinals: Vec<_> = hits.iter().map(|h| h.chunk.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 0]);
        assert!(hits.iter().all(|h| h.source == SourceKind::Vector));
    }

    #[test]
    fn from_parts_rejects_ragged_rows() {
        let chunks = vec![Chunk::new("d", 0, 0, "a")];
        assert!(DenseIndex::from_parts("test".into(), 3, chunks, vec![vec![1.0]]).is_err());
    }

    #[test]
    fn normalized_leaves_zero_vector() {
        assert_eq!(normalized(vec![0.0, 0.0]), vec![0.0, 0.0]);
        let v = normalized(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
    }
}
