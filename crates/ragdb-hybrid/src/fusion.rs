use std::cmp::Ordering;
use std::collections::HashMap;

use ragdb_core::config::{FusionConfig, Normalization};
use ragdb_core::types::{Chunk, FusedHit, SearchHit};

struct Candidate {
    chunk: Chunk,
    lexical: Option<(usize, f32)>,
    dense: Option<(usize, f32)>,
}

/// Merge a lexical and a dense result list into one ranking.
///
/// Each list is normalised on its own, then weighted and summed; a chunk missing
/// from one list contributes 0 for that side. Every chunk in either input
/// appears exactly once. Ties go to the better dense rank, then the better
/// lexical rank, with absent ranks after present ones.
pub fn fuse(lexical: &[SearchHit], dense: &[SearchHit], config: &FusionConfig) -> Vec<FusedHit> {
    let lexical_norm = normalize(lexical, config.normalization);
    let dense_norm = normalize(dense, config.normalization);

    let mut candidates: Vec<Candidate> = Vec::with_capacity(lexical.len() + dense.len());
    let mut by_id: HashMap<&str, usize> = HashMap::with_capacity(candidates.capacity());

    for (rank, (hit, norm)) in lexical.iter().zip(lexical_norm).enumerate() {
        let slot = *by_id.entry(hit.chunk.id.as_str()).or_insert_with(|| {
            candidates.push(Candidate { chunk: hit.chunk.clone(), lexical: None, dense: None });
            candidates.len() - 1
        });
        candidates[slot].lexical.get_or_insert((rank, norm));
    }
    for (rank, (hit, norm)) in dense.iter().zip(dense_norm).enumerate() {
        let slot = *by_id.entry(hit.chunk.id.as_str()).or_insert_with(|| {
            candidates.push(Candidate { chunk: hit.chunk.clone(), lexical: None, dense: None });
            candidates.len() - 1
        });
        candidates[slot].dense.get_or_insert((rank, norm));
    }

    let weights = config.weights;
    let mut fused: Vec<FusedHit> = candidates
        .into_iter()
        .map(|c| {
            let lex = c.lexical.map_or(0.0, |(_, s)| s);
            let den = c.dense.map_or(0.0, |(_, s)| s);
            FusedHit {
                chunk: c.chunk,
                score: weights.lexical * lex + weights.dense * den,
                lexical_rank: c.lexical.map(|(r, _)| r),
                dense_rank: c.dense.map(|(r, _)| r),
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| present_first(a.dense_rank, b.dense_rank))
            .then_with(|| present_first(a.lexical_rank, b.lexical_rank))
    });
    fused
}

fn present_first(a: Option<usize>, b: Option<usize>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn normalize(hits: &[SearchHit], normalization: Normalization) -> Vec<f32> {
    match normalization {
        Normalization::Rank { c } => (0..hits.len()).map(|i| 1.0 / (c + (i + 1) as f32)).collect(),
        Normalization::MinMax => {
            let (min, max) = hits
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), h| (lo.min(h.score), hi.max(h.score)));
            let span = max - min;
            hits.iter()
                .map(|h| if span > 0.0 && span.is_finite() { (h.score - min) / span } else { 1.0 })
                .collect()
        }
    }
}
