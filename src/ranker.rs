//! Exhaustive cosine-similarity ranking with per-identity deduplication.
//!
//! A linear scan over every stored embedding per query. Deliberate: the
//! store is bounded by identity count × per-identity cap, far below where
//! an ANN index would pay off.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;

use lookalike_vision::Embedding;

use crate::error::Error;
use crate::store::EmbeddingStore;

pub const DEFAULT_TOP_K: usize = 5;

/// One ranked identity. At most one result per identity is ever returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub identity: String,
    /// Similarity percentage, rounded to two decimals. Not clamped; raw
    /// cosine signal is preserved.
    pub similarity: f64,
    /// Best-matching reference image for this identity.
    pub source: PathBuf,
}

/// Score every stored record against the query, keep the best record per
/// identity and return the `top_k` highest-scoring identities.
pub fn rank(
    query: &Embedding,
    store: &EmbeddingStore,
    top_k: usize,
) -> Result<Vec<QueryResult>, Error> {
    let Some(dim) = store.dim() else {
        return Ok(Vec::new());
    };
    if query.dim() != dim {
        return Err(Error::DimensionMismatch {
            query: query.dim(),
            store: dim,
        });
    }

    let mut candidates: Vec<QueryResult> = Vec::with_capacity(store.records());
    for (identity, records) in store.iter() {
        for record in records {
            candidates.push(QueryResult {
                identity: identity.to_owned(),
                similarity: similarity_percent(&query.vector, &record.embedding),
                source: record.source.clone(),
            });
        }
    }

    // Stable sort: ties keep store iteration order.
    candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    let mut seen: HashSet<String> = HashSet::new();
    let mut ranked = Vec::new();
    for candidate in candidates {
        if seen.insert(candidate.identity.clone()) {
            ranked.push(candidate);
            if ranked.len() == top_k {
                break;
            }
        }
    }
    Ok(ranked)
}

/// `(1 − cosine distance) × 100`, rounded to two decimal places.
fn similarity_percent(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (&x, &y) in a.iter().zip(b) {
        dot += x as f64 * y as f64;
        norm_a += (x as f64) * (x as f64);
        norm_b += (y as f64) * (y as f64);
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    let cosine = if denom > 0.0 { dot / denom } else { 0.0 };
    (cosine * 100.0 * 100.0).round() / 100.0
}
