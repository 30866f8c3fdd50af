//! Query-time retrieval: embed the question, search the published index,
//! and return the top-k deduplicated chunks.
//!
//! ```text
//! query ──embed──▶ vector ──index.query(max(k, candidate_k))──▶ candidates
//!   ──min_score──▶ ──dedup by source_id (keep best)──▶ ──sort──▶ truncate(k)
//! ```
//!
//! Ordering is total and deterministic: score descending, then `source_id`
//! ascending, then `chunk_index` ascending. Two identical queries against
//! the same index always return the same list.

use std::collections::HashMap;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingGateway;
use crate::error::{Error, Result};
use crate::index::{compare_matches, VectorIndex};
use crate::models::{IndexMatch, RetrievalResult};

/// Retrieve the `k` most relevant chunks for `query`.
///
/// `index` is the published generation; `None` (never built) yields an
/// empty result rather than an error. Embedding failures propagate
/// unchanged; nothing partial is returned.
pub async fn retrieve(
    embedder: &dyn EmbeddingGateway,
    index: Option<&dyn VectorIndex>,
    config: &RetrievalConfig,
    query: &str,
    k: usize,
) -> Result<RetrievalResult> {
    if query.trim().is_empty() {
        return Err(Error::InvalidInput("query must not be empty".to_string()));
    }
    if k == 0 {
        return Err(Error::InvalidInput("k must be at least 1".to_string()));
    }

    let Some(index) = index else {
        tracing::debug!("no published index; returning empty retrieval");
        return Ok(RetrievalResult::default());
    };

    let vector = embedder.embed(query).await?;
    let candidates = index.query(&vector, k.max(config.candidate_k)).await?;
    let fetched = candidates.len();
    let matches = select(candidates, k, config.min_score);

    tracing::debug!(
        candidates = fetched,
        returned = matches.len(),
        k,
        "retrieval complete"
    );
    Ok(RetrievalResult { matches })
}

/// Apply the similarity floor, keep the best match per `source_id`, order,
/// and truncate to `k`.
pub fn select(candidates: Vec<IndexMatch>, k: usize, min_score: Option<f32>) -> Vec<IndexMatch> {
    let mut best: HashMap<String, IndexMatch> = HashMap::new();
    for candidate in candidates {
        if min_score.is_some_and(|floor| candidate.score < floor) {
            continue;
        }
        match best.get(&candidate.chunk.source_id) {
            Some(existing) if compare_matches(existing, &candidate).is_le() => {}
            _ => {
                best.insert(candidate.chunk.source_id.clone(), candidate);
            }
        }
    }

    let mut matches: Vec<IndexMatch> = best.into_values().collect();
    matches.sort_by(compare_matches);
    matches.truncate(k);
    matches
}
