//! Vector index abstraction.
//!
//! A [`VectorIndex`] is one build *generation*: a set of embedded chunks
//! that can be queried by cosine similarity. An [`IndexBackend`] owns
//! generations and knows which one is published. Rebuilds write into a
//! fresh generation and only [`publish`](IndexBackend::publish) it once it
//! is complete, so readers never observe a half-built index.
//!
//! | Backend | Type | Persistence |
//! |---------|------|-------------|
//! | `memory` | [`MemoryBackend`] | process lifetime |
//! | `sqlite` | [`SqliteBackend`] | survives restarts |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{IndexEntry, IndexMatch};

pub use memory::{InMemoryIndex, MemoryBackend};
pub use sqlite::{SqliteBackend, SqliteIndex};

/// Similarity search over embedded chunks.
///
/// All vectors in one index share a dimensionality; an entry or query of a
/// different length is rejected with [`Error::Index`].
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Identifier of the generation this index holds.
    fn generation(&self) -> &str;

    /// Insert an entry, replacing any entry with the same chunk id.
    async fn upsert(&self, entry: &IndexEntry) -> Result<()>;

    /// Remove every entry.
    async fn clear(&self) -> Result<()>;

    /// Top `k` entries by cosine similarity, best first. Ties are broken by
    /// `source_id` then `chunk_index`, both ascending.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexMatch>>;

    /// Number of entries.
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Owner of index generations.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Id of the published generation. Another process sharing the store
    /// may move it, so holders of an older handle compare against this.
    async fn active_generation(&self) -> Result<Option<String>>;

    /// The published generation, if any build has ever completed.
    async fn open_active(&self) -> Result<Option<Arc<dyn VectorIndex>>>;

    /// A fresh, empty, unpublished generation.
    async fn create_generation(&self) -> Result<Arc<dyn VectorIndex>>;

    /// Make `generation` the active one.
    async fn publish(&self, generation: &Arc<dyn VectorIndex>) -> Result<()>;

    /// Drop an unpublished generation after a failed build.
    async fn discard(&self, generation: &Arc<dyn VectorIndex>) -> Result<()>;
}

/// Create the backend selected by `[index] backend`.
pub async fn create_backend(config: &Config) -> Result<Arc<dyn IndexBackend>> {
    match config.index.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryBackend::new())),
        "sqlite" => Ok(Arc::new(SqliteBackend::open(&config.db.path).await?)),
        other => Err(Error::Configuration(format!(
            "unknown index backend: {}",
            other
        ))),
    }
}

/// Order matches best first with deterministic tie-breaking, then keep `k`.
pub(crate) fn rank_matches(mut matches: Vec<IndexMatch>, k: usize) -> Vec<IndexMatch> {
    matches.sort_by(compare_matches);
    matches.truncate(k);
    matches
}

/// Score descending, then `source_id` ascending, then `chunk_index` ascending.
pub(crate) fn compare_matches(a: &IndexMatch, b: &IndexMatch) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.chunk.source_id.cmp(&b.chunk.source_id))
        .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
}

pub(crate) fn check_dims(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::Index(format!(
            "dimension mismatch: index holds {}-dimensional vectors, got {}",
            expected, actual
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::knowledge::Category;
    use crate::models::{Chunk, IndexEntry};

    pub fn entry(source_id: &str, chunk_index: usize, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                id: format!("{}#{}", source_id, chunk_index),
                source_id: source_id.to_string(),
                doc_type: Category::Skills,
                chunk_index,
                text: format!("text of {} {}", source_id, chunk_index),
                overlap: 0,
                hash: format!("hash-{}-{}", source_id, chunk_index),
            },
            vector,
        }
    }
}
