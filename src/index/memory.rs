//! In-memory [`VectorIndex`] and [`IndexBackend`].
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every stored vector, which is plenty
//! for a single-person knowledge base of a few hundred chunks.

use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{IndexEntry, IndexMatch};

use super::{check_dims, rank_matches, IndexBackend, VectorIndex};

/// One generation held in memory.
pub struct InMemoryIndex {
    generation: String,
    entries: RwLock<Vec<IndexEntry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            generation: Uuid::new_v4().to_string(),
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn generation(&self) -> &str {
        &self.generation
    }

    async fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.iter().find(|e| e.chunk.id != entry.chunk.id) {
            check_dims(existing.vector.len(), entry.vector.len())?;
        }
        entries.retain(|e| e.chunk.id != entry.chunk.id);
        entries.push(entry.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexMatch>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(first) = entries.first() {
            check_dims(first.vector.len(), vector.len())?;
        }
        let matches = entries
            .iter()
            .map(|e| IndexMatch {
                chunk: e.chunk.clone(),
                score: cosine_similarity(vector, &e.vector),
            })
            .collect();
        Ok(rank_matches(matches, k))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().unwrap_or_else(PoisonError::into_inner).len())
    }
}

/// Backend whose generations are separate [`InMemoryIndex`] instances.
pub struct MemoryBackend {
    active: RwLock<Option<Arc<dyn VectorIndex>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            active: RwLock::new(None),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexBackend for MemoryBackend {
    async fn active_generation(&self) -> Result<Option<String>> {
        Ok(self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| a.generation().to_string()))
    }

    async fn open_active(&self) -> Result<Option<Arc<dyn VectorIndex>>> {
        Ok(self.active.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn create_generation(&self) -> Result<Arc<dyn VectorIndex>> {
        Ok(Arc::new(InMemoryIndex::new()))
    }

    async fn publish(&self, generation: &Arc<dyn VectorIndex>) -> Result<()> {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(generation));
        Ok(())
    }

    async fn discard(&self, generation: &Arc<dyn VectorIndex>) -> Result<()> {
        let is_active = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|a| a.generation() == generation.generation());
        if is_active {
            return Err(Error::Index(
                "cannot discard the active generation".to_string(),
            ));
        }
        generation.clear().await
    }
}
