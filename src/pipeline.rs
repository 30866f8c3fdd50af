//! Index lifecycle and the question-answering flow.
//!
//! # Build
//!
//! ```text
//! KnowledgeRecord ─▶ documents ─▶ chunks ─▶ embed (batched) ─▶ fresh generation
//!                                                                  │
//!                                   success: publish + swap ◀──────┤
//!                                   failure: discard, keep old ◀───┘
//! ```
//!
//! # Query
//!
//! ```text
//! question ─▶ [refine] ─▶ retrieve ─▶ assemble ─▶ generate ─▶ Answer
//! ```
//!
//! # Concurrency
//!
//! The published state is an `Arc<Published>` behind a `std::sync::RwLock`.
//! Queries clone the `Arc` under a short read lock and then work on their
//! snapshot, so they never wait for a rebuild and never see a partial one.
//! Rebuilds are serialized by an async mutex; the swap at the end is the
//! only write-lock section.
//!
//! Another process sharing a persistent store (`prag rebuild` next to a
//! running server) can publish behind this pipeline's back. Queries first
//! compare the snapshot with the backend's active generation and re-open
//! it when it moved, and retry once if their generation was collected
//! mid-query.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::chunk::chunk_documents;
use crate::config::Config;
use crate::context::assemble;
use crate::documents::build_documents;
use crate::embedding::{create_embedder, EmbeddingGateway};
use crate::error::{Error, Result};
use crate::generation::{create_generator, GenerationGateway};
use crate::index::{create_backend, IndexBackend, VectorIndex};
use crate::knowledge::{load_knowledge, KnowledgeRecord, Persona};
use crate::models::{Answer, Chunk, IndexEntry, RetrievalResult};
use crate::orchestrator;
use crate::retrieve;

/// What queries read: the active index (if any build ever completed) and
/// the persona it was built for.
pub struct Published {
    pub index: Option<Arc<dyn VectorIndex>>,
    pub persona: Persona,
    pub chunks: usize,
}

impl Published {
    fn generation(&self) -> Option<&str> {
        self.index.as_ref().map(|index| index.generation())
    }
}

/// Snapshot of the index for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStatus {
    pub built: bool,
    pub chunks: usize,
}

pub struct Pipeline {
    config: Config,
    embedder: Arc<dyn EmbeddingGateway>,
    generator: Arc<dyn GenerationGateway>,
    backend: Arc<dyn IndexBackend>,
    published: RwLock<Arc<Published>>,
    rebuild_lock: tokio::sync::Mutex<()>,
}

impl Pipeline {
    /// Assemble a pipeline from explicit collaborators, restoring the
    /// generation the backend last published.
    pub async fn open(
        config: Config,
        embedder: Arc<dyn EmbeddingGateway>,
        generator: Arc<dyn GenerationGateway>,
        backend: Arc<dyn IndexBackend>,
        record: &KnowledgeRecord,
    ) -> Result<Self> {
        record.validate()?;

        let index = backend.open_active().await?;
        let chunks = match &index {
            Some(index) => index.len().await?,
            None => 0,
        };
        if index.is_some() {
            tracing::info!(chunks, "restored published index");
        }

        Ok(Self {
            config,
            embedder,
            generator,
            backend,
            published: RwLock::new(Arc::new(Published {
                index,
                persona: record.persona(),
                chunks,
            })),
            rebuild_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Build every collaborator from configuration and load the knowledge
    /// file named in `[knowledge] path`.
    pub async fn from_config(config: Config) -> Result<Self> {
        let record = load_knowledge(&config.knowledge.path)?;
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let backend = create_backend(&config).await?;
        Self::open(config, embedder, generator, backend, &record).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The currently published state.
    pub fn snapshot(&self) -> Arc<Published> {
        Arc::clone(&*self.published.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The published state, after picking up any generation the backend
    /// published since this pipeline last looked.
    ///
    /// The persona is kept: a build published elsewhere does not carry the
    /// record it was built from.
    pub async fn refresh(&self) -> Result<Arc<Published>> {
        let published = self.snapshot();
        let active = self.backend.active_generation().await?;
        if active.as_deref() == published.generation() {
            return Ok(published);
        }
        let Some(index) = self.backend.open_active().await? else {
            return Ok(published);
        };
        let chunks = index.len().await?;
        let refreshed = Arc::new(Published {
            index: Some(index),
            persona: published.persona.clone(),
            chunks,
        });

        let mut slot = self.published.write().unwrap_or_else(PoisonError::into_inner);
        if !Arc::ptr_eq(&*slot, &published) {
            // A local rebuild swapped in the meantime; it wins.
            return Ok(Arc::clone(&*slot));
        }
        tracing::info!(
            generation = refreshed.generation().unwrap_or_default(),
            chunks,
            "picked up index published by another process"
        );
        *slot = Arc::clone(&refreshed);
        Ok(refreshed)
    }

    pub fn persona(&self) -> Persona {
        self.snapshot().persona.clone()
    }

    pub fn status(&self) -> IndexStatus {
        let published = self.snapshot();
        IndexStatus {
            built: published.index.is_some(),
            chunks: published.chunks,
        }
    }

    /// Rebuild the index from `record` and publish it. Returns the number
    /// of chunks indexed.
    ///
    /// On any failure the new generation is discarded and the previously
    /// published index keeps serving queries.
    pub async fn rebuild(&self, record: &KnowledgeRecord) -> Result<usize> {
        let _guard = self.rebuild_lock.lock().await;
        let started = Instant::now();

        let documents = build_documents(record)?;
        let chunks = chunk_documents(
            &documents,
            self.config.chunking.max_chars,
            self.config.chunking.overlap_chars,
        );
        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            model = self.embedder.model_name(),
            "rebuilding index"
        );

        let generation = self.backend.create_generation().await?;
        let built = match self.fill(generation.as_ref(), &chunks).await {
            Ok(()) => self.backend.publish(&generation).await,
            Err(e) => Err(e),
        };
        if let Err(e) = built {
            tracing::error!(error = %e, kind = e.kind(), "rebuild failed; keeping previous index");
            if let Err(discard_err) = self.backend.discard(&generation).await {
                tracing::warn!(error = %discard_err, "failed to discard partial generation");
            }
            return Err(e);
        }

        let published = Arc::new(Published {
            index: Some(generation),
            persona: record.persona(),
            chunks: chunks.len(),
        });
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = published;

        tracing::info!(
            chunks = chunks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index published"
        );
        Ok(chunks.len())
    }

    /// Reload the configured knowledge file and rebuild from it.
    pub async fn rebuild_from_file(&self) -> Result<usize> {
        let record = load_knowledge(&self.config.knowledge.path)?;
        self.rebuild(&record).await
    }

    /// Embed `chunks` in batches and write them into `index`.
    async fn fill(&self, index: &dyn VectorIndex, chunks: &[Chunk]) -> Result<()> {
        for batch in chunks.chunks(self.config.embedding.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                index
                    .upsert(&IndexEntry {
                        chunk: chunk.clone(),
                        vector,
                    })
                    .await?;
            }
        }
        Ok(())
    }

    /// Top-`k` chunks for `query` from the published index.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        let (_, result) = self.search(query, k).await?;
        Ok(result)
    }

    /// Retrieve against the current generation. An index error on a
    /// generation that has since been replaced is retried once against the
    /// replacement.
    async fn search(&self, query: &str, k: usize) -> Result<(Arc<Published>, RetrievalResult)> {
        let published = self.refresh().await?;
        let first = retrieve::retrieve(
            self.embedder.as_ref(),
            published.index.as_deref(),
            &self.config.retrieval,
            query,
            k,
        )
        .await;

        match first {
            Err(Error::Index(reason)) => {
                let current = self.refresh().await?;
                if current.generation() == published.generation() {
                    return Err(Error::Index(reason));
                }
                tracing::warn!(reason = %reason, "index generation replaced during query; retrying");
                let result = retrieve::retrieve(
                    self.embedder.as_ref(),
                    current.index.as_deref(),
                    &self.config.retrieval,
                    query,
                    k,
                )
                .await?;
                Ok((current, result))
            }
            other => Ok((published, other?)),
        }
    }

    /// Answer a question about the persona.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(Error::InvalidInput("question must not be empty".to_string()));
        }
        let retrieval = &self.config.retrieval;

        let refined = if retrieval.refine_query {
            let refined = orchestrator::refine_query(self.generator.as_ref(), question).await?;
            tracing::debug!(refined = %refined, "refined search query");
            Some(refined)
        } else {
            None
        };
        let search_query = refined.as_deref().unwrap_or(question);

        let (published, result) = self.search(search_query, retrieval.top_k).await?;
        let context = assemble(&result, retrieval.context_budget);
        tracing::info!(
            retrieved = result.len(),
            in_context = context.entries.len(),
            no_context = context.no_context,
            "context assembled"
        );

        let mut answer = orchestrator::answer(
            self.generator.as_ref(),
            &published.persona,
            question,
            &context,
        )
        .await?;
        answer.refined_query = refined;
        Ok(answer)
    }
}
