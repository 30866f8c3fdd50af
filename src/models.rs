//! Core data models that flow through the build and query pipelines.
//!
//! Build time: [`Document`] → [`Chunk`] → [`IndexEntry`].
//! Query time: [`IndexMatch`] → [`RetrievalResult`] → [`AssembledContext`] → [`Answer`].

use crate::knowledge::Category;

/// One knowledge category rendered to plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub doc_type: Category,
    pub text: String,
}

/// A contiguous span of a document's text, the unit stored in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Entry identity (UUID v4). Differs between rebuilds.
    pub id: String,
    /// Content-derived identity, stable across rebuilds. Used for dedup.
    pub source_id: String,
    pub doc_type: Category,
    /// Position within the parent document, contiguous from 0.
    pub chunk_index: usize,
    pub text: String,
    /// Number of leading characters repeated from the previous chunk.
    pub overlap: usize,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// A chunk paired with its embedding, as persisted by a vector index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A chunk returned by a similarity query.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ranked, deduplicated matches for one query.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub matches: Vec<IndexMatch>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }
}

/// One retrieved chunk as it appears in the assembled context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    /// 1-based relevance rank.
    pub rank: usize,
    pub doc_type: Category,
    pub text: String,
    pub score: f32,
}

/// The bounded context block handed to the generation step.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    pub entries: Vec<ContextEntry>,
    /// Set when nothing was retrieved (or nothing fit the budget).
    pub no_context: bool,
}

/// A generated answer plus the context it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub context_used: String,
    pub refined_query: Option<String>,
    pub no_context: bool,
}
