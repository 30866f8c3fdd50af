//! Boundary-aware text chunker with overlap.
//!
//! Splits a [`Document`] into [`Chunk`]s of at most `max_chars` characters.
//! Splitting prefers the coarsest boundary that works: paragraphs (`\n\n`),
//! then lines, then sentence ends, then whitespace, and only as a last
//! resort a hard character window. Separators stay attached to the piece
//! before them, so the pieces tile the source text exactly.
//!
//! Consecutive chunks share up to `overlap_chars` characters: every chunk
//! after the first starts with the tail of the previous window, trimmed
//! forward to a word boundary when the tail contains one. The number of
//! repeated characters is recorded in [`Chunk::overlap`], which makes the
//! split lossless:
//!
//! ```text
//! chunks[0].text + chunks[1].text[overlap₁..] + … == document.text
//! ```
//!
//! Each chunk gets a random UUID (entry identity), a SHA-256 hash of its
//! text, and a content-derived `source_id` that stays stable across
//! rebuilds.

use sha2::{Digest, Sha256};
use std::ops::Range;
use uuid::Uuid;

use crate::models::{Chunk, Document};

/// Split boundaries, coarsest first.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", "; ", " "];

/// Split one document into chunks. Returns chunks with contiguous indices
/// starting at 0.
pub fn chunk_document(doc: &Document, max_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    let text = doc.text.as_str();

    if text.chars().count() <= max_chars {
        return vec![make_chunk(doc, 0, text, 0)];
    }

    let overlap = overlap_chars.min(max_chars - 1);
    let window_limit = max_chars - overlap;

    let mut spans = Vec::new();
    split_spans(text, 0, window_limit, SEPARATORS, &mut spans);
    let windows = merge_spans(text, &spans, window_limit);

    let mut chunks = Vec::with_capacity(windows.len());
    for (i, window) in windows.iter().enumerate() {
        let start = if i == 0 {
            window.start
        } else {
            overlap_start(text, &windows[i - 1], overlap)
        };
        let repeated = text[start..window.start].chars().count();
        chunks.push(make_chunk(doc, i, &text[start..window.end], repeated));
    }
    chunks
}

/// Chunk every document, preserving document order.
pub fn chunk_documents(docs: &[Document], max_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    docs.iter()
        .flat_map(|d| chunk_document(d, max_chars, overlap_chars))
        .collect()
}

/// Recursively split `text` (which starts at byte `offset` of the document)
/// into spans of at most `limit` characters.
fn split_spans(
    text: &str,
    offset: usize,
    limit: usize,
    separators: &[&str],
    out: &mut Vec<Range<usize>>,
) {
    if text.is_empty() {
        return;
    }
    if text.chars().count() <= limit {
        out.push(offset..offset + text.len());
        return;
    }

    let Some((sep, finer)) = separators.split_first() else {
        hard_split(text, offset, limit, out);
        return;
    };

    let mut consumed = 0;
    for piece in text.split_inclusive(sep) {
        split_spans(piece, offset + consumed, limit, finer, out);
        consumed += piece.len();
    }
}

/// Fixed character windows, used when no separator applies.
fn hard_split(text: &str, offset: usize, limit: usize, out: &mut Vec<Range<usize>>) {
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == limit {
            out.push(offset + start..offset + idx);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(offset + start..offset + text.len());
    }
}

/// Greedily join adjacent spans while the joined span fits in `limit`.
fn merge_spans(text: &str, spans: &[Range<usize>], limit: usize) -> Vec<Range<usize>> {
    let mut windows = Vec::new();
    let mut current: Option<(Range<usize>, usize)> = None;

    for span in spans {
        let len = text[span.clone()].chars().count();
        current = match current.take() {
            Some((range, chars)) if chars + len <= limit => Some((range.start..span.end, chars + len)),
            Some((range, _)) => {
                windows.push(range);
                Some((span.clone(), len))
            }
            None => Some((span.clone(), len)),
        };
    }
    if let Some((range, _)) = current {
        windows.push(range);
    }
    windows
}

/// Byte offset where the overlap taken from `prev` begins.
fn overlap_start(text: &str, prev: &Range<usize>, overlap: usize) -> usize {
    if overlap == 0 {
        return prev.end;
    }

    let prev_text = &text[prev.clone()];
    let skip = prev_text.chars().count().saturating_sub(overlap);
    let tail_start = prev.start
        + prev_text
            .char_indices()
            .nth(skip)
            .map(|(i, _)| i)
            .unwrap_or(prev_text.len());

    if tail_start == prev.start || text[..tail_start].ends_with(char::is_whitespace) {
        return tail_start;
    }

    // Don't open the next chunk in the middle of a word.
    let tail = &text[tail_start..prev.end];
    match tail.char_indices().find(|(_, c)| c.is_whitespace()) {
        Some((i, c)) if tail_start + i + c.len_utf8() < prev.end => tail_start + i + c.len_utf8(),
        _ => tail_start,
    }
}

fn make_chunk(doc: &Document, index: usize, text: &str, overlap: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source_id: format!("{}-{}", doc.doc_type, &hash[..16]),
        doc_type: doc.doc_type,
        chunk_index: index,
        text: text.to_string(),
        overlap,
        hash,
    }
}
