//! Context assembly: turn ranked matches into one bounded text block.
//!
//! Each retrieved chunk becomes an entry of the form
//!
//! ```text
//! [1] (experience)
//! Senior Engineer at Acme (2021 - present) ...
//! ```
//!
//! and entries are joined by a blank line in rank order. Chunks are
//! included whole or not at all; assembly stops at the first chunk that
//! would push the text past the character budget.

use crate::models::{AssembledContext, ContextEntry, RetrievalResult};

/// Shown as `context_used` when nothing was retrieved.
pub const NO_CONTEXT_MARKER: &str = "No relevant context found.";

const ENTRY_SEPARATOR: &str = "\n\n";

/// Assemble `result` into a context block of at most `budget` characters.
pub fn assemble(result: &RetrievalResult, budget: usize) -> AssembledContext {
    let mut text = String::new();
    let mut used = 0;
    let mut entries = Vec::new();

    for (i, m) in result.matches.iter().enumerate() {
        let rank = i + 1;
        let block = format!("[{}] ({})\n{}", rank, m.chunk.doc_type, m.chunk.text);
        let separator = if entries.is_empty() { "" } else { ENTRY_SEPARATOR };
        let cost = separator.chars().count() + block.chars().count();

        if used + cost > budget {
            break;
        }

        text.push_str(separator);
        text.push_str(&block);
        used += cost;
        entries.push(ContextEntry {
            rank,
            doc_type: m.chunk.doc_type,
            text: m.chunk.text.clone(),
            score: m.score,
        });
    }

    AssembledContext {
        no_context: entries.is_empty(),
        text,
        entries,
    }
}

impl AssembledContext {
    /// What the caller reports as the context behind an answer.
    pub fn context_used(&self) -> &str {
        if self.no_context {
            NO_CONTEXT_MARKER
        } else {
            &self.text
        }
    }
}
