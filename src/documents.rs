//! Knowledge record → ordered documents.

use crate::error::Result;
use crate::knowledge::{Category, KnowledgeRecord, RenderText};
use crate::models::Document;

/// Render every present, non-empty category as one [`Document`].
///
/// Output order follows [`Category::ALL`], so the result is a pure,
/// deterministic function of the record. A record whose `basic` identity
/// fields are missing is rejected rather than rendered with placeholders.
pub fn build_documents(record: &KnowledgeRecord) -> Result<Vec<Document>> {
    record.validate()?;

    let docs = Category::ALL
        .into_iter()
        .filter_map(|category| record.section(category))
        .map(|section| Document {
            doc_type: section.category(),
            text: section.render(),
        })
        .collect();

    Ok(docs)
}
