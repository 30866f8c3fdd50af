//! CLI command implementations. Results go to stdout.

use anyhow::Result;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::documents::build_documents;
use crate::index::SqliteBackend;
use crate::knowledge::load_knowledge;
use crate::pipeline::Pipeline;

/// Create the index database and its tables.
pub async fn run_init(config: &Config) -> Result<()> {
    if config.index.backend == "memory" {
        println!("Index backend is 'memory'; nothing to initialize.");
        return Ok(());
    }
    SqliteBackend::open(&config.db.path).await?;
    println!("Database initialized at {}", config.db.path.display());
    Ok(())
}

/// Rebuild the index from the knowledge file.
pub async fn run_rebuild(config: &Config) -> Result<()> {
    let pipeline = Pipeline::from_config(config.clone()).await?;
    let chunks = pipeline.rebuild_from_file().await?;
    println!("rebuild");
    println!("  knowledge: {}", config.knowledge.path.display());
    println!("  model: {}", config.embedding.model.as_deref().unwrap_or(&config.embedding.provider));
    println!("  chunks indexed: {}", chunks);
    Ok(())
}

/// Print the chunks retrieved for `query`.
pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let pipeline = Pipeline::from_config(config.clone()).await?;
    if !pipeline.status().built {
        println!("Index has not been built. Run `prag rebuild` first.");
        return Ok(());
    }

    let result = pipeline
        .retrieve(query, k.unwrap_or(config.retrieval.top_k))
        .await?;
    if result.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, m) in result.matches.iter().enumerate() {
        println!(
            "{}. [{:.3}] ({}) {} #{}",
            i + 1,
            m.score,
            m.chunk.doc_type,
            m.chunk.source_id,
            m.chunk.chunk_index
        );
        println!("    {}", snippet(&m.chunk.text, 160));
        println!();
    }
    Ok(())
}

/// Answer one question and print the answer with its context.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let pipeline = Pipeline::from_config(config.clone()).await?;
    let answer = pipeline.ask(question).await?;

    if let Some(refined) = &answer.refined_query {
        println!("refined query: {}", refined);
        println!();
    }
    println!("{}", answer.text);
    println!();
    println!("--- context ---");
    println!("{}", answer.context_used);
    Ok(())
}

/// Dry run: show documents and chunk counts without embedding anything.
pub fn run_chunks(config: &Config) -> Result<()> {
    let record = load_knowledge(&config.knowledge.path)?;
    let documents = build_documents(&record)?;

    println!("chunks (dry-run)");
    let mut total = 0;
    for doc in &documents {
        let chunks = chunk_document(
            doc,
            config.chunking.max_chars,
            config.chunking.overlap_chars,
        );
        println!(
            "  {:<15} {:>6} chars  {:>4} chunks",
            doc.doc_type.as_str(),
            doc.text.chars().count(),
            chunks.len()
        );
        total += chunks.len();
    }
    println!("  documents: {}", documents.len());
    println!("  total chunks: {}", total);
    Ok(())
}

/// Print an overview of the knowledge file.
pub fn run_summary(config: &Config) -> Result<()> {
    let record = load_knowledge(&config.knowledge.path)?;
    println!("{}", record.summary());
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_flattens_and_truncates() {
        assert_eq!(snippet("a\n\nb   c", 10), "a b c");
        assert_eq!(snippet("abcdefgh", 3), "abc...");
    }
}
