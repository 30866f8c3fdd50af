mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use profile_rag::chunk::chunk_document;
use profile_rag::config::Config;
use profile_rag::context::NO_CONTEXT_MARKER;
use profile_rag::documents::build_documents;
use profile_rag::error::Error;
use profile_rag::index::{SqliteBackend, VectorIndex};
use profile_rag::knowledge::{Category, KnowledgeRecord};
use profile_rag::models::RetrievalResult;
use profile_rag::pipeline::Pipeline;
use tempfile::TempDir;

use common::{
    knowledge, memory_pipeline, pipeline_with, test_config, EchoGenerator, KeywordEmbedder,
};

fn ranking(result: &RetrievalResult) -> Vec<(String, usize, f32)> {
    result
        .matches
        .iter()
        .map(|m| (m.chunk.source_id.clone(), m.chunk.chunk_index, m.score))
        .collect()
}

#[tokio::test]
async fn test_title_question_ranks_basic_first() {
    let tmp = TempDir::new().unwrap();
    let (pipeline, _, generator) = memory_pipeline(test_config(tmp.path())).await;
    pipeline.rebuild(&knowledge("Senior Engineer")).await.unwrap();

    let result = pipeline.retrieve("What is your title?", 4).await.unwrap();
    assert!(!result.is_empty());
    assert_eq!(result.matches[0].chunk.doc_type, Category::Basic);
    assert!(result.matches[0].chunk.text.contains("Title: Senior Engineer"));

    let answer = pipeline.ask("What is your title?").await.unwrap();
    assert!(!answer.no_context);
    assert!(answer.text.contains("Engineer"));
    assert!(answer.context_used.starts_with("[1] (basic)"));
    assert_eq!(generator.calls(), 1);
    assert!(generator.last_prompt().contains("Alex Rivera, Senior Engineer"));
}

#[tokio::test]
async fn test_unbuilt_index_answers_without_context() {
    let tmp = TempDir::new().unwrap();
    let (pipeline, _, generator) = memory_pipeline(test_config(tmp.path())).await;

    let status = pipeline.status();
    assert!(!status.built);
    assert_eq!(status.chunks, 0);

    let answer = pipeline.ask("What is your favourite colour?").await.unwrap();
    assert!(answer.no_context);
    assert_eq!(answer.context_used, NO_CONTEXT_MARKER);
    assert_eq!(generator.calls(), 1);
    assert!(generator.last_prompt().contains("not available"));
}

#[tokio::test]
async fn test_chunk_count_and_repeat_rebuild() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let (pipeline, _, _) = memory_pipeline(config.clone()).await;
    let record = knowledge("Senior Engineer");

    let expected: usize = build_documents(&record)
        .unwrap()
        .iter()
        .map(|d| {
            chunk_document(d, config.chunking.max_chars, config.chunking.overlap_chars).len()
        })
        .sum();

    let first = pipeline.rebuild(&record).await.unwrap();
    assert_eq!(first, expected);
    assert_eq!(pipeline.status().chunks, expected);

    let queries = ["title", "rust compiler", "kubernetes", "marathon", "remote"];
    let mut before = Vec::new();
    for q in queries {
        before.push(ranking(&pipeline.retrieve(q, 4).await.unwrap()));
    }

    let second = pipeline.rebuild(&record).await.unwrap();
    assert_eq!(second, first);
    for (q, expected) in queries.iter().zip(before) {
        assert_eq!(ranking(&pipeline.retrieve(q, 4).await.unwrap()), expected);
    }
}

#[tokio::test]
async fn test_embedding_failure_propagates_without_generation() {
    let tmp = TempDir::new().unwrap();
    let (pipeline, embedder, generator) = memory_pipeline(test_config(tmp.path())).await;
    pipeline.rebuild(&knowledge("Senior Engineer")).await.unwrap();

    embedder.set_failing(true);
    let err = pipeline.ask("What is your title?").await.unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
    assert_eq!(err.kind(), "embedding_error");
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_generation_failure_propagates() {
    let tmp = TempDir::new().unwrap();
    let (pipeline, _, generator) = memory_pipeline(test_config(tmp.path())).await;
    pipeline.rebuild(&knowledge("Senior Engineer")).await.unwrap();

    generator.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    let err = pipeline.ask("What is your title?").await.unwrap_err();
    assert!(matches!(err, Error::Generation(_)));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_index() {
    let tmp = TempDir::new().unwrap();
    let (pipeline, embedder, _) = memory_pipeline(test_config(tmp.path())).await;
    let chunks = pipeline.rebuild(&knowledge("Senior Engineer")).await.unwrap();

    embedder.set_failing(true);
    let err = pipeline.rebuild(&knowledge("Astronaut")).await.unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
    embedder.set_failing(false);

    let status = pipeline.status();
    assert!(status.built);
    assert_eq!(status.chunks, chunks);

    let result = pipeline.retrieve("title", 1).await.unwrap();
    assert!(result.matches[0].chunk.text.contains("Senior Engineer"));
    assert_eq!(pipeline.persona().title, "Senior Engineer");
}

#[tokio::test]
async fn test_readers_see_old_or_new_index_during_rebuild() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.embedding.batch_size = 1;

    let embedder = Arc::new(KeywordEmbedder::slow(Duration::from_millis(5)));
    let generator = Arc::new(EchoGenerator::new());
    let pipeline = Arc::new(
        pipeline_with(
            config,
            embedder,
            generator,
            Arc::new(profile_rag::index::MemoryBackend::new()),
        )
        .await,
    );
    let old_chunks = pipeline.rebuild(&knowledge("Senior Engineer")).await.unwrap();

    let rebuilding = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.rebuild(&knowledge("Astronaut")).await })
    };

    let mut saw_old = false;
    while !rebuilding.is_finished() {
        let status = pipeline.status();
        assert!(status.built);
        let result = pipeline.retrieve("title", 1).await.unwrap();
        let top = &result.matches[0].chunk.text;
        let old = top.contains("Senior Engineer");
        let new = top.contains("Astronaut");
        assert!(old ^ new, "top chunk must come from exactly one build: {}", top);
        saw_old |= old;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let new_chunks = rebuilding.await.unwrap().unwrap();
    assert!(saw_old);

    let result = pipeline.retrieve("title", 1).await.unwrap();
    assert!(result.matches[0].chunk.text.contains("Astronaut"));
    assert_eq!(pipeline.status().chunks, new_chunks);
    assert_eq!(pipeline.persona().title, "Astronaut");
    assert!(old_chunks > 0);
}

/// Every distinct `source_id` a rebuild of `record` would index.
fn indexed_sources(config: &Config, record: &KnowledgeRecord) -> HashSet<String> {
    build_documents(record)
        .unwrap()
        .iter()
        .flat_map(|d| {
            chunk_document(d, config.chunking.max_chars, config.chunking.overlap_chars)
        })
        .map(|c| c.source_id)
        .collect()
}

#[tokio::test]
async fn test_retrieval_has_unique_sources() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let (pipeline, _, _) = memory_pipeline(config.clone()).await;
    let record = knowledge("Senior Engineer");
    pipeline.rebuild(&record).await.unwrap();

    let k = pipeline.status().chunks + 5;
    let result = pipeline.retrieve("rust kubernetes remote", k).await.unwrap();
    let ids: HashSet<String> = result
        .matches
        .iter()
        .map(|m| m.chunk.source_id.clone())
        .collect();
    assert_eq!(ids.len(), result.len());
    // A `k` past the index size returns every indexed source.
    assert_eq!(ids, indexed_sources(&config, &record));
    for pair in result.matches.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_k_above_candidate_k_returns_all_sources() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.retrieval.candidate_k = 2;
    let (pipeline, _, _) = memory_pipeline(config.clone()).await;
    let record = knowledge("Senior Engineer");
    pipeline.rebuild(&record).await.unwrap();

    let expected = indexed_sources(&config, &record);
    assert!(expected.len() > 2);

    let result = pipeline.retrieve("title", expected.len()).await.unwrap();
    assert_eq!(result.len(), expected.len());
    let ids: HashSet<String> = result
        .matches
        .iter()
        .map(|m| m.chunk.source_id.clone())
        .collect();
    assert_eq!(ids, expected);

    let result = pipeline.retrieve("title", 3).await.unwrap();
    assert_eq!(result.len(), 3);
}

#[tokio::test]
async fn test_invalid_input_rejected() {
    let tmp = TempDir::new().unwrap();
    let (pipeline, _, generator) = memory_pipeline(test_config(tmp.path())).await;
    assert!(matches!(
        pipeline.ask("   ").await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        pipeline.retrieve("title", 0).await,
        Err(Error::InvalidInput(_))
    ));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_context_budget_limits_context() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.retrieval.context_budget = 200;
    let (pipeline, _, _) = memory_pipeline(config).await;
    pipeline.rebuild(&knowledge("Senior Engineer")).await.unwrap();

    let answer = pipeline.ask("rust kubernetes remote title").await.unwrap();
    assert!(!answer.no_context);
    assert!(answer.context_used.chars().count() <= 200);
}

#[tokio::test]
async fn test_refine_query_uses_generator_first() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.retrieval.refine_query = true;
    let (pipeline, _, generator) = memory_pipeline(config).await;
    pipeline.rebuild(&knowledge("Senior Engineer")).await.unwrap();

    let answer = pipeline.ask("So what's your title?").await.unwrap();
    assert_eq!(generator.calls(), 2);
    let refined = answer.refined_query.expect("refined query recorded");
    assert!(refined.contains("So what's your title?"));
}

#[tokio::test]
async fn test_sqlite_index_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());

    let before = {
        let backend = Arc::new(SqliteBackend::open(&config.db.path).await.unwrap());
        let pipeline = pipeline_with(
            config.clone(),
            Arc::new(KeywordEmbedder::new()),
            Arc::new(EchoGenerator::new()),
            backend,
        )
        .await;
        pipeline.rebuild(&knowledge("Senior Engineer")).await.unwrap();
        ranking(&pipeline.retrieve("rust title", 4).await.unwrap())
    };

    let backend = Arc::new(SqliteBackend::open(&config.db.path).await.unwrap());
    let pipeline = pipeline_with(
        config,
        Arc::new(KeywordEmbedder::new()),
        Arc::new(EchoGenerator::new()),
        backend,
    )
    .await;
    assert!(pipeline.status().built);
    assert_eq!(ranking(&pipeline.retrieve("rust title", 4).await.unwrap()), before);
}

async fn sqlite_pipeline(config: Config, embedder: Arc<KeywordEmbedder>) -> Pipeline {
    let backend = Arc::new(SqliteBackend::open(&config.db.path).await.unwrap());
    pipeline_with(config, embedder, Arc::new(EchoGenerator::new()), backend).await
}

#[tokio::test]
async fn test_sqlite_pipeline_follows_rebuilds_from_another_process() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());

    let server = sqlite_pipeline(config.clone(), Arc::new(KeywordEmbedder::new())).await;
    server.rebuild(&knowledge("Senior Engineer")).await.unwrap();
    assert!(!server.retrieve("title", 4).await.unwrap().is_empty());

    // A second handle on the same file, like `prag rebuild` next to `prag serve`.
    let cli = sqlite_pipeline(config, Arc::new(KeywordEmbedder::new())).await;
    cli.rebuild(&knowledge("Astronaut")).await.unwrap();
    let chunks = cli.rebuild(&knowledge("Astronaut")).await.unwrap();

    let result = server.retrieve("title", 4).await.unwrap();
    assert!(!result.is_empty());
    assert!(result.matches[0].chunk.text.contains("Astronaut"));
    assert_eq!(server.status().chunks, chunks);

    let answer = server.ask("What is your title?").await.unwrap();
    assert!(!answer.no_context);
    assert!(answer.context_used.contains("Astronaut"));
}

#[tokio::test]
async fn test_sqlite_snapshot_outlives_two_rebuilds() {
    let tmp = TempDir::new().unwrap();
    let pipeline =
        sqlite_pipeline(test_config(tmp.path()), Arc::new(KeywordEmbedder::new())).await;
    pipeline.rebuild(&knowledge("Senior Engineer")).await.unwrap();

    let held = pipeline.snapshot();
    pipeline.rebuild(&knowledge("Astronaut")).await.unwrap();
    pipeline.rebuild(&knowledge("Astronaut")).await.unwrap();

    let index = held.index.as_ref().unwrap();
    let matches = index
        .query(&KeywordEmbedder::vector("title"), 1)
        .await
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert!(matches[0].chunk.text.contains("Senior Engineer"));
}

#[tokio::test]
async fn test_sqlite_readers_see_old_or_new_index_during_rebuilds() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.embedding.batch_size = 1;

    let embedder = Arc::new(KeywordEmbedder::slow(Duration::from_millis(5)));
    let pipeline = Arc::new(sqlite_pipeline(config, embedder).await);
    pipeline.rebuild(&knowledge("Senior Engineer")).await.unwrap();

    let rebuilding = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            pipeline.rebuild(&knowledge("Astronaut")).await?;
            pipeline.rebuild(&knowledge("Senior Engineer")).await
        })
    };

    let mut reads = 0;
    while !rebuilding.is_finished() {
        let result = pipeline.retrieve("title", 1).await.unwrap();
        assert!(!result.is_empty(), "reader lost its index mid-rebuild");
        let top = &result.matches[0].chunk.text;
        assert!(
            top.contains("Senior Engineer") ^ top.contains("Astronaut"),
            "top chunk must come from exactly one build: {}",
            top
        );
        reads += 1;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    rebuilding.await.unwrap().unwrap();
    assert!(reads > 0);

    let result = pipeline.retrieve("title", 1).await.unwrap();
    assert!(result.matches[0].chunk.text.contains("Senior Engineer"));
}
