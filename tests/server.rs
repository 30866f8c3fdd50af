mod common;

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

use profile_rag::context::NO_CONTEXT_MARKER;
use profile_rag::pipeline::Pipeline;
use profile_rag::server;

use common::{memory_pipeline, test_config, write_knowledge};

struct TestServer {
    base: String,
    client: reqwest::Client,
    _tmp: TempDir,
}

impl TestServer {
    async fn post(&self, path: &str, body: Value, session: Option<&str>) -> Value {
        let mut request = self.client.post(format!("{}{}", self.base, path)).json(&body);
        if let Some(session) = session {
            request = request.header(server::SESSION_HEADER, session);
        }
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }

    async fn get(&self, path: &str) -> Value {
        let response = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }
}

async fn start(pipeline: Pipeline, tmp: TempDir) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let pipeline = Arc::new(pipeline);
    tokio::spawn(async move {
        server::serve(listener, pipeline).await.unwrap();
    });
    TestServer {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        _tmp: tmp,
    }
}

async fn setup() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_knowledge(&config.knowledge.path, "Senior Engineer");
    let (pipeline, _, _) = memory_pipeline(config).await;
    start(pipeline, tmp).await
}

#[tokio::test]
async fn test_health_before_and_after_rebuild() {
    let server = setup().await;

    let health = server.get("/api/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(health["index_built"], false);
    assert_eq!(health["indexed_chunks"], 0);
    assert_eq!(health["generation_credentials"], false);

    let rebuilt = server.post("/api/rebuild", json!({}), None).await;
    assert_eq!(rebuilt["success"], true);
    let chunks = rebuilt["chunks"].as_u64().unwrap();
    assert!(chunks > 0);

    let health = server.get("/api/health").await;
    assert_eq!(health["index_built"], true);
    assert_eq!(health["indexed_chunks"].as_u64().unwrap(), chunks);
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let server = setup().await;
    let first = server.post("/api/rebuild", json!({}), None).await;
    let second = server.post("/api/rebuild", json!({}), None).await;
    assert_eq!(first["success"], true);
    assert_eq!(first["chunks"], second["chunks"]);
}

#[tokio::test]
async fn test_chat_answers_with_context() {
    let server = setup().await;
    server.post("/api/rebuild", json!({}), None).await;

    let body = server
        .post(
            "/api/chat",
            json!({ "message": "What is your title?" }),
            Some("visitor-42"),
        )
        .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["session_id"], "visitor-42");
    assert!(body["response"].as_str().unwrap().contains("Engineer"));
    assert!(body["context_used"]
        .as_str()
        .unwrap()
        .starts_with("[1] (basic)"));
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_chat_without_index_reports_no_context() {
    let server = setup().await;
    let body = server
        .post("/api/chat", json!({ "message": "Where do you live?" }), None)
        .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["context_used"], NO_CONTEXT_MARKER);
    assert!(!body["session_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_requires_message() {
    let server = setup().await;
    for payload in [json!({ "message": "" }), json!({ "message": "   " }), json!({})] {
        let body = server.post("/api/chat", payload, Some("s1")).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Message is required");
        assert_eq!(body["session_id"], "s1");
    }
}

#[tokio::test]
async fn test_rebuild_failure_keeps_serving() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_knowledge(&config.knowledge.path, "Senior Engineer");
    let knowledge_path = config.knowledge.path.clone();
    let (pipeline, _, _) = memory_pipeline(config).await;
    let server = start(pipeline, tmp).await;

    let first = server.post("/api/rebuild", json!({}), None).await;
    assert_eq!(first["success"], true);

    std::fs::write(&knowledge_path, "{ not json").unwrap();
    let failed = server.post("/api/rebuild", json!({}), None).await;
    assert_eq!(failed["success"], false);
    assert!(failed["error"].as_str().unwrap().contains("knowledge"));

    let health = server.get("/api/health").await;
    assert_eq!(health["index_built"], true);
    assert_eq!(health["indexed_chunks"], first["chunks"]);
}
