#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use profile_rag::config::{
    ChunkingConfig, Config, DbConfig, IndexConfig, KnowledgeConfig, RetrievalConfig,
};
use profile_rag::embedding::EmbeddingGateway;
use profile_rag::error::{Error, Result};
use profile_rag::generation::GenerationGateway;
use profile_rag::index::{IndexBackend, MemoryBackend};
use profile_rag::knowledge::KnowledgeRecord;
use profile_rag::pipeline::Pipeline;

/// Terms the keyword embedder knows. One dimension each, so scores are
/// exact and collision-free.
const VOCAB: &[&str] = &[
    "title",
    "engineer",
    "astronaut",
    "rust",
    "kubernetes",
    "marathon",
    "university",
    "climbing",
    "certified",
    "mentor",
    "compiler",
    "remote",
];

/// Bag-of-words embedder over [`VOCAB`], with an optional failure switch
/// and per-call delay.
pub struct KeywordEmbedder {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        VOCAB
            .iter()
            .map(|term| tokens.iter().filter(|t| *t == term).count() as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingGateway for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        VOCAB.len()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Embedding("embedding service unreachable".to_string()));
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Generator that answers with the prompt it was given and records every
/// call.
pub struct EchoGenerator {
    pub prompts: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl EchoGenerator {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl GenerationGateway for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo-test"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Generation("quota exceeded".to_string()));
        }
        Ok(prompt.to_string())
    }
}

pub fn knowledge_json(title: &str) -> serde_json::Value {
    serde_json::json!({
        "basic": {
            "name": "Alex Rivera",
            "title": title,
            "location": "Lisbon, Portugal",
            "summary": "Builds reliable backend systems and developer tooling."
        },
        "skills": [
            { "category": "Languages", "items": ["Rust", "Go", "TypeScript"] },
            { "category": "Infrastructure", "items": ["Kubernetes", "Terraform"] }
        ],
        "experience": [
            {
                "role": "Staff Developer",
                "organization": "Acme Cloud",
                "start": "2021",
                "end": "present",
                "description": "Leads the platform group, fully remote.",
                "highlights": [
                    "Moved the deploy pipeline onto Kubernetes",
                    "Wrote an internal Rust compiler plugin for schema checks"
                ]
            },
            {
                "role": "Backend Developer",
                "organization": "Northwind",
                "start": "2017",
                "end": "2021",
                "highlights": ["Owned the billing service", "Cut p99 latency in half"]
            }
        ],
        "projects": [
            {
                "name": "tinyq",
                "description": "A small persistent queue written in Rust.",
                "technologies": ["Rust", "SQLite"]
            }
        ],
        "education": [
            { "institution": "University of Porto", "degree": "MSc", "field": "Computer Science", "end": "2017" }
        ],
        "certifications": [
            { "name": "Certified Kubernetes Administrator", "issuer": "CNCF", "date": "2022" }
        ],
        "interests": ["Rock climbing", "Trail running"],
        "goals": ["Finish a marathon under four hours", "Mentor two junior developers"],
        "faqs": [
            { "q": "Are you open to relocation?", "a": "No, only remote roles." }
        ]
    })
}

pub fn knowledge(title: &str) -> KnowledgeRecord {
    serde_json::from_value(knowledge_json(title)).unwrap()
}

pub fn write_knowledge(path: &Path, title: &str) {
    std::fs::write(
        path,
        serde_json::to_string_pretty(&knowledge_json(title)).unwrap(),
    )
    .unwrap();
}

pub fn test_config(dir: &Path) -> Config {
    Config {
        knowledge: KnowledgeConfig {
            path: dir.join("knowledge.json"),
        },
        db: DbConfig {
            path: dir.join("index.sqlite"),
        },
        index: IndexConfig {
            backend: "memory".to_string(),
        },
        chunking: ChunkingConfig {
            max_chars: 160,
            overlap_chars: 30,
        },
        retrieval: RetrievalConfig::default(),
        embedding: Default::default(),
        generation: Default::default(),
        server: Default::default(),
        logging: Default::default(),
    }
}

pub async fn pipeline_with(
    config: Config,
    embedder: Arc<KeywordEmbedder>,
    generator: Arc<EchoGenerator>,
    backend: Arc<dyn IndexBackend>,
) -> Pipeline {
    Pipeline::open(config, embedder, generator, backend, &knowledge("Senior Engineer"))
        .await
        .unwrap()
}

pub async fn memory_pipeline(
    config: Config,
) -> (Pipeline, Arc<KeywordEmbedder>, Arc<EchoGenerator>) {
    let embedder = Arc::new(KeywordEmbedder::new());
    let generator = Arc::new(EchoGenerator::new());
    let pipeline = pipeline_with(
        config,
        embedder.clone(),
        generator.clone(),
        Arc::new(MemoryBackend::new()),
    )
    .await;
    (pipeline, embedder, generator)
}
