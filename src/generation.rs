//! Generation gateway abstraction and implementations.
//!
//! The pipeline calls [`GenerationGateway::generate`] once per question with
//! a fully assembled prompt and treats the model as a black box. Providers:
//!
//! | Config Value | Gateway | Credential |
//! |-------------|---------|------------|
//! | `"disabled"` | [`DisabledGenerator`] | none |
//! | `"openai"` | [`OpenAIGenerator`] (chat completions) | `OPENAI_API_KEY` |
//! | `"gemini"` | [`GeminiGenerator`] (`generateContent`) | `GEMINI_API_KEY` |
//! | `"ollama"` | [`OllamaGenerator`] (`/api/generate`) | none |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::http;

/// Prompt → completion text.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Whether the credential for the configured provider is present.
///
/// A static readiness check; no request is made.
pub fn credentials_present(config: &GenerationConfig) -> bool {
    match config.provider.as_str() {
        "openai" => http::env_key("OPENAI_API_KEY").is_some(),
        "gemini" => http::env_key("GEMINI_API_KEY").is_some(),
        "ollama" => true,
        _ => false,
    }
}

/// Create the [`GenerationGateway`] selected by configuration.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerationGateway>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => Err(Error::Configuration(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl GenerationGateway for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(Error::Generation(
            "generation provider is disabled; set [generation] provider in config".to_string(),
        ))
    }
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = http::env_key("OPENAI_API_KEY").ok_or_else(|| {
            Error::Configuration("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self {
            model: require_model(config, "OpenAI")?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs).map_err(Error::Configuration)?,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerationGateway for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| Error::Generation(format!("failed to encode request: {}", e)))?;
        let auth = format!("Bearer {}", self.api_key);
        let json = http::post_json(
            &self.client,
            &format!("{}/chat/completions", self.url.trim_end_matches('/')),
            &[("Authorization", auth.as_str())],
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await
        .map_err(Error::Generation)?;

        let parsed: ChatResponse = serde_json::from_value(json)
            .map_err(|e| Error::Generation(format!("malformed OpenAI response: {}", e)))?;
        let text = parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default();
        non_empty(text, "OpenAI")
    }
}

// ============ Gemini ============

pub struct GeminiGenerator {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = http::env_key("GEMINI_API_KEY").ok_or_else(|| {
            Error::Configuration("GEMINI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self {
            model: require_model(config, "Gemini")?
                .trim_start_matches("models/")
                .to_string(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs).map_err(Error::Configuration)?,
        })
    }
}

#[async_trait]
impl GenerationGateway for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            }
        });
        let json = http::post_json(
            &self.client,
            &format!(
                "{}/models/{}:generateContent",
                self.url.trim_end_matches('/'),
                self.model
            ),
            &[("x-goog-api-key", self.api_key.as_str())],
            &body,
            self.max_retries,
            "Gemini",
        )
        .await
        .map_err(Error::Generation)?;

        let text = json
            .pointer("/candidates/0/content/parts")
            .and_then(|p| p.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<String>()
            })
            .unwrap_or_default();
        non_empty(text, "Gemini")
    }
}

// ============ Ollama ============

pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: require_model(config, "Ollama")?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs).map_err(Error::Configuration)?,
        })
    }
}

#[async_trait]
impl GenerationGateway for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let json = http::post_json(
            &self.client,
            &format!("{}/api/generate", self.url.trim_end_matches('/')),
            &[],
            &body,
            self.max_retries,
            "Ollama",
        )
        .await
        .map_err(Error::Generation)?;

        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string();
        non_empty(text, "Ollama")
    }
}

fn require_model(config: &GenerationConfig, provider: &str) -> Result<String> {
    config.model.clone().ok_or_else(|| {
        Error::Configuration(format!(
            "generation.model required for {} provider",
            provider
        ))
    })
}

fn non_empty(text: String, service: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::Generation(format!(
            "{} returned an empty response",
            service
        )));
    }
    Ok(trimmed.to_string())
}
