//! Text-generation capability port and provider implementations.
//!
//! Defines the [`Generator`] trait consumed by query rewriting, answer
//! synthesis, and grammar analysis:
//! - **[`GeminiGenerator`]** — calls the Google Generative Language API.
//! - **[`OpenAiGenerator`]** — calls the OpenAI chat completions API.
//! - **[`OllamaGenerator`]** — calls a local Ollama instance's `/api/generate` endpoint.
//!
//! Each call is a single-shot prompt-to-text completion. Failures surface
//! as [`GenerationError`] without retrying.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;

/// Generation capability failure (outage, quota, malformed response).
#[derive(Debug)]
pub enum GenerationError {
    Config(String),
    Request(String),
    Api(String),
    InvalidResponse(String),
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::Config(e) => write!(f, "generation configuration error: {}", e),
            GenerationError::Request(e) => write!(f, "generation request failed: {}", e),
            GenerationError::Api(e) => write!(f, "generation API error: {}", e),
            GenerationError::InvalidResponse(e) => write!(f, "invalid generation response: {}", e),
        }
    }
}

impl std::error::Error for GenerationError {}

/// Single-shot text completion: prompt in, generated text out.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Instantiate the generator named by the configuration.
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn Generator>, GenerationError> {
    match config.provider.as_str() {
        "gemini" => Ok(Box::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Box::new(OpenAiGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => Err(GenerationError::Config(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, GenerationError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| GenerationError::Config(e.to_string()))
}

// ============ Gemini ============

/// Generator using the Google Generative Language API
/// (`POST /v1beta/models/{model}:generateContent`).
/// Requires the `GOOGLE_API_KEY` environment variable.
pub struct GeminiGenerator {
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| GenerationError::Config("generation.model required".to_string()))?;
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| GenerationError::Config("GOOGLE_API_KEY not set".to_string()))?;
        Ok(Self {
            model,
            api_key,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api(format!("{}: {}", status, body_text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        json.get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.pointer("/content/parts/0/text"))
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
            .ok_or_else(|| {
                GenerationError::InvalidResponse("missing candidate text".to_string())
            })
    }
}

// ============ OpenAI ============

/// Generator using the OpenAI chat completions API
/// (`POST /v1/chat/completions`). Requires `OPENAI_API_KEY`.
pub struct OpenAiGenerator {
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| GenerationError::Config("generation.model required".to_string()))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| GenerationError::Config("OPENAI_API_KEY not set".to_string()))?;
        Ok(Self {
            model,
            api_key,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api(format!("{}: {}", status, body_text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        json.pointer("/choices/0/message/content")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
            .ok_or_else(|| {
                GenerationError::InvalidResponse("missing completion text".to_string())
            })
    }
}

// ============ Ollama ============

/// Generator using a local Ollama instance (`POST /api/generate`).
pub struct OllamaGenerator {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| GenerationError::Config("generation.model required".to_string()))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            model,
            url,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                GenerationError::Request(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api(format!("{}: {}", status, body_text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        json.get("response")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
            .ok_or_else(|| {
                GenerationError::InvalidResponse("missing response field".to_string())
            })
    }
}
