use std::env;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::cli::chat::error::GenerationError;

const DEFAULT_URL: &str = "http://localhost:11434/api/generate";
const DEFAULT_MODEL: &str = "gemma3:1b";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// A backend that turns a fully composed prompt into completion text.
#[async_trait]
pub trait GenerationBackend {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Client for a locally hosted Ollama `/api/generate` endpoint.
pub struct OllamaClient {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Build a client from explicit settings, falling back to the
    /// `OLLAMA_URL`, `OLLAMA_MODEL` and `OLLAMA_TIMEOUT_SECS` environment
    /// variables and then to the local defaults.
    pub fn new(url: Option<String>, model: Option<String>) -> Self {
        let url = url
            .or_else(|| env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        let model = model
            .or_else(|| env::var("OLLAMA_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let timeout = env::var("OLLAMA_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { url, model, client }
    }
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let request_body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        debug!(model = %self.model, url = %self.url, "sending generation request");

        let response = self
            .client
            .post(&self.url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    GenerationError::Connect(e.to_string())
                } else {
                    GenerationError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Request(format!("{status}: {error_text}")));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        response_json
            .get("response")
            .and_then(Value::as_str)
            .map(|text| text.to_string())
            .ok_or_else(|| GenerationError::Malformed("missing response field".to_string()))
    }
}
