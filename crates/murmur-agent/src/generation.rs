//! Generative-model backend contract and implementations.
//!
//! - `HttpGenerationClient` calls an external model provider over HTTP.
//! - `ScriptedBackend` cycles through canned responses, for tests and for
//!   running without provider credentials.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use murmur_core::error::MurmurError;

/// Generative-model provider: prompt in, text out.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generate a completion for the prompt.
    async fn generate(&self, prompt: &str) -> Result<String, MurmurError>;

    /// True for deterministic non-model backends.
    fn scripted(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// HttpGenerationClient - external provider over HTTP
// ---------------------------------------------------------------------------

/// HTTP-backed generation client.
///
/// Sends `{"model", "prompt", "max_tokens", "temperature"}` to the configured
/// endpoint and expects `{"text": ...}` back.
#[derive(Debug, Clone)]
pub struct HttpGenerationClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    text: String,
}

impl HttpGenerationClient {
    pub fn new(
        endpoint: String,
        api_key: String,
        model: String,
        max_tokens: u32,
        temperature: f64,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
            max_tokens,
            temperature,
        }
    }
}

#[async_trait]
impl GenerationService for HttpGenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, MurmurError> {
        if prompt.is_empty() {
            return Err(MurmurError::Generation("Empty prompt".into()));
        }

        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MurmurError::Generation(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MurmurError::Generation(format!(
                "Provider returned {}",
                response.status()
            )));
        }

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| MurmurError::Generation(format!("Invalid response body: {}", e)))?;

        debug!(chars = parsed.text.len(), "Generation complete");
        Ok(parsed.text)
    }
}

// ---------------------------------------------------------------------------
// ScriptedBackend - deterministic canned responses
// ---------------------------------------------------------------------------

/// Backend that cycles deterministically through a fixed response list.
///
/// With an empty list every call returns the agent's sentinel value, which
/// keeps a credential-less deployment quiet rather than chatty.
pub struct ScriptedBackend {
    responses: Vec<String>,
    cursor: Mutex<usize>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            cursor: Mutex::new(0),
        }
    }

    /// A backend that always has nothing to add.
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl GenerationService for ScriptedBackend {
    async fn generate(&self, _prompt: &str) -> Result<String, MurmurError> {
        if self.responses.is_empty() {
            return Ok(crate::agent::NO_SUGGESTION_SENTINEL.to_string());
        }
        let mut cursor = self
            .cursor
            .lock()
            .map_err(|e| MurmurError::Generation(format!("Lock poisoned: {}", e)))?;
        let response = self.responses[*cursor % self.responses.len()].clone();
        *cursor += 1;
        Ok(response)
    }

    fn scripted(&self) -> bool {
        true
    }
}

/// Backend that fails every call. Test helper for failure semantics.
pub struct FailingBackend;

#[async_trait]
impl GenerationService for FailingBackend {
    async fn generate(&self, _prompt: &str) -> Result<String, MurmurError> {
        Err(MurmurError::Generation("scripted failure".into()))
    }

    fn scripted(&self) -> bool {
        true
    }
}

/// Pops responses in order and records the prompts it saw. Test helper.
pub struct RecordingBackend {
    responses: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingBackend {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl GenerationService for RecordingBackend {
    async fn generate(&self, prompt: &str) -> Result<String, MurmurError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let response = self
            .responses
            .lock()
            .map_err(|e| MurmurError::Generation(format!("Lock poisoned: {}", e)))?
            .pop_front()
            .unwrap_or_else(|| crate::agent::NO_SUGGESTION_SENTINEL.to_string());
        Ok(response)
    }

    // Reports as a live model so tests cover source classification.
}
