//! External service port traits (LLM).

use async_trait::async_trait;

use super::error::LlmError;

/// Output contract for a completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Free text, returned verbatim.
    Text,
    /// The response must parse as JSON. The client strips surrounding code
    /// fences and validates before returning.
    Json,
}

/// A single text completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub mode: CompletionMode,
}

impl CompletionRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens: None,
            temperature: None,
            mode: CompletionMode::Text,
        }
    }

    pub fn json(prompt: impl Into<String>) -> Self {
        Self {
            mode: CompletionMode::Json,
            ..Self::text(prompt)
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A completed request. In JSON mode `content` is fence-stripped and
/// guaranteed to parse as JSON.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}

impl CompletionResponse {
    /// Parse JSON-mode content into a typed value.
    pub fn parse_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, LlmError> {
        serde_json::from_str(&self.content).map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

/// Uniform text completion over the configured local model endpoint.
///
/// The client carries no cross-call memory; caching, single-flight, and the
/// concurrency cap live in the gate layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
