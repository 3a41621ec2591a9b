//! Ollama LLM client (OpenAI-compatible API).

use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::infrastructure::ports::{
    CompletionMode, CompletionRequest, CompletionResponse, LlmError, LlmPort,
};

/// Client for Ollama's OpenAI-compatible API.
///
/// One operation, no cross-call memory. Retries live in the resilient
/// wrapper, the concurrency cap in the gate layer.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        }
    }
}

#[async_trait]
impl LlmPort for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let api_request = OpenAIChatRequest {
            model: self.model.clone(),
            messages: build_messages(&request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(
            model = %self.model,
            prompt_chars = request.prompt.len(),
            mode = ?request.mode,
            "Sending LLM request"
        );
        let started = std::time::Instant::now();

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout_secs)
                } else {
                    LlmError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!("{status}: {error_text}")));
        }

        let api_response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("No choices in LLM response".to_string()))?;

        tracing::debug!(
            latency_ms = started.elapsed().as_millis() as u64,
            response_chars = content.len(),
            "LLM request completed"
        );

        let content = match request.mode {
            CompletionMode::Text => content,
            CompletionMode::Json => extract_json(&content)?,
        };

        Ok(CompletionResponse { content })
    }
}

fn build_messages(request: &CompletionRequest) -> Vec<OpenAIMessage> {
    let mut messages = Vec::new();

    if let Some(system) = &request.system {
        messages.push(OpenAIMessage {
            role: "system".to_string(),
            content: Some(system.clone()),
        });
    }

    messages.push(OpenAIMessage {
        role: "user".to_string(),
        content: Some(request.prompt.clone()),
    });

    messages
}

/// Strip surrounding code fences and validate the remainder parses as JSON.
fn extract_json(raw: &str) -> Result<String, LlmError> {
    let trimmed = raw.trim();

    // Models regularly wrap JSON in ```json ... ``` fences.
    let fence = Regex::new(r"(?s)^```(?:json)?\s*(.*?)\s*```$").map_err(|e| {
        LlmError::InvalidResponse(format!("fence pattern failed to compile: {e}"))
    })?;
    let candidate = match fence.captures(trimmed) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(trimmed),
        None => trimmed,
    };

    serde_json::from_str::<serde_json::Value>(candidate)
        .map_err(|e| LlmError::InvalidResponse(format!("not valid JSON: {e}")))?;

    Ok(candidate.to_string())
}

// =============================================================================
// OpenAI API types
// =============================================================================

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_passes_bare_json_through() {
        let out = extract_json(r#"{"a": 1}"#).expect("valid");
        assert_eq!(out, r#"{"a": 1}"#);
    }

    #[test]
    fn extract_json_strips_fences() {
        let fenced = "```json\n{\"a\": 1}\n```";
        let out = extract_json(fenced).expect("valid");
        assert_eq!(out, r#"{"a": 1}"#);
    }

    #[test]
    fn extract_json_strips_bare_fences() {
        let fenced = "```\n[1, 2, 3]\n```";
        let out = extract_json(fenced).expect("valid");
        assert_eq!(out, "[1, 2, 3]");
    }

    #[test]
    fn extract_json_rejects_prose() {
        assert!(extract_json("Sure! Here is the JSON you asked for.").is_err());
    }

    #[test]
    fn extract_json_rejects_truncated_payloads() {
        assert!(extract_json(r#"{"a": [1, 2"#).is_err());
    }
}
