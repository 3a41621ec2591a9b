//! Resilient LLM client wrapper with exponential backoff retry.
//!
//! Wraps any LlmPort implementation with retry logic to handle transient
//! failures. Once retries are exhausted the wrapper reports
//! `LlmError::Unavailable`; it never fabricates content - callers own their
//! fallbacks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::infrastructure::ports::{CompletionRequest, CompletionResponse, LlmError, LlmPort};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt (0 = just the initial attempt).
    pub max_retries: u32,
    /// Base delay in milliseconds before first retry.
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (caps exponential growth).
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) for randomizing delays to prevent thundering herd.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }
}

/// Wrapper that adds retry logic to any LLM client.
pub struct ResilientLlmClient {
    inner: Arc<dyn LlmPort>,
    config: RetryConfig,
}

impl ResilientLlmClient {
    pub fn new(inner: Arc<dyn LlmPort>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Delay for a given attempt number: exponential backoff with jitter.
    fn calculate_delay(&self, attempt: u32) -> u64 {
        let base = self.config.base_delay_ms;
        let exponential = base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.config.max_delay_ms);

        let jitter_range = (capped as f64 * self.config.jitter_factor) as i64;
        if jitter_range > 0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped as i64 + jitter).max(0) as u64
        } else {
            capped
        }
    }

    /// Transient failures: timeouts, connection resets, 5xx, malformed
    /// responses. Client errors (4xx) are not retried.
    fn is_retryable(error: &LlmError) -> bool {
        match error {
            LlmError::Timeout(_) => true,
            LlmError::InvalidResponse(_) => true,
            LlmError::RequestFailed(msg) => {
                !msg.contains("400") && !msg.contains("401") && !msg.contains("403")
                    && !msg.contains("404")
            }
            LlmError::Unavailable { .. } => false,
        }
    }
}

#[async_trait]
impl LlmPort for ResilientLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..=self.config.max_retries {
            match self.inner.complete(request.clone()).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(attempt = attempt + 1, "LLM request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let retryable = Self::is_retryable(&e);

                    if attempt < self.config.max_retries && retryable {
                        let delay = self.calculate_delay(attempt + 1);
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_retries = self.config.max_retries,
                            delay_ms = delay,
                            error = %e,
                            "LLM request failed, retrying..."
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    } else if !retryable {
                        tracing::error!(error = %e, "LLM request failed with non-retryable error");
                        return Err(LlmError::Unavailable {
                            attempts: attempt + 1,
                            last_error: e.to_string(),
                        });
                    }

                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        tracing::error!(
            attempts = self.config.max_retries + 1,
            error = %last_error,
            "LLM request failed after all retry attempts"
        );
        Err(LlmError::Unavailable {
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }
}
