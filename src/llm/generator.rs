//! Text generation with bounded retry.
//!
//! Detectors never see transport errors. They call [`TextGenerator::generate`]
//! and receive either text or an empty string; every failure is logged here.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::Result;

use super::client::LLMClient;
use super::types::{ApiCallRecord, ChatMessage, CompletionRequest};

/// Source of generated text for prompts.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for `prompt`.
    ///
    /// Returns an empty string when generation failed for any reason.
    async fn generate(&self, prompt: &str, temperature: f64, max_tokens: u32) -> String;
}

/// Sink for records of successful LLM calls.
pub trait CallRecorder: Send + Sync {
    fn record_call(&self, record: &ApiCallRecord) -> Result<()>;
}

/// Retry settings for transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    pub max_attempts: u32,
    /// Backoff before retry `n` is `n * backoff_unit_ms`
    pub backoff_unit_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit_ms: 2000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit_ms: backoff_unit.as_millis() as u64,
        }
    }

    /// Linear backoff after the given 1-based attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_unit_ms.saturating_mul(attempt as u64))
    }
}

/// [`TextGenerator`] over an [`LLMClient`].
pub struct LlmTextGenerator {
    client: Arc<dyn LLMClient>,
    policy: RetryPolicy,
    model: Option<String>,
    recorder: Option<Arc<dyn CallRecorder>>,
}

impl LlmTextGenerator {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            model: None,
            recorder: None,
        }
    }

    /// Log every successful call to `recorder`.
    pub fn with_recorder(mut self, recorder: Arc<dyn CallRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    fn build_request(&self, prompt: &str, temperature: f64, max_tokens: u32) -> CompletionRequest {
        let mut request = CompletionRequest::new()
            .with_message(ChatMessage::user(prompt))
            .with_temperature(temperature)
            .with_max_tokens(max_tokens);
        if let Some(ref model) = self.model {
            request = request.with_model(model);
        }
        request
    }
}

#[async_trait]
impl TextGenerator for LlmTextGenerator {
    async fn generate(&self, prompt: &str, temperature: f64, max_tokens: u32) -> String {
        let provider = self.client.provider();
        let max_attempts = self.policy.max_attempts.max(1);
        let request = self.build_request(prompt, temperature, max_tokens);

        debug!(
            %provider,
            prompt_chars = prompt.chars().count(),
            temperature,
            max_tokens,
            "Generating text"
        );

        for attempt in 1..=max_attempts {
            let start = Instant::now();
            match self.client.complete(request.clone()).await {
                Ok(response) => {
                    let text = response.content.trim().to_string();
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    info!(
                        %provider,
                        attempt,
                        chars = text.chars().count(),
                        tokens = response.usage.total(),
                        elapsed_ms,
                        "Generation succeeded"
                    );
                    if let Some(ref recorder) = self.recorder {
                        let record = ApiCallRecord {
                            timestamp: Utc::now(),
                            model: response.model,
                            prompt: prompt.to_string(),
                            response: text.clone(),
                            elapsed_ms,
                        };
                        if let Err(e) = recorder.record_call(&record) {
                            warn!(%provider, error = %e, "Failed to record API call");
                        }
                    }
                    return text;
                }
                Err(e) if e.is_transient() => {
                    if attempt == max_attempts {
                        warn!(%provider, attempt, error = %e, "Transient failure on last attempt");
                        break;
                    }
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        %provider,
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    error!(%provider, attempt, error = %e, "Generation failed");
                    return String::new();
                }
            }
        }

        error!(%provider, max_attempts, "Generation failed after exhausting retries");
        String::new()
    }
}
