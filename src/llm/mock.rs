//! Scripted LLM doubles for tests and offline runs.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::error::{Error, Result};

use super::client::LLMClient;
use super::generator::TextGenerator;
use super::types::{CompletionRequest, CompletionResponse, Provider, TokenUsage};

/// An [`LLMClient`] that replays scripted results in order and records
/// every request it receives.
#[derive(Default)]
pub struct MockLLMClient {
    script: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLLMClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful completion.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.script.lock().push_back(Ok(content.into()));
        self
    }

    /// Queue a failed completion.
    pub fn with_error(self, error: Error) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request.model.clone().unwrap_or_else(|| "mock-model".to_string());
        self.requests.lock().push(request);

        let content = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::LLM("No scripted response left".to_string())))?;

        Ok(CompletionResponse {
            id: "mock".to_string(),
            model,
            content,
            usage: TokenUsage::default(),
            timestamp: Utc::now(),
        })
    }

    fn provider(&self) -> Provider {
        Provider::Mock
    }
}

/// A recorded call to [`MockGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationCall {
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

type Responder = Box<dyn Fn(&str) -> String + Send + Sync>;

/// A [`TextGenerator`] that returns scripted text.
///
/// Scripted entries are consumed first; afterwards the responder (if any)
/// answers based on the prompt, otherwise an empty string signals failure.
#[derive(Default)]
pub struct MockGenerator {
    script: Mutex<VecDeque<String>>,
    responder: Option<Responder>,
    calls: Mutex<Vec<GenerationCall>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator that replays `outputs` in order.
    pub fn scripted<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(outputs.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Answer every prompt with `f(prompt)` once the script is exhausted.
    pub fn with_responder<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(f));
        self
    }

    pub fn calls(&self) -> Vec<GenerationCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str, temperature: f64, max_tokens: u32) -> String {
        self.calls.lock().push(GenerationCall {
            prompt: prompt.to_string(),
            temperature,
            max_tokens,
        });

        if let Some(text) = self.script.lock().pop_front() {
            return text;
        }
        self.responder
            .as_ref()
            .map(|f| f(prompt))
            .unwrap_or_default()
    }
}
