//! LLM client abstraction and text generation.
//!
//! Detectors depend on [`TextGenerator`], which turns a prompt into text and
//! absorbs every failure into an empty string. [`LlmTextGenerator`] implements
//! it over any [`LLMClient`] with linear-backoff retry for transient errors,
//! and can hand each successful call to a [`CallRecorder`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use hallucheck_core::llm::{ClientConfig, LlmTextGenerator, OpenAIClient, TextGenerator};
//! use std::sync::Arc;
//!
//! let client = OpenAIClient::hunyuan(ClientConfig::new("your-api-key"))?;
//! let generator = LlmTextGenerator::new(Arc::new(client));
//!
//! let text = generator.generate("问题：什么是高血压？\n答案：", 0.7, 100).await;
//! if text.is_empty() {
//!     // generation failed; already logged
//! }
//! ```

mod client;
mod generator;
pub mod mock;
mod types;

pub use client::{ClientConfig, LLMClient, OpenAIClient};
pub use generator::{CallRecorder, LlmTextGenerator, RetryPolicy, TextGenerator};
pub use mock::{GenerationCall, MockGenerator, MockLLMClient};
pub use types::{
    ApiCallRecord, ChatMessage, ChatRole, CompletionRequest, CompletionResponse, Provider,
    TokenUsage,
};
