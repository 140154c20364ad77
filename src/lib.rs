//! # hallucheck-core
//!
//! Multi-signal hallucination detection for LLM answers.
//!
//! ## Core Components
//!
//! - **Text**: Keyword extraction and text similarity
//! - **Detection**: Reverse questions, topic drift, factuality, knowledge
//!   conflicts and the weighted ensemble that combines them
//! - **Knowledge**: Key to fact store with JSON and CSV persistence
//! - **History**: SQLite record of past verifications and LLM calls
//! - **Pipeline**: End-to-end verification of a question
//!
//! ## Example
//!
//! ```rust,ignore
//! use hallucheck_core::{Settings, Verifier};
//! use std::sync::Arc;
//!
//! let settings = Settings::load(None)?;
//! let generator = Arc::new(settings.text_generator()?);
//! let verifier = Verifier::from_settings(&settings, generator)?;
//!
//! let result = verifier.verify("高血压可以吃什么水果？").await;
//! if result.is_high_risk {
//!     println!("Possible hallucination (risk {:.2})", result.risk_score);
//! }
//! ```

pub mod config;
pub mod detection;
pub mod error;
pub mod history;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
pub mod text;

// Re-exports for convenience
pub use config::{LlmSettings, Settings, SharedThresholds, SignalWeights, Thresholds};
pub use detection::{
    EnsembleOutcome, FactualityAssessment, FactualityScorer, HallucinationEnsemble,
    KnowledgeConflict, KnowledgeConflictDetector, KnowledgeSource, ReverseConfig,
    ReverseQuestionGenerator, ReverseQuestionOutcome, SignalKind, SignalScore,
    TopicDriftDetector, VerificationResult,
};
pub use error::{Error, Result};
pub use history::{HistoryFilter, HistoryStats, SimilarityHistogram, SqliteHistoryStore};
pub use knowledge::KnowledgeBase;
pub use llm::{
    ApiCallRecord, CallRecorder, ClientConfig, LLMClient, LlmTextGenerator, MockGenerator,
    OpenAIClient, Provider, RetryPolicy, TextGenerator,
};
pub use pipeline::{Verifier, VerifierConfig};
pub use text::{KeywordExtractor, KeywordMethod, SimilarityMethod, SimilarityScorer};
