//! End-to-end verification of a question.
//!
//! [`Verifier`] answers a question through the configured text generator and
//! runs every detector over the answer:
//! 1. KEYWORDS: extract the question's keywords
//! 2. ANSWER: generate the answer under test
//! 3. SIGNALS: factuality and reverse questions, concurrently
//! 4. ENSEMBLE: aggregate into a risk decision
//! 5. RECORD: persist to the history store, if attached

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Settings, SharedThresholds};
use crate::detection::{
    FactualityScorer, HallucinationEnsemble, ReverseConfig, ReverseQuestionGenerator,
    VerificationResult,
};
use crate::error::Result;
use crate::history::SqliteHistoryStore;
use crate::knowledge::KnowledgeBase;
use crate::llm::TextGenerator;
use crate::text::KeywordExtractor;

/// Settings for answering the question under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Temperature for the answer (default: 0.7)
    pub answer_temperature: f64,
    /// Token cap for every generation (default: 100)
    pub max_tokens: u32,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            answer_temperature: 0.7,
            max_tokens: 100,
        }
    }
}

/// Runs the full detection pipeline for questions.
pub struct Verifier {
    generator: Arc<dyn TextGenerator>,
    extractor: KeywordExtractor,
    reverse: ReverseQuestionGenerator,
    factuality: FactualityScorer,
    ensemble: HallucinationEnsemble,
    knowledge: KnowledgeBase,
    history: Option<Arc<SqliteHistoryStore>>,
    config: VerifierConfig,
}

impl Verifier {
    /// Verifier with default thresholds and an empty knowledge base.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        let config = VerifierConfig::default();
        Self {
            extractor: KeywordExtractor::new(),
            reverse: ReverseQuestionGenerator::new(generator.clone()),
            factuality: FactualityScorer::new(generator.clone())
                .with_max_tokens(config.max_tokens),
            ensemble: HallucinationEnsemble::default(),
            knowledge: KnowledgeBase::new(),
            history: None,
            config,
            generator,
        }
    }

    /// Verifier wired from loaded settings.
    ///
    /// Knowledge is read from the settings' data directory (built-in facts
    /// when the file is missing) and history goes to its SQLite database.
    pub fn from_settings(settings: &Settings, generator: Arc<dyn TextGenerator>) -> Result<Self> {
        let history = Arc::new(SqliteHistoryStore::open(settings.history_path())?);
        Self::from_settings_with_history(settings, generator, history)
    }

    /// [`from_settings`](Self::from_settings) recording into an already open store.
    pub fn from_settings_with_history(
        settings: &Settings,
        generator: Arc<dyn TextGenerator>,
        history: Arc<SqliteHistoryStore>,
    ) -> Result<Self> {
        Ok(Self::new(generator)
            .with_config(VerifierConfig {
                answer_temperature: settings.llm.answer_temperature,
                max_tokens: settings.llm.max_tokens,
            })
            .with_reverse_config(settings.reverse.clone())
            .with_thresholds(settings.shared_thresholds()?)
            .with_knowledge(KnowledgeBase::open_or_default(&settings.knowledge_path()))
            .with_history(history))
    }

    pub fn with_config(mut self, config: VerifierConfig) -> Self {
        self.factuality = FactualityScorer::new(self.generator.clone())
            .with_max_tokens(config.max_tokens);
        self.config = config;
        self
    }

    pub fn with_reverse_config(mut self, config: ReverseConfig) -> Self {
        self.reverse = ReverseQuestionGenerator::new(self.generator.clone()).with_config(config);
        self
    }

    pub fn with_thresholds(mut self, thresholds: SharedThresholds) -> Self {
        self.ensemble = HallucinationEnsemble::new(thresholds);
        self
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_history(mut self, history: Arc<SqliteHistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn thresholds(&self) -> &SharedThresholds {
        self.ensemble.thresholds()
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn knowledge_mut(&mut self) -> &mut KnowledgeBase {
        &mut self.knowledge
    }

    pub fn history(&self) -> Option<&Arc<SqliteHistoryStore>> {
        self.history.as_ref()
    }

    /// Answer `question` and assess the answer.
    ///
    /// An empty answer yields a high-risk result carrying
    /// [`VerificationResult::ANSWER_GENERATION_FAILED`].
    pub async fn verify(&self, question: &str) -> VerificationResult {
        let started = Instant::now();
        let keywords = self.extractor.extract_default(question);
        info!(question = %question, keywords = ?keywords, "Verifying question");

        let answer = self
            .generator
            .generate(
                &answer_prompt(question),
                self.config.answer_temperature,
                self.config.max_tokens,
            )
            .await;
        let answer = answer.trim();

        if answer.is_empty() {
            error!(question = %question, "No answer could be generated");
            return self.failed(question, keywords, started);
        }

        self.assess(question, answer, keywords, started).await
    }

    /// Assess an externally supplied answer to `question`.
    ///
    /// The answer is trimmed first; a blank one fails like an empty
    /// generation in [`verify`](Self::verify).
    pub async fn verify_answer(&self, question: &str, answer: &str) -> VerificationResult {
        let started = Instant::now();
        let keywords = self.extractor.extract_default(question);
        let answer = answer.trim();

        if answer.is_empty() {
            warn!(question = %question, "Supplied answer is blank");
            return self.failed(question, keywords, started);
        }

        self.assess(question, answer, keywords, started).await
    }

    /// Verify each question in order.
    pub async fn batch_verify<S: AsRef<str>>(&self, questions: &[S]) -> Vec<VerificationResult> {
        let mut results = Vec::with_capacity(questions.len());
        for (i, question) in questions.iter().enumerate() {
            debug!(index = i, total = questions.len(), "Batch verification");
            results.push(self.verify(question.as_ref()).await);
        }
        results
    }

    async fn assess(
        &self,
        question: &str,
        answer: &str,
        keywords: Vec<String>,
        started: Instant,
    ) -> VerificationResult {
        let (factuality, reverse) = futures::join!(
            self.factuality.score(answer),
            self.reverse.generate_default(question, answer)
        );

        let outcome = self.ensemble.evaluate(
            question,
            answer,
            &self.knowledge,
            reverse.similarity(),
            Some(factuality.score),
        );

        let result = VerificationResult {
            id: Uuid::new_v4(),
            question: question.to_string(),
            answer: answer.to_string(),
            keywords,
            reverse_question: reverse.best,
            similarity: reverse.best_score,
            candidates: reverse.candidates,
            signals: outcome.signals,
            risk_score: outcome.risk_score,
            is_high_risk: outcome.is_high_risk,
            factuality_score: Some(factuality.score),
            factuality_reason: Some(factuality.rationale),
            knowledge_conflict: outcome.conflict.is_conflict,
            conflict_info: outcome.conflict.info,
            error: None,
            created_at: chrono::Utc::now(),
            latency_ms: elapsed_ms(started),
        };

        info!(
            id = %result.id,
            risk_score = result.risk_score,
            is_high_risk = result.is_high_risk,
            similarity = result.similarity,
            latency_ms = result.latency_ms,
            "Verification complete"
        );

        self.record(&result);
        result
    }

    fn failed(&self, question: &str, keywords: Vec<String>, started: Instant) -> VerificationResult {
        let mut result = VerificationResult::generation_failed(question, keywords);
        result.latency_ms = elapsed_ms(started);
        self.record(&result);
        result
    }

    fn record(&self, result: &VerificationResult) {
        if let Some(ref history) = self.history {
            if let Err(e) = history.save(result) {
                warn!(id = %result.id, error = %e, "Failed to record verification");
            }
        }
    }
}

fn answer_prompt(question: &str) -> String {
    format!(
        "Answer the following question accurately and concisely.\n\nQuestion: {}\nAnswer:",
        question
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
