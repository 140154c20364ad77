//! Reverse-question consistency check.
//!
//! An answer that actually addresses the question should let a model
//! reconstruct something close to that question. The generator asks for a
//! few candidate questions from the answer alone and keeps the one most
//! similar to the question that was asked.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::llm::TextGenerator;
use crate::text::{KeywordExtractor, SimilarityScorer};

use super::types::ReverseQuestionOutcome;

/// Prompt keywords are taken from the first few extracted terms.
const PROMPT_KEYWORDS: usize = 2;

const QUOTES: &[char] = &['"', '\'', '“', '”', '‘', '’', '「', '」', '`'];
const LABELS: &[&str] = &["question:", "q:", "问题：", "问题:", "问：", "问:"];

/// Settings for reverse-question generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverseConfig {
    /// Candidates requested per check
    pub attempts: usize,
    /// Temperature of the first attempt
    pub base_temperature: f64,
    /// Added per attempt
    pub temperature_step: f64,
    pub max_tokens: u32,
    /// Keywords extracted from the question
    pub keyword_limit: usize,
    /// Issue all attempts at once instead of one after another
    pub concurrent: bool,
}

impl Default for ReverseConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_temperature: 0.8,
            temperature_step: 0.1,
            max_tokens: 100,
            keyword_limit: 3,
            concurrent: false,
        }
    }
}

impl ReverseConfig {
    pub fn temperature(&self, attempt: usize) -> f64 {
        self.base_temperature + attempt as f64 * self.temperature_step
    }
}

/// Reconstructs candidate questions from an answer.
pub struct ReverseQuestionGenerator {
    generator: Arc<dyn TextGenerator>,
    extractor: KeywordExtractor,
    scorer: SimilarityScorer,
    config: ReverseConfig,
}

impl ReverseQuestionGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            extractor: KeywordExtractor::new(),
            scorer: SimilarityScorer::new(),
            config: ReverseConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReverseConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_scorer(mut self, scorer: SimilarityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &ReverseConfig {
        &self.config
    }

    /// [`generate`](Self::generate) with the configured attempt count.
    pub async fn generate_default(&self, question: &str, answer: &str) -> ReverseQuestionOutcome {
        self.generate(question, answer, self.config.attempts).await
    }

    /// Generate up to `attempts` candidates and select the closest to `question`.
    ///
    /// Empty generations are skipped. With no candidate at all the outcome
    /// is [`ReverseQuestionOutcome::failure`].
    pub async fn generate(
        &self,
        question: &str,
        answer: &str,
        attempts: usize,
    ) -> ReverseQuestionOutcome {
        let keywords = self.extractor.extract(question, self.config.keyword_limit, 2);
        let keywords: Vec<&str> = keywords
            .iter()
            .take(PROMPT_KEYWORDS)
            .map(String::as_str)
            .collect();

        let candidates = if self.config.concurrent {
            self.generate_concurrent(answer, &keywords, attempts).await
        } else {
            self.generate_sequential(answer, &keywords, attempts).await
        };

        let Some((index, score)) = self.scorer.best_match(question, candidates.as_slice()) else {
            warn!(attempts, "No reverse question could be generated");
            return ReverseQuestionOutcome::failure();
        };

        info!(
            candidates = candidates.len(),
            best_index = index,
            similarity = score,
            "Reverse question selected"
        );

        ReverseQuestionOutcome {
            best: Some(candidates[index].clone()),
            best_score: score,
            candidates,
        }
    }

    async fn generate_sequential(
        &self,
        answer: &str,
        keywords: &[&str],
        attempts: usize,
    ) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();

        for attempt in 0..attempts {
            let prompt = build_prompt(answer, keywords, &candidates, attempt > 0);
            let text = self
                .generator
                .generate(&prompt, self.config.temperature(attempt), self.config.max_tokens)
                .await;

            match clean_candidate(&text) {
                Some(candidate) => {
                    debug!(attempt, candidate = %candidate, "Reverse question generated");
                    candidates.push(candidate);
                }
                None => debug!(attempt, "Empty reverse question skipped"),
            }
        }

        candidates
    }

    async fn generate_concurrent(
        &self,
        answer: &str,
        keywords: &[&str],
        attempts: usize,
    ) -> Vec<String> {
        let requests = (0..attempts).map(|attempt| {
            let prompt = build_prompt(answer, keywords, &[], attempt > 0);
            let temperature = self.config.temperature(attempt);
            async move {
                self.generator
                    .generate(&prompt, temperature, self.config.max_tokens)
                    .await
            }
        });

        join_all(requests)
            .await
            .iter()
            .filter_map(|text| clean_candidate(text))
            .collect()
    }
}

fn build_prompt(answer: &str, keywords: &[&str], previous: &[String], vary: bool) -> String {
    let mut prompt = String::from(
        "Read the answer below and write the single short, conversational question \
         it most likely responds to.\n",
    );

    if !keywords.is_empty() {
        prompt.push_str(&format!(
            "The question should contain one or two of these keywords: {}.\n",
            keywords.join(", ")
        ));
    }

    if !previous.is_empty() {
        prompt.push_str("Questions already written:\n");
        for q in previous {
            prompt.push_str(&format!("- {}\n", q));
        }
        prompt.push_str("Write a question that differs from all of them.\n");
    } else if vary {
        prompt.push_str("Phrase it differently from the most obvious wording.\n");
    }

    prompt.push_str("Reply with the question only.\n\n");
    prompt.push_str(&format!("Answer: {}\nQuestion:", answer));
    prompt
}

/// First non-empty line without quotes or a leading question label.
fn clean_candidate(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut line = line.trim_matches(QUOTES).trim();

    for label in LABELS {
        let matches = line
            .get(..label.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(label));
        if matches {
            line = line[label.len()..].trim();
            break;
        }
    }

    let line = line.trim_matches(QUOTES).trim();
    (!line.is_empty()).then(|| line.to_string())
}
