//! Topic drift: does the answer talk about what was asked?

use std::collections::HashSet;

use crate::text::tokenize;

use super::types::NEUTRAL_SCORE;

/// Tokens of this many characters or fewer are ignored.
const MIN_TOKEN_CHARS: usize = 2;

/// Scores how much of the question's vocabulary is missing from the answer.
///
/// Question tokens are Unicode word runs longer than two characters; a token
/// counts as covered when it appears anywhere in the lowercased answer.
#[derive(Debug, Clone, Default)]
pub struct TopicDriftDetector;

impl TopicDriftDetector {
    pub fn new() -> Self {
        Self
    }

    /// Drift risk in `[0, 1]`; 0.5 when the question has no qualifying token.
    pub fn score(&self, question: &str, answer: &str) -> f64 {
        let mut seen = HashSet::new();
        let tokens: Vec<String> = tokenize::words(question)
            .into_iter()
            .filter(|t| t.chars().count() > MIN_TOKEN_CHARS)
            .filter(|t| seen.insert(t.clone()))
            .collect();

        if tokens.is_empty() {
            return NEUTRAL_SCORE;
        }

        let answer = answer.to_lowercase();
        let covered = tokens.iter().filter(|t| answer.contains(t.as_str())).count();
        let coverage = covered as f64 / tokens.len() as f64;

        (1.0 - coverage).clamp(0.0, 1.0)
    }
}
