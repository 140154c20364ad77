//! Core types for hallucination detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Neutral score used when a signal has no information.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// One of the four detection signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ReverseQuestion,
    TopicDrift,
    Factuality,
    KnowledgeConflict,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::ReverseQuestion,
        SignalKind::TopicDrift,
        SignalKind::Factuality,
        SignalKind::KnowledgeConflict,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::ReverseQuestion => "reverse_question",
            SignalKind::TopicDrift => "topic_drift",
            SignalKind::Factuality => "factuality",
            SignalKind::KnowledgeConflict => "knowledge_conflict",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown signal '{}'", s))
    }
}

/// A single detector's risk contribution.
///
/// `score` is always within `[0, 1]` (higher means riskier); NaN becomes
/// [`NEUTRAL_SCORE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    pub kind: SignalKind,
    pub score: f64,
    pub weight: f64,
    pub rationale: String,
}

impl SignalScore {
    pub fn new(kind: SignalKind, score: f64, weight: f64) -> Self {
        let score = if score.is_nan() {
            NEUTRAL_SCORE
        } else {
            score.clamp(0.0, 1.0)
        };
        let weight = if weight.is_finite() { weight.clamp(0.0, 1.0) } else { 0.0 };

        Self {
            kind,
            score,
            weight,
            rationale: String::new(),
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn weighted(&self) -> f64 {
        self.score * self.weight
    }
}

/// Result of combining signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleOutcome {
    pub signals: Vec<SignalScore>,
    pub risk_score: f64,
    pub is_high_risk: bool,
    pub conflict: KnowledgeConflict,
}

impl EnsembleOutcome {
    /// Weights of the applied signals scaled to sum to 1.
    ///
    /// Empty when every applied weight is zero.
    pub fn normalized_weights(&self) -> Vec<(SignalKind, f64)> {
        let total: f64 = self.signals.iter().map(|s| s.weight).sum();
        if total <= 0.0 {
            return Vec::new();
        }
        self.signals
            .iter()
            .map(|s| (s.kind, s.weight / total))
            .collect()
    }

    pub fn signal(&self, kind: SignalKind) -> Option<&SignalScore> {
        self.signals.iter().find(|s| s.kind == kind)
    }
}

/// Candidates reconstructed from an answer and the closest one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReverseQuestionOutcome {
    pub best: Option<String>,
    pub best_score: f64,
    pub candidates: Vec<String>,
}

impl ReverseQuestionOutcome {
    /// Outcome when no candidate could be generated.
    pub fn failure() -> Self {
        Self::default()
    }

    pub fn is_failure(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Similarity to feed the ensemble, if any candidate exists.
    pub fn similarity(&self) -> Option<f64> {
        (!self.is_failure()).then_some(self.best_score)
    }
}

/// Self-assessed credibility of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactualityAssessment {
    /// 1..=10, higher is more credible
    pub score: u8,
    pub rationale: String,
    /// Whether the score came from a parsed model reply
    pub parsed: bool,
}

/// Result of checking an answer against a knowledge store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeConflict {
    pub is_conflict: bool,
    pub info: String,
    /// The knowledge key that triggered the conflict
    pub key: Option<String>,
}

impl KnowledgeConflict {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Full record of one verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub id: Uuid,
    pub question: String,
    pub answer: String,
    pub keywords: Vec<String>,
    pub reverse_question: Option<String>,
    pub similarity: f64,
    pub candidates: Vec<String>,
    pub signals: Vec<SignalScore>,
    pub risk_score: f64,
    pub is_high_risk: bool,
    pub factuality_score: Option<u8>,
    pub factuality_reason: Option<String>,
    pub knowledge_conflict: bool,
    pub conflict_info: String,
    /// Set when the pipeline could not produce an answer
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub latency_ms: u64,
}

impl VerificationResult {
    pub const ANSWER_GENERATION_FAILED: &'static str = "answer generation failed";

    /// Fail-safe result when no answer could be obtained.
    pub fn generation_failed(question: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            answer: String::new(),
            keywords,
            reverse_question: None,
            similarity: 0.0,
            candidates: Vec::new(),
            signals: Vec::new(),
            risk_score: 1.0,
            is_high_risk: true,
            factuality_score: None,
            factuality_reason: None,
            knowledge_conflict: false,
            conflict_info: String::new(),
            error: Some(Self::ANSWER_GENERATION_FAILED.to_string()),
            created_at: Utc::now(),
            latency_ms: 0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_score_clamps() {
        assert_eq!(SignalScore::new(SignalKind::TopicDrift, 1.7, 0.15).score, 1.0);
        assert_eq!(SignalScore::new(SignalKind::TopicDrift, -0.2, 0.15).score, 0.0);
        assert_eq!(
            SignalScore::new(SignalKind::TopicDrift, f64::NAN, 0.15).score,
            NEUTRAL_SCORE
        );
        assert_eq!(SignalScore::new(SignalKind::TopicDrift, 0.3, f64::INFINITY).weight, 0.0);
    }

    #[test]
    fn test_signal_kind_round_trip_names() {
        for kind in SignalKind::ALL {
            assert_eq!(kind.as_str().parse::<SignalKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<SignalKind>().is_err());
        assert_eq!(
            serde_json::to_string(&SignalKind::KnowledgeConflict).unwrap(),
            "\"knowledge_conflict\""
        );
    }

    #[test]
    fn test_normalized_weights() {
        let outcome = EnsembleOutcome {
            signals: vec![
                SignalScore::new(SignalKind::TopicDrift, 0.5, 0.15),
                SignalScore::new(SignalKind::KnowledgeConflict, 0.1, 0.1),
            ],
            risk_score: 0.0,
            is_high_risk: false,
            conflict: KnowledgeConflict::none(),
        };
        let weights = outcome.normalized_weights();
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((weights[0].1 - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_reverse_outcome_similarity() {
        assert_eq!(ReverseQuestionOutcome::failure().similarity(), None);
        let outcome = ReverseQuestionOutcome {
            best: Some("q".into()),
            best_score: 0.8,
            candidates: vec!["q".into()],
        };
        assert_eq!(outcome.similarity(), Some(0.8));
    }

    #[test]
    fn test_generation_failed_is_high_risk() {
        let result = VerificationResult::generation_failed("什么是感冒？", vec![]);
        assert!(result.is_error());
        assert!(result.is_high_risk);
        assert_eq!(result.risk_score, 1.0);
        assert_eq!(result.error.as_deref(), Some("answer generation failed"));
    }
}
