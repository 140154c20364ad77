//! Weighted aggregation of detection signals.

use tracing::info;

use crate::config::SharedThresholds;

use super::conflict::{KnowledgeConflictDetector, KnowledgeSource};
use super::drift::TopicDriftDetector;
use super::types::{EnsembleOutcome, SignalKind, SignalScore};

/// Risk contributed by a knowledge conflict.
pub const CONFLICT_RISK: f64 = 0.9;
/// Risk contributed when no conflict was found.
pub const NO_CONFLICT_RISK: f64 = 0.1;

/// Aggregate risk and the resulting decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub risk_score: f64,
    pub is_high_risk: bool,
}

/// Combine applied signals into a risk decision.
///
/// The risk is the weighted mean of the signal scores (0.0 when every
/// weight is zero). High risk means the risk strictly exceeds
/// `risk_threshold`, or a supplied reverse similarity falls below
/// `similarity_critical`.
pub fn decide(
    signals: &[SignalScore],
    risk_threshold: f64,
    similarity_critical: f64,
    reverse_similarity: Option<f64>,
) -> Decision {
    let total_weight: f64 = signals.iter().map(|s| s.weight).sum();
    let risk_score = if total_weight > 0.0 {
        (signals.iter().map(SignalScore::weighted).sum::<f64>() / total_weight).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let critical = reverse_similarity.is_some_and(|s| s < similarity_critical);

    Decision {
        risk_score,
        is_high_risk: risk_score > risk_threshold || critical,
    }
}

/// Multi-signal hallucination detector.
///
/// Topic drift and knowledge conflict are always computed here. Reverse
/// similarity and factuality come from LLM-backed detectors and are
/// supplied by the caller; a missing one is left out of the weighted mean.
#[derive(Debug, Clone, Default)]
pub struct HallucinationEnsemble {
    thresholds: SharedThresholds,
    drift: TopicDriftDetector,
    conflict: KnowledgeConflictDetector,
}

impl HallucinationEnsemble {
    pub fn new(thresholds: SharedThresholds) -> Self {
        Self {
            thresholds,
            drift: TopicDriftDetector::new(),
            conflict: KnowledgeConflictDetector::new(),
        }
    }

    pub fn thresholds(&self) -> &SharedThresholds {
        &self.thresholds
    }

    pub fn evaluate(
        &self,
        question: &str,
        answer: &str,
        knowledge: &dyn KnowledgeSource,
        reverse_similarity: Option<f64>,
        factuality_score: Option<u8>,
    ) -> EnsembleOutcome {
        let thresholds = self.thresholds.snapshot();
        let weights = &thresholds.weights;
        let mut signals = Vec::with_capacity(SignalKind::ALL.len());

        if let Some(similarity) = reverse_similarity {
            signals.push(
                SignalScore::new(
                    SignalKind::ReverseQuestion,
                    1.0 - similarity,
                    weights.reverse_question,
                )
                .with_rationale(format!("best reverse question similarity {:.3}", similarity)),
            );
        }

        let drift = self.drift.score(question, answer);
        signals.push(
            SignalScore::new(SignalKind::TopicDrift, drift, weights.topic_drift)
                .with_rationale("share of question terms missing from the answer"),
        );

        if let Some(score) = factuality_score {
            signals.push(
                SignalScore::new(
                    SignalKind::Factuality,
                    1.0 - f64::from(score) / 10.0,
                    weights.factuality,
                )
                .with_rationale(format!("self-assessed credibility {}/10", score)),
            );
        }

        let conflict = self.conflict.check(question, answer, knowledge);
        let conflict_risk = if conflict.is_conflict {
            CONFLICT_RISK
        } else {
            NO_CONFLICT_RISK
        };
        signals.push(
            SignalScore::new(
                SignalKind::KnowledgeConflict,
                conflict_risk,
                weights.knowledge_conflict,
            )
            .with_rationale(if conflict.is_conflict {
                conflict.info.clone()
            } else {
                "no conflict with stored knowledge".to_string()
            }),
        );

        let decision = decide(
            &signals,
            thresholds.risk_threshold,
            thresholds.similarity_critical,
            reverse_similarity,
        );

        info!(
            signals = signals.len(),
            risk_score = decision.risk_score,
            is_high_risk = decision.is_high_risk,
            "Ensemble evaluated"
        );

        EnsembleOutcome {
            signals,
            risk_score: decision.risk_score,
            is_high_risk: decision.is_high_risk,
            conflict,
        }
    }
}
