//! Multi-signal hallucination detection.
//!
//! Four signals estimate how likely an answer is to be a hallucination. Each
//! produces a risk in `[0, 1]` (higher is riskier):
//!
//! | Signal | Source | Risk |
//! |--------|--------|------|
//! | reverse question | [`ReverseQuestionGenerator`] | `1 - best similarity` |
//! | topic drift | [`TopicDriftDetector`] | share of question terms missing |
//! | factuality | [`FactualityScorer`] | `1 - score / 10` |
//! | knowledge conflict | [`KnowledgeConflictDetector`] | 0.9 on conflict, else 0.1 |
//!
//! [`HallucinationEnsemble`] takes the weighted mean of the applied signals
//! (default weights 0.6 / 0.15 / 0.15 / 0.1) and flags high risk when the
//! mean exceeds the risk threshold, or when the reverse similarity falls
//! below the critical similarity regardless of the mean.
//!
//! LLM-backed detectors never fail: an empty generation drops the reverse
//! signal and yields a neutral factuality of 5.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hallucheck_core::detection::{FactualityScorer, HallucinationEnsemble, ReverseQuestionGenerator};
//! use hallucheck_core::knowledge::KnowledgeBase;
//!
//! let reverse = ReverseQuestionGenerator::new(generator.clone());
//! let factuality = FactualityScorer::new(generator);
//! let ensemble = HallucinationEnsemble::new(thresholds);
//! let kb = KnowledgeBase::with_defaults();
//!
//! let rq = reverse.generate(question, answer, 3).await;
//! let fact = factuality.score(answer).await;
//! let outcome = ensemble.evaluate(question, answer, &kb, rq.similarity(), Some(fact.score));
//!
//! if outcome.is_high_risk {
//!     println!("Risk {:.2}: {}", outcome.risk_score, outcome.conflict.info);
//! }
//! ```

mod conflict;
mod drift;
mod ensemble;
mod factuality;
mod reverse;
mod types;

#[cfg(test)]
mod proptest;

pub use conflict::{KnowledgeConflictDetector, KnowledgeSource};
pub use drift::TopicDriftDetector;
pub use ensemble::{decide, Decision, HallucinationEnsemble, CONFLICT_RISK, NO_CONFLICT_RISK};
pub use factuality::{
    parse_assessment, AssessmentParse, FactualityScorer, COULD_NOT_PARSE, NEUTRAL_FACTUALITY,
    UNABLE_TO_ASSESS,
};
pub use reverse::{ReverseConfig, ReverseQuestionGenerator};
pub use types::{
    EnsembleOutcome, FactualityAssessment, KnowledgeConflict, ReverseQuestionOutcome,
    SignalKind, SignalScore, VerificationResult, NEUTRAL_SCORE,
};
