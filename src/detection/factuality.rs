//! Factuality self-assessment.
//!
//! The model is asked to rate a statement's credibility on a 1 to 10 scale.
//! Replies are parsed leniently; whatever cannot be read falls back to the
//! neutral score 5.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::llm::TextGenerator;

use super::types::FactualityAssessment;

pub const NEUTRAL_FACTUALITY: u8 = 5;
pub const MIN_FACTUALITY: u8 = 1;
pub const MAX_FACTUALITY: u8 = 10;

pub const UNABLE_TO_ASSESS: &str = "unable to assess";
pub const COULD_NOT_PARSE: &str = "could not parse assessment";
pub const NO_RATIONALE: &str = "no detailed rationale";

static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(?:score|rating)\b|评分)[\s*]*[:：]?[\s*]*(\d+)")
        .expect("valid score pattern")
});

static REASON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(?:reason|rationale)\b|理由)[\s*]*[:：][\s*]*(.*)")
        .expect("valid reason pattern")
});

/// What could be read from an assessment reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssessmentParse {
    /// At least one label was found; missing parts hold their defaults
    Parsed { score: u8, reason: String },
    /// Neither a score nor a reason label was found
    Unparsed,
}

/// Parse a `Score: n` / `Reason: text` reply.
///
/// Labels may be English (`Score`, `Rating`, `Reason`, `Rationale`) or
/// Chinese (`评分`, `理由`), with ASCII or full-width colons. The score is
/// clamped into 1..=10.
pub fn parse_assessment(text: &str) -> AssessmentParse {
    let score = SCORE_RE.captures(text).and_then(|c| c.get(1)).map(|m| {
        m.as_str()
            .parse::<u64>()
            .map(|n| n.clamp(MIN_FACTUALITY as u64, MAX_FACTUALITY as u64) as u8)
            .unwrap_or(MAX_FACTUALITY)
    });
    let reason = REASON_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().trim_end_matches('*').trim().to_string());

    if score.is_none() && reason.is_none() {
        return AssessmentParse::Unparsed;
    }

    AssessmentParse::Parsed {
        score: score.unwrap_or(NEUTRAL_FACTUALITY),
        reason: reason
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| NO_RATIONALE.to_string()),
    }
}

/// Obtains a credibility score for a statement.
pub struct FactualityScorer {
    generator: Arc<dyn TextGenerator>,
    temperature: f64,
    max_tokens: u32,
}

impl FactualityScorer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            temperature: 0.3,
            max_tokens: 100,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Assess `statement`. Never fails; failures yield score 5.
    pub async fn score(&self, statement: &str) -> FactualityAssessment {
        let prompt = build_prompt(statement);
        let reply = self
            .generator
            .generate(&prompt, self.temperature, self.max_tokens)
            .await;

        if reply.is_empty() {
            warn!("Factuality assessment unavailable");
            return FactualityAssessment {
                score: NEUTRAL_FACTUALITY,
                rationale: UNABLE_TO_ASSESS.to_string(),
                parsed: false,
            };
        }

        match parse_assessment(&reply) {
            AssessmentParse::Parsed { score, reason } => {
                debug!(score, "Factuality assessed");
                FactualityAssessment {
                    score,
                    rationale: reason,
                    parsed: true,
                }
            }
            AssessmentParse::Unparsed => {
                warn!(reply = %reply, "Could not parse factuality reply");
                FactualityAssessment {
                    score: NEUTRAL_FACTUALITY,
                    rationale: COULD_NOT_PARSE.to_string(),
                    parsed: false,
                }
            }
        }
    }
}

fn build_prompt(statement: &str) -> String {
    format!(
        "Assess how credible the following statement is. Give a score from 1 to 10 \
         (1 means not credible at all, 10 means highly credible) and a brief reason.\n\n\
         Statement: {}\n\n\
         Reply in this format:\n\
         Score: [number]\n\
         Reason: [brief explanation]",
        statement
    )
}
