//! Property-based tests for scoring invariants using proptest.
//!
//! - Similarity is bounded, symmetric and maximal on identical input
//! - Keyword extraction is bounded, deduplicated and deterministic
//! - Signal scores and aggregated risk stay within `[0, 1]`
//! - Applied weights normalize to 1
//! - Reverse generation never returns more candidates than attempts

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use std::sync::Arc;

    use crate::config::{SharedThresholds, SignalWeights, Thresholds};
    use crate::detection::{
        decide, HallucinationEnsemble, ReverseQuestionGenerator, SignalKind, SignalScore,
        TopicDriftDetector,
    };
    use crate::llm::MockGenerator;
    use crate::text::{tokenize, KeywordExtractor, SimilarityMethod, SimilarityScorer};

    // Mixed Han, Latin, digits, punctuation and whitespace
    fn mixed_text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 高血压疫苗安全的是什么吃?!。，]{0,24}"
    }

    fn non_empty_text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 高血压疫苗安全的是什么吃?!。，]{1,24}"
    }

    fn method() -> impl Strategy<Value = SimilarityMethod> {
        prop_oneof![
            Just(SimilarityMethod::TfIdf),
            Just(SimilarityMethod::Count),
            Just(SimilarityMethod::Jaccard),
            Just(SimilarityMethod::SequenceRatio),
        ]
    }

    fn signal_kind() -> impl Strategy<Value = SignalKind> {
        prop_oneof![
            Just(SignalKind::ReverseQuestion),
            Just(SignalKind::TopicDrift),
            Just(SignalKind::Factuality),
            Just(SignalKind::KnowledgeConflict),
        ]
    }

    fn signals() -> impl Strategy<Value = Vec<SignalScore>> {
        prop::collection::vec(
            (signal_kind(), -0.5f64..1.5, 0.0f64..=1.0)
                .prop_map(|(kind, score, weight)| SignalScore::new(kind, score, weight)),
            0..6,
        )
    }

    fn weights() -> impl Strategy<Value = SignalWeights> {
        (0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0).prop_map(
            |(reverse_question, topic_drift, factuality, knowledge_conflict)| SignalWeights {
                reverse_question,
                topic_drift,
                factuality,
                knowledge_conflict,
            },
        )
    }

    // =========================================================================
    // Similarity
    // =========================================================================

    proptest! {
        #[test]
        fn similarity_is_bounded(a in mixed_text(), b in mixed_text(), m in method()) {
            let s = SimilarityScorer::with_method(m).score(&a, &b);
            prop_assert!((0.0..=1.0).contains(&s), "score({:?}, {:?}) = {}", a, b, s);
        }

        #[test]
        fn similarity_is_symmetric(a in mixed_text(), b in mixed_text(), m in method()) {
            let scorer = SimilarityScorer::with_method(m);
            let ab = scorer.score(&a, &b);
            let ba = scorer.score(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-12, "{} != {}", ab, ba);
        }

        #[test]
        fn similarity_of_identical_is_one(a in non_empty_text(), m in method()) {
            let s = SimilarityScorer::with_method(m).score(&a, &a);
            prop_assert!((s - 1.0).abs() <= 0.01, "score({:?}, itself) = {}", a, s);
        }

        #[test]
        fn best_match_is_maximal(base in mixed_text(), candidates in prop::collection::vec(mixed_text(), 1..5)) {
            let scorer = SimilarityScorer::new();
            let scores = scorer.score_many(&base, &candidates);
            let (index, best) = scorer.best_match(&base, &candidates).unwrap();

            prop_assert_eq!(scores[index], best);
            prop_assert!(scores.iter().all(|&s| s <= best));
            prop_assert!(scores[..index].iter().all(|&s| s < best));
        }
    }

    // =========================================================================
    // Keywords and drift
    // =========================================================================

    proptest! {
        #[test]
        fn keywords_are_bounded_and_unique(text in mixed_text(), top_k in 0usize..6, min in 0usize..4) {
            let extractor = KeywordExtractor::new();
            let keywords = extractor.extract(&text, top_k, min);

            prop_assert!(keywords.len() <= top_k);
            let mut seen = std::collections::HashSet::new();
            for k in &keywords {
                prop_assert!(seen.insert(k.clone()), "duplicate keyword {:?}", k);
                prop_assert!(!tokenize::is_stop_word(k), "stop word {:?}", k);
            }
            prop_assert_eq!(keywords, extractor.extract(&text, top_k, min));
        }

        #[test]
        fn drift_is_bounded(q in mixed_text(), a in mixed_text()) {
            let d = TopicDriftDetector::new().score(&q, &a);
            prop_assert!((0.0..=1.0).contains(&d));
        }
    }

    // =========================================================================
    // Aggregation
    // =========================================================================

    proptest! {
        #[test]
        fn signal_scores_are_clamped(score in prop::num::f64::ANY, weight in prop::num::f64::ANY) {
            let s = SignalScore::new(SignalKind::Factuality, score, weight);
            prop_assert!((0.0..=1.0).contains(&s.score));
            prop_assert!((0.0..=1.0).contains(&s.weight));
        }

        #[test]
        fn risk_is_bounded(signals in signals(), threshold in 0.0f64..1.0, critical in 0.0f64..1.0) {
            let decision = decide(&signals, threshold, critical, None);
            prop_assert!((0.0..=1.0).contains(&decision.risk_score));
            prop_assert_eq!(decision.is_high_risk, decision.risk_score > threshold);
        }

        #[test]
        fn normalized_weights_sum_to_one(
            weights in weights(),
            similarity in prop::option::of(0.0f64..=1.0),
            factuality in prop::option::of(0u8..=10),
            question in mixed_text(),
            answer in mixed_text(),
        ) {
            let thresholds = SharedThresholds::new(Thresholds {
                weights: weights.clone(),
                ..Thresholds::default()
            })
            .unwrap();
            let knowledge: Vec<(String, String)> = Vec::new();
            let outcome = HallucinationEnsemble::new(thresholds)
                .evaluate(&question, &answer, &knowledge, similarity, factuality);

            let applied: f64 = outcome.signals.iter().map(|s| weights.get(s.kind)).sum();
            let normalized = outcome.normalized_weights();

            if applied > 0.0 {
                prop_assert_eq!(normalized.len(), outcome.signals.len());
                let total: f64 = normalized.iter().map(|(_, w)| w).sum();
                prop_assert!((total - 1.0).abs() < 1e-6, "sum {}", total);
                for (kind, w) in &normalized {
                    prop_assert!((w - weights.get(*kind) / applied).abs() < 1e-9);
                }

                let expected: f64 = outcome
                    .signals
                    .iter()
                    .map(|s| s.score * weights.get(s.kind))
                    .sum::<f64>()
                    / applied;
                prop_assert!((outcome.risk_score - expected).abs() < 1e-9);
            } else {
                prop_assert_eq!(outcome.risk_score, 0.0);
            }
        }

        #[test]
        fn low_similarity_always_high_risk(signals in signals(), similarity in 0.0f64..0.4) {
            let decision = decide(&signals, 1.0, 0.4, Some(similarity));
            prop_assert!(decision.is_high_risk);
        }
    }

    // =========================================================================
    // Reverse generation
    // =========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn reverse_candidates_bounded_by_attempts(
            outputs in prop::collection::vec(prop_oneof![Just(String::new()), non_empty_text()], 0..6),
            attempts in 0usize..5,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let non_empty = outputs
                .iter()
                .take(attempts)
                .filter(|o| !o.trim().is_empty())
                .count();

            let generator = ReverseQuestionGenerator::new(Arc::new(MockGenerator::scripted(outputs)));
            let outcome = runtime.block_on(generator.generate("高血压 是什么", "answer", attempts));

            prop_assert!(outcome.candidates.len() <= attempts);
            prop_assert_eq!(outcome.is_failure(), outcome.candidates.is_empty());
            prop_assert_eq!(outcome.best.is_none(), outcome.candidates.is_empty());
            if non_empty == 0 {
                prop_assert!(outcome.is_failure());
            }
        }
    }
}
