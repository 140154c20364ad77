//! Textual similarity scoring in `[0, 1]`.
//!
//! The default [`SimilarityMethod::TfIdf`] builds smoothed TF-IDF vectors
//! over the two-document corpus formed by the inputs and takes their cosine.
//! Han text is compared by character bigrams so no dictionary is needed.
//! When a vector has zero norm (whitespace or punctuation only) the score
//! falls back to a character alignment ratio. Scoring never fails.

use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::collections::{BTreeMap, BTreeSet};

use super::tokenize;

/// How two texts are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMethod {
    /// Cosine of smoothed TF-IDF vectors
    #[default]
    TfIdf,
    /// Cosine of raw term counts
    Count,
    /// Token-set overlap
    Jaccard,
    /// Character alignment ratio only
    SequenceRatio,
}

#[derive(Debug, Clone, Default)]
pub struct SimilarityScorer {
    method: SimilarityMethod,
}

impl SimilarityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(method: SimilarityMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> SimilarityMethod {
        self.method
    }

    /// Similarity of `a` and `b`, symmetric, in `[0, 1]`.
    ///
    /// Either input being the empty string scores 0.0.
    pub fn score(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let score = match self.method {
            SimilarityMethod::TfIdf => cosine_or_ratio(a, b, Weighting::TfIdf),
            SimilarityMethod::Count => cosine_or_ratio(a, b, Weighting::Count),
            SimilarityMethod::Jaccard => jaccard_or_ratio(a, b),
            SimilarityMethod::SequenceRatio => sequence_ratio(a, b),
        };

        if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        }
    }

    /// Score every candidate against `base`, order preserved.
    pub fn score_many<S: AsRef<str>>(&self, base: &str, candidates: &[S]) -> Vec<f64> {
        candidates
            .iter()
            .map(|c| self.score(base, c.as_ref()))
            .collect()
    }

    /// Index and score of the candidate most similar to `base`.
    ///
    /// Ties go to the earliest candidate. `None` when `candidates` is empty.
    pub fn best_match<S: AsRef<str>>(&self, base: &str, candidates: &[S]) -> Option<(usize, f64)> {
        argmax(&self.score_many(base, candidates))
    }

    /// Pairwise similarity of `texts`; symmetric with a unit diagonal.
    pub fn similarity_matrix<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Vec<f64>> {
        let n = texts.len();
        let mut matrix = vec![vec![0.0; n]; n];

        for i in 0..n {
            matrix[i][i] = 1.0;
            for j in (i + 1)..n {
                let s = self.score(texts[i].as_ref(), texts[j].as_ref());
                matrix[i][j] = s;
                matrix[j][i] = s;
            }
        }

        matrix
    }
}

/// First index holding the maximum value.
fn argmax(scores: &[f64]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &s) in scores.iter().enumerate() {
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best
}

#[derive(Clone, Copy)]
enum Weighting {
    TfIdf,
    Count,
}

fn term_counts(text: &str) -> BTreeMap<String, f64> {
    let mut counts = BTreeMap::new();
    for term in tokenize::bigrams(text) {
        *counts.entry(term).or_insert(0.0) += 1.0;
    }
    counts
}

fn cosine_or_ratio(a: &str, b: &str, weighting: Weighting) -> f64 {
    let tf_a = term_counts(a);
    let tf_b = term_counts(b);

    // n = 2 documents; idf = ln((1 + n) / (1 + df)) + 1
    let idf = |term: &str| -> f64 {
        match weighting {
            Weighting::Count => 1.0,
            Weighting::TfIdf => {
                let df = tf_a.contains_key(term) as u8 + tf_b.contains_key(term) as u8;
                (3.0 / (1.0 + df as f64)).ln() + 1.0
            }
        }
    };

    let weights = |tf: &BTreeMap<String, f64>| -> BTreeMap<String, f64> {
        tf.iter()
            .map(|(term, count)| (term.clone(), count * idf(term)))
            .collect()
    };
    let wa = weights(&tf_a);
    let wb = weights(&tf_b);

    let norm_a = wa.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b = wb.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return sequence_ratio(a, b);
    }

    let dot: f64 = wa
        .iter()
        .filter_map(|(term, w)| wb.get(term).map(|v| w * v))
        .sum();

    dot / (norm_a * norm_b)
}

fn jaccard_or_ratio(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<String> = tokenize::bigrams(a).into_iter().collect();
    let set_b: BTreeSet<String> = tokenize::bigrams(b).into_iter().collect();

    if set_a.is_empty() || set_b.is_empty() {
        return sequence_ratio(a, b);
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// `2 * matches / (len_a + len_b)` over characters.
fn sequence_ratio(a: &str, b: &str) -> f64 {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    TextDiff::from_chars(first, second).ratio() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_identical_texts() {
        let scorer = SimilarityScorer::new();
        assert!((scorer.score("高血压患者可以吃香蕉吗", "高血压患者可以吃香蕉吗") - 1.0).abs() < 0.01);
        assert!((scorer.score("Is aspirin safe?", "Is aspirin safe?") - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_scores_zero() {
        let scorer = SimilarityScorer::new();
        assert_eq!(scorer.score("", "anything"), 0.0);
        assert_eq!(scorer.score("anything", ""), 0.0);
        assert_eq!(scorer.score("", ""), 0.0);
    }

    #[test]
    fn test_disjoint_texts() {
        let scorer = SimilarityScorer::new();
        assert_eq!(scorer.score("apple", "香蕉"), 0.0);
    }

    #[test]
    fn test_smoothed_idf_weights() {
        let scorer = SimilarityScorer::new();
        // shared term idf 1.0, unique terms idf ln(1.5) + 1
        let unique = 1.5f64.ln() + 1.0;
        let expected = 1.0 / (1.0 + unique * unique);
        assert!(close(scorer.score("aa bb", "aa cc"), expected));
    }

    #[test]
    fn test_punctuation_falls_back_to_ratio() {
        let scorer = SimilarityScorer::new();
        assert!(close(scorer.score("?!", "?!"), 1.0));
        assert!(close(scorer.score("?!", ".."), 0.0));
        assert!(close(scorer.score("   ", "   "), 1.0));
        let partial = scorer.score("?!?!", "?!..");
        assert!(partial > 0.0 && partial < 1.0);
    }

    #[test]
    fn test_count_cosine() {
        let scorer = SimilarityScorer::with_method(SimilarityMethod::Count);
        assert!(close(scorer.score("x x y", "x y"), 3.0 / 10f64.sqrt()));
    }

    #[test]
    fn test_jaccard() {
        let scorer = SimilarityScorer::with_method(SimilarityMethod::Jaccard);
        assert!(close(scorer.score("a b c", "b c d"), 0.5));
    }

    #[test]
    fn test_sequence_ratio_symmetric() {
        let scorer = SimilarityScorer::with_method(SimilarityMethod::SequenceRatio);
        let ab = scorer.score("kitten", "sitting");
        let ba = scorer.score("sitting", "kitten");
        assert_eq!(ab, ba);
        assert!(ab > 0.0 && ab < 1.0);
    }

    #[test]
    fn test_best_match_prefers_earliest_tie() {
        let scorer = SimilarityScorer::new();
        let candidates = ["unrelated words", "高血压 饮食", "高血压 饮食"];
        let (index, score) = scorer.best_match("高血压 饮食", &candidates).unwrap();
        assert_eq!(index, 1);
        assert!((score - 1.0).abs() < 0.01);

        let empty: [&str; 0] = [];
        assert!(scorer.best_match("x", &empty).is_none());
    }

    #[test]
    fn test_score_many_preserves_order() {
        let scorer = SimilarityScorer::new();
        let scores = scorer.score_many("vaccine safety", &["vaccine safety", "", "weather"]);
        assert_eq!(scores.len(), 3);
        assert!(scores[0] > 0.99);
        assert_eq!(scores[1], 0.0);
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn test_similarity_matrix() {
        let scorer = SimilarityScorer::new();
        let texts = vec!["疫苗安全吗".to_string(), "疫苗安全性".to_string(), "天气".to_string()];
        let matrix = scorer.similarity_matrix(&texts);

        assert_eq!(matrix.len(), 3);
        for i in 0..3 {
            assert_eq!(matrix[i][i], 1.0);
            for j in 0..3 {
                assert_eq!(matrix[i][j], matrix[j][i]);
            }
        }
        assert!(matrix[0][1] > matrix[0][2]);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.2, 0.9, 0.9, 0.1]), Some((1, 0.9)));
        assert_eq!(argmax(&[]), None);
    }
}
