//! Text analysis shared by the detectors.
//!
//! - [`KeywordExtractor`]: salient terms of a question (jieba segmentation
//!   and part-of-speech tagging)
//! - [`SimilarityScorer`]: symmetric similarity in `[0, 1]`
//! - [`tokenize`]: dictionary-free terms and word lists

mod keywords;
mod similarity;
pub mod tokenize;

pub use keywords::{
    KeywordAnalysis, KeywordExtractor, KeywordMethod, CONTENT_POS, DEFAULT_MIN_KEYWORDS,
    DEFAULT_TOP_K, ENTITY_POS,
};
pub use similarity::{SimilarityMethod, SimilarityScorer};
