//! Keyword extraction from questions.
//!
//! Text is segmented and part-of-speech tagged with jieba. Keywords are
//! ranked by TF-IDF (or TextRank) over nouns, verbal nouns, verbs and
//! adjectives only; when too few survive, the remaining vocabulary is
//! appended by frequency.

use jieba_rs::{Jieba, KeywordExtract, TextRank, TfIdf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use super::tokenize;

/// Default number of keywords returned by [`KeywordExtractor::extract_default`].
pub const DEFAULT_TOP_K: usize = 4;
/// Default lower bound before frequency supplementation kicks in.
pub const DEFAULT_MIN_KEYWORDS: usize = 2;

/// Tags eligible for ranking: noun, verbal noun, verb, adjective, adjectival noun.
pub const CONTENT_POS: [&str; 5] = ["n", "vn", "v", "a", "an"];
/// Tags reported as entities: person, place, organization, other proper noun.
pub const ENTITY_POS: [&str; 4] = ["nr", "ns", "nt", "nz"];

static JIEBA: LazyLock<Jieba> = LazyLock::new(Jieba::new);
static TF_IDF: LazyLock<TfIdf> = LazyLock::new(TfIdf::default);
static TEXT_RANK: LazyLock<TextRank> = LazyLock::new(TextRank::default);

static PUNCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid punctuation pattern"));

/// Ranking used for content words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordMethod {
    #[default]
    TfIdf,
    TextRank,
}

/// Keywords, entities and tagging statistics for one text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordAnalysis {
    pub keywords: Vec<String>,
    pub entities: Vec<String>,
    /// Word count per part-of-speech tag
    pub pos_counts: BTreeMap<String, usize>,
    pub terms: usize,
    pub distinct_terms: usize,
    /// Share of words written in Han characters
    pub han_ratio: f64,
}

/// Extracts salient terms from short texts.
#[derive(Debug, Clone, Default)]
pub struct KeywordExtractor {
    method: KeywordMethod,
}

struct WordStat {
    text: String,
    count: usize,
    first: usize,
    char_len: usize,
    function: bool,
}

impl KeywordExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(method: KeywordMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> KeywordMethod {
        self.method
    }

    /// Extract up to `top_k` deduplicated keywords from `text`.
    ///
    /// Ranked content words come first (highest weight first, ties in text
    /// order). If fewer than `min_keywords` remain after stop-word
    /// filtering, other words longer than one character are appended: content
    /// before function words, then by count, length and text order.
    pub fn extract(&self, text: &str, top_k: usize, min_keywords: usize) -> Vec<String> {
        if top_k == 0 {
            return Vec::new();
        }
        let cleaned = PUNCT_RE.replace_all(text, "");
        if cleaned.trim().is_empty() {
            return Vec::new();
        }

        let words = JIEBA.cut(&cleaned, true);
        let mut keywords: Vec<String> = Vec::new();
        for keyword in self.ranked(&cleaned, words.len()) {
            if !tokenize::is_stop_word(&keyword.to_lowercase()) && !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }
        keywords.truncate(top_k);

        if keywords.len() < min_keywords {
            for stat in supplement(&words) {
                if keywords.len() >= top_k {
                    break;
                }
                if !keywords.contains(&stat.text) {
                    keywords.push(stat.text);
                }
            }
        }

        keywords
    }

    /// [`extract`](Self::extract) with the default limits.
    pub fn extract_default(&self, text: &str) -> Vec<String> {
        self.extract(text, DEFAULT_TOP_K, DEFAULT_MIN_KEYWORDS)
    }

    /// Named entities (people, places, organizations) in text order.
    pub fn extract_entities(&self, text: &str) -> Vec<String> {
        let mut entities: Vec<String> = Vec::new();
        for tag in JIEBA.tag(text, true) {
            if ENTITY_POS.contains(&tag.tag)
                && tag.word.chars().count() > 1
                && !entities.iter().any(|e| e == tag.word)
            {
                entities.push(tag.word.to_string());
            }
        }
        entities
    }

    /// Keywords with the default limits, entities and tag statistics.
    pub fn analyze(&self, text: &str) -> KeywordAnalysis {
        if text.trim().is_empty() {
            return KeywordAnalysis::default();
        }

        let mut pos_counts = BTreeMap::new();
        let mut distinct = HashMap::new();
        let mut terms = 0;
        let mut han = 0;

        for tag in JIEBA.tag(text, true) {
            if tag.word.trim().is_empty() {
                continue;
            }
            terms += 1;
            if tokenize::is_han(tag.word) {
                han += 1;
            }
            *distinct.entry(tag.word).or_insert(0usize) += 1;
            *pos_counts.entry(tag.tag.to_string()).or_insert(0) += 1;
        }

        KeywordAnalysis {
            keywords: self.extract_default(text),
            entities: self.extract_entities(text),
            pos_counts,
            terms,
            distinct_terms: distinct.len(),
            han_ratio: if terms == 0 {
                0.0
            } else {
                han as f64 / terms as f64
            },
        }
    }

    /// Every content keyword jieba finds, best first, ties in text order.
    fn ranked(&self, text: &str, limit: usize) -> Vec<String> {
        let allowed: Vec<String> = CONTENT_POS.iter().map(|p| p.to_string()).collect();
        let limit = limit.max(1);

        let mut ranked = match self.method {
            KeywordMethod::TfIdf => TF_IDF.extract_keywords(&JIEBA, text, limit, allowed),
            KeywordMethod::TextRank => TEXT_RANK.extract_keywords(&JIEBA, text, limit, allowed),
        };
        ranked.sort_by(|a, b| {
            b.weight.total_cmp(&a.weight).then_with(|| {
                let pa = text.find(&a.keyword).unwrap_or(usize::MAX);
                let pb = text.find(&b.keyword).unwrap_or(usize::MAX);
                pa.cmp(&pb).then_with(|| a.keyword.cmp(&b.keyword))
            })
        });

        ranked.into_iter().map(|k| k.keyword).collect()
    }
}

/// Non-stop words longer than one character, in supplement order.
fn supplement(words: &[&str]) -> Vec<WordStat> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut stats: Vec<WordStat> = Vec::new();

    for (position, word) in words.iter().enumerate() {
        let word = word.trim().to_lowercase();
        let char_len = word.chars().count();
        if char_len <= 1 || tokenize::is_stop_word(&word) {
            continue;
        }
        match index.get(&word) {
            Some(&i) => stats[i].count += 1,
            None => {
                index.insert(word.clone(), stats.len());
                stats.push(WordStat {
                    function: tokenize::is_function_word(&word),
                    text: word,
                    count: 1,
                    first: position,
                    char_len,
                });
            }
        }
    }

    stats.sort_by(|a, b| {
        a.function
            .cmp(&b.function)
            .then(b.count.cmp(&a.count))
            .then(b.char_len.cmp(&a.char_len))
            .then(a.first.cmp(&b.first))
    });
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn assert_whole_words(question: &str, keywords: &[String], fragments: &[&str]) {
        assert!(!keywords.is_empty());
        for k in keywords {
            assert!(question.contains(k.as_str()), "{:?} not in {:?}", k, question);
            assert!(!fragments.contains(&k.as_str()), "cross-word fragment {:?}", k);
        }
    }

    #[test]
    fn test_chinese_nouns_not_fragments() {
        let extractor = KeywordExtractor::new();
        let question = "高血压患者能吃香蕉吗";
        let keywords = extractor.extract(question, 4, 2);

        assert!(keywords.iter().any(|k| k == "香蕉"), "{:?}", keywords);
        assert_whole_words(question, &keywords, &["压患", "者能", "血压患", "蕉吗"]);
    }

    #[test]
    fn test_chinese_breakfast_question() {
        let extractor = KeywordExtractor::new();
        let question = "糖尿病人早餐吃什么好";
        let keywords = extractor.extract(question, 4, 2);

        assert!(keywords.iter().any(|k| k == "早餐"), "{:?}", keywords);
        assert_whole_words(question, &keywords, &["尿病", "餐吃"]);
    }

    #[test]
    fn test_chinese_side_effects() {
        let extractor = KeywordExtractor::new();
        let question = "新冠疫苗有哪些副作用";
        let keywords = extractor.extract(question, 4, 2);

        assert!(keywords.iter().any(|k| k == "副作用"), "{:?}", keywords);
        assert_whole_words(question, &keywords, &["冠疫", "些副"]);
    }

    #[test]
    fn test_text_rank_method() {
        let extractor = KeywordExtractor::with_method(KeywordMethod::TextRank);
        assert_eq!(extractor.method(), KeywordMethod::TextRank);

        let question = "高血压患者能吃香蕉吗";
        let keywords = extractor.extract(question, 3, 2);
        assert_whole_words(question, &keywords, &["压患", "者能"]);
    }

    #[test]
    fn test_english_question_supplemented_by_length() {
        let extractor = KeywordExtractor::new();
        let keywords = extractor.extract("What are the side effects of aspirin?", 3, 2);
        assert_eq!(keywords, vec!["effects", "aspirin", "side"]);
    }

    #[test]
    fn test_function_words_ranked_last() {
        let extractor = KeywordExtractor::new();
        let keywords = extractor.extract("What are the side effects of aspirin?", 4, 2);
        assert_eq!(keywords, vec!["effects", "aspirin", "side", "what"]);
        assert_eq!(extractor.extract("what is it?", 3, 2), vec!["what"]);
    }

    #[test]
    fn test_frequency_raises_rank() {
        let extractor = KeywordExtractor::new();
        let keywords = extractor.extract("diet plan, diet food, diet sleep", 2, 1);
        assert_eq!(keywords, vec!["diet", "sleep"]);
    }

    #[test]
    fn test_numbers_only_via_supplement() {
        let extractor = KeywordExtractor::new();
        assert_eq!(extractor.extract("2024", 3, 0), Vec::<String>::new());
        assert_eq!(extractor.extract("2024", 3, 1), vec!["2024"]);
    }

    #[test]
    fn test_empty_and_degenerate_inputs() {
        let extractor = KeywordExtractor::new();
        assert!(extractor.extract("", 3, 2).is_empty());
        assert!(extractor.extract("   \n\t", 3, 2).is_empty());
        assert!(extractor.extract("?!。", 3, 2).is_empty());
        assert!(extractor.extract("diabetes", 0, 2).is_empty());
    }

    #[test]
    fn test_deduplicated_and_deterministic() {
        let extractor = KeywordExtractor::new();
        let text = "疫苗 疫苗 疫苗 安全 安全";
        let first = extractor.extract(text, 4, 2);

        assert!(first.iter().any(|k| k == "疫苗"));
        assert!(first.iter().any(|k| k == "安全"));
        assert_eq!(first.len(), 2);
        assert_eq!(first, extractor.extract(text, 4, 2));
    }

    #[test]
    fn test_entities() {
        let extractor = KeywordExtractor::new();
        let entities = extractor.extract_entities("我在北京吃烤鸭");
        assert!(entities.iter().any(|e| e == "北京"), "{:?}", entities);
        assert!(extractor.extract_entities("").is_empty());
    }

    #[test]
    fn test_analyze() {
        let extractor = KeywordExtractor::new();
        let analysis = extractor.analyze("高血压 treatment");

        assert!(analysis.keywords.iter().any(|k| k == "treatment"));
        assert!(analysis.han_ratio > 0.0 && analysis.han_ratio < 1.0);
        assert_eq!(analysis.pos_counts.values().sum::<usize>(), analysis.terms);

        assert_eq!(extractor.analyze("  "), KeywordAnalysis::default());
    }
}
