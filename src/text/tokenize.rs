//! Dictionary-free terms for similarity scoring.
//!
//! Latin, Cyrillic, digits and other non-Han letters form word runs that are
//! lowercased as-is. Han runs carry no word boundaries and are broken into
//! overlapping character bigrams, which keeps similarity independent of any
//! segmentation dictionary.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Han runs and non-Han word runs, in text order.
static RUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\p{Han}+|[\p{L}\p{N}_&&[^\p{Han}]]+").expect("valid run pattern")
});

static HAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\p{Han}+$").expect("valid han pattern"));

/// Unicode word tokens (letters, digits, underscore).
static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("valid word pattern"));

/// Stop words never returned as keywords.
pub const STOP_WORDS: &[&str] = &[
    // Chinese
    "的", "是", "了", "在", "和", "与", "或", "什么", "怎么", "如何", "为什么", "哪些",
    "这个", "那个", "这些", "那些", "一个", "一些", "有些", "可以", "不能", "应该", "需要",
    "可能", "一定", "必须", "我", "你", "他", "她", "它", "我们", "你们", "他们", "吗",
    "呢", "吧", "啊", "么", "就", "都", "也", "还", "把", "被", "让", "给", "对", "从",
    // English
    "a", "an", "the", "and", "or", "but", "of", "to", "in", "on", "at", "by", "for", "with",
    "from", "as", "is", "are", "was", "were", "be", "been", "being", "it", "its", "this",
    "that", "these", "those", "i", "you", "he", "she", "we", "they", "me", "my", "your",
    "our", "their", "do", "does", "did", "can", "could", "should", "would", "will", "shall",
    "may", "might", "must", "not", "no", "if", "so", "than", "then", "there",
];

/// Words that carry little content on their own: question words,
/// adverbs, auxiliaries, measure words. Ranked last when keywords are
/// supplemented by frequency.
pub const FUNCTION_WORDS: &[&str] = &[
    // Chinese
    "有", "没有", "能", "会", "要", "很", "非常", "比较", "已经", "正在", "还是", "或者",
    "因为", "所以", "但是", "如果", "那么", "怎样", "多少", "哪里", "哪个", "是否", "有没有",
    "个", "种", "次", "些", "得", "地", "着", "过", "好", "大家", "时候",
    // English
    "what", "which", "who", "whom", "whose", "when", "where", "why", "how", "have", "has",
    "had", "very", "also", "just", "only", "really", "about", "into", "some", "any", "all",
    "more", "most", "much", "many", "such", "other", "each", "every", "ever", "please",
];

static STOP_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());
static FUNCTION_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| FUNCTION_WORDS.iter().copied().collect());

pub fn is_stop_word(term: &str) -> bool {
    STOP_SET.contains(term)
}

pub fn is_function_word(term: &str) -> bool {
    FUNCTION_SET.contains(term)
}

pub fn is_han(s: &str) -> bool {
    HAN_RE.is_match(s)
}

/// Lowercase terms of `text` in text order: non-Han word runs whole, Han
/// runs as overlapping bigrams (a lone Han character stays a term).
pub fn bigrams(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut terms = Vec::new();

    for run in RUN_RE.find_iter(&lower).map(|m| m.as_str()) {
        if !is_han(run) {
            terms.push(run.to_string());
            continue;
        }

        let chars: Vec<char> = run.chars().collect();
        if chars.len() == 1 {
            terms.push(run.to_string());
        } else {
            terms.extend(chars.windows(2).map(|pair| pair.iter().collect::<String>()));
        }
    }

    terms
}

/// Unicode word tokens of `text`, lowercased.
pub fn words(text: &str) -> Vec<String> {
    WORD_RE
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}
