//! Insertion-ordered knowledge base with JSON and CSV persistence.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::detection::KnowledgeSource;
use crate::error::{Error, Result};

/// Facts shipped with the crate, used when no knowledge file exists.
pub const DEFAULT_FACTS: [(&str, &str); 9] = [
    ("癌症", "目前没有简单的治愈方法，需要专业医疗团队制定综合治疗方案"),
    ("新冠", "需要遵循医生建议和官方指南，注意个人防护和公共卫生"),
    ("减肥", "健康减肥需要均衡饮食和适当运动，避免极端节食"),
    ("投资", "投资有风险，需谨慎决策，分散投资降低风险"),
    ("疫苗", "疫苗接种应遵循医生建议，了解可能的副作用"),
    ("药物", "用药应遵医嘱，不可自行调整剂量，注意药物相互作用"),
    ("心理健康", "心理问题需要专业帮助，及时寻求心理医生或咨询师支持"),
    ("自然疗法", "许多自然疗法缺乏科学验证，不应替代常规医疗"),
    ("饮食补充剂", "补充剂不受严格监管，效果和安全性可能缺乏充分证据"),
];

/// Cell values treated as missing on CSV import.
const MISSING_CELLS: [&str; 2] = ["nan", "NaN"];

/// Key to fact mapping checked against answers.
///
/// Keys keep their insertion order; updating an existing key keeps its
/// position. Synonyms are registered per fact and accepted in its place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeBase {
    entries: Vec<(String, String)>,
    synonyms: HashMap<String, Vec<String>>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        Self::from_pairs(DEFAULT_FACTS)
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut kb = Self::new();
        for (key, fact) in pairs {
            kb.upsert(key.into(), fact.into());
        }
        kb
    }

    /// Load `path` if it exists, otherwise start from the defaults.
    ///
    /// An unreadable file is logged and the defaults are used.
    pub fn open_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "No knowledge file, using defaults");
            return Self::with_defaults();
        }

        let mut kb = Self::new();
        match kb.load_json(path) {
            Ok(_) => kb,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load knowledge, using defaults");
                Self::with_defaults()
            }
        }
    }

    fn upsert(&mut self, key: String, fact: String) -> bool {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => {
                entry.1 = fact;
                false
            }
            None => {
                self.entries.push((key, fact));
                true
            }
        }
    }

    /// Insert or update a fact. Returns true when the key is new.
    pub fn add(&mut self, key: impl Into<String>, fact: impl Into<String>) -> bool {
        let key = key.into();
        let fact = fact.into();
        info!(key = %key, "Knowledge added");
        self.upsert(key, fact)
    }

    /// Remove a key, returning its fact.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        let (_, fact) = self.entries.remove(index);
        info!(key, "Knowledge removed");
        Some(fact)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Accept `phrase` in answers wherever `fact` is expected.
    pub fn add_synonym(&mut self, fact: impl Into<String>, phrase: impl Into<String>) {
        let phrases = self.synonyms.entry(fact.into()).or_default();
        let phrase = phrase.into();
        if !phrases.contains(&phrase) {
            phrases.push(phrase);
        }
    }

    /// Replace all entries with the JSON object in `path`. Returns the count.
    pub fn load_json(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Err(Error::KnowledgeStore(format!(
                "Knowledge file is empty: {}",
                path.display()
            )));
        }

        let map: Map<String, Value> = serde_json::from_str(&content)?;
        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map {
            let fact = match value {
                Value::String(s) => s,
                other => {
                    return Err(Error::KnowledgeStore(format!(
                        "Fact for '{}' must be a string, got {}",
                        key, other
                    )))
                }
            };
            entries.push((key, fact));
        }

        self.entries = entries;
        info!(path = %path.display(), count = self.entries.len(), "Knowledge loaded");
        Ok(self.entries.len())
    }

    /// Write entries as a pretty JSON object, creating parent directories.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        ensure_parent(path)?;

        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        std::fs::write(path, serde_json::to_string_pretty(&Value::Object(map))?)?;

        info!(path = %path.display(), count = self.entries.len(), "Knowledge saved");
        Ok(())
    }

    /// Merge rows from a CSV file. Returns the number of rows imported.
    ///
    /// Uses the `Key` and `Value` columns (case-insensitive) when present,
    /// otherwise the first two columns. Blank and `nan` cells are skipped.
    pub fn import_csv(&mut self, path: &Path) -> Result<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)?;
        let headers = reader.headers()?.clone();

        let column = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        let (key_col, value_col) = match (column("key"), column("value")) {
            (Some(k), Some(v)) => (k, v),
            _ if headers.len() >= 2 => {
                debug!("CSV has no Key/Value headers, using the first two columns");
                (0, 1)
            }
            _ => {
                return Err(Error::KnowledgeStore(format!(
                    "CSV needs Key and Value columns: {}",
                    path.display()
                )))
            }
        };

        let mut imported = 0;
        for (row, record) in reader.records().enumerate() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(row = row + 1, error = %e, "Skipping unreadable CSV row");
                    continue;
                }
            };

            let cell = |i: usize| {
                record
                    .get(i)
                    .map(str::trim)
                    .filter(|s| !s.is_empty() && !MISSING_CELLS.contains(s))
            };
            if let (Some(key), Some(fact)) = (cell(key_col), cell(value_col)) {
                self.upsert(key.to_string(), fact.to_string());
                imported += 1;
            }
        }

        info!(path = %path.display(), imported, "Knowledge imported from CSV");
        Ok(imported)
    }

    /// Write entries to CSV with `Key` and `Value` headers.
    pub fn export_csv(&self, path: &Path) -> Result<()> {
        ensure_parent(path)?;

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["Key", "Value"])?;
        for (key, fact) in &self.entries {
            writer.write_record([key, fact])?;
        }
        writer.flush()?;

        info!(path = %path.display(), count = self.entries.len(), "Knowledge exported to CSV");
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

impl KnowledgeSource for KnowledgeBase {
    fn entries(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_> {
        Box::new(self.iter())
    }

    fn synonyms(&self, fact: &str) -> Vec<&str> {
        self.synonyms
            .get(fact)
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::KnowledgeConflictDetector;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let kb = KnowledgeBase::with_defaults();
        assert_eq!(kb.len(), 9);
        assert_eq!(kb.iter().next().map(|(k, _)| k), Some("癌症"));
        assert!(kb.get("投资").unwrap().contains("风险"));
    }

    #[test]
    fn test_add_keeps_position() {
        let mut kb = KnowledgeBase::from_pairs([("a", "1"), ("b", "2"), ("c", "3")]);

        assert!(!kb.add("b", "two"));
        assert!(kb.add("d", "4"));

        let keys: Vec<&str> = kb.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d"]);
        assert_eq!(kb.get("b"), Some("two"));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut kb = KnowledgeBase::from_pairs([("a", "1"), ("b", "2")]);

        assert_eq!(kb.remove("a"), Some("1".to_string()));
        assert_eq!(kb.remove("a"), None);
        assert_eq!(kb.len(), 1);

        kb.clear();
        assert!(kb.is_empty());
    }

    #[test]
    fn test_json_round_trip_preserves_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("knowledge_base.json");

        let kb = KnowledgeBase::from_pairs([("高血压", "需要长期服药控制"), ("糖尿病", "需要控制血糖"), ("感冒", "多休息")]);
        kb.save_json(&path).unwrap();

        let mut loaded = KnowledgeBase::with_defaults();
        assert_eq!(loaded.load_json(&path).unwrap(), 3);
        assert_eq!(loaded, kb);
    }

    #[test]
    fn test_load_rejects_bad_files() {
        let dir = TempDir::new().unwrap();

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "  ").unwrap();
        let mut kb = KnowledgeBase::with_defaults();
        assert!(matches!(kb.load_json(&empty), Err(Error::KnowledgeStore(_))));

        let invalid = dir.path().join("invalid.json");
        std::fs::write(&invalid, "{not json").unwrap();
        assert!(matches!(kb.load_json(&invalid), Err(Error::Serialization(_))));

        let non_string = dir.path().join("numbers.json");
        std::fs::write(&non_string, r#"{"a": 1}"#).unwrap();
        assert!(kb.load_json(&non_string).is_err());

        // failed loads leave the entries untouched
        assert_eq!(kb.len(), 9);
    }

    #[test]
    fn test_open_or_default() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(KnowledgeBase::open_or_default(&missing).len(), 9);

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "[]").unwrap();
        assert_eq!(KnowledgeBase::open_or_default(&corrupt).len(), 9);

        let saved = dir.path().join("kb.json");
        KnowledgeBase::from_pairs([("k", "v")]).save_json(&saved).unwrap();
        assert_eq!(KnowledgeBase::open_or_default(&saved).len(), 1);
    }

    #[test]
    fn test_csv_import_with_headers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("import.csv");
        std::fs::write(
            &path,
            "value,KEY\n需要长期服药控制,高血压\nnan,糖尿病\n,空值\n多休息,感冒\n",
        )
        .unwrap();

        let mut kb = KnowledgeBase::new();
        assert_eq!(kb.import_csv(&path).unwrap(), 2);
        assert_eq!(kb.get("高血压"), Some("需要长期服药控制"));
        assert_eq!(kb.get("感冒"), Some("多休息"));
        assert_eq!(kb.get("糖尿病"), None);
    }

    #[test]
    fn test_csv_import_first_two_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("import.csv");
        std::fs::write(&path, "topic,fact,source\n投资,有风险,book\n").unwrap();

        let mut kb = KnowledgeBase::with_defaults();
        assert_eq!(kb.import_csv(&path).unwrap(), 1);
        assert_eq!(kb.get("投资"), Some("有风险"));
        assert_eq!(kb.len(), 9);
    }

    #[test]
    fn test_csv_import_needs_two_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("import.csv");
        std::fs::write(&path, "only\nx\n").unwrap();

        let mut kb = KnowledgeBase::new();
        assert!(matches!(kb.import_csv(&path), Err(Error::KnowledgeStore(_))));
    }

    #[test]
    fn test_csv_export_then_import() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("export.csv");

        let kb = KnowledgeBase::from_pairs([("a,b", "quoted, fact"), ("c", "d")]);
        kb.export_csv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Key,Value\n"));

        let mut imported = KnowledgeBase::new();
        assert_eq!(imported.import_csv(&path).unwrap(), 2);
        assert_eq!(imported, kb);
    }

    #[test]
    fn test_synonyms_satisfy_conflict_check() {
        let mut kb = KnowledgeBase::from_pairs([("高血压", "需要长期服药控制")]);
        let detector = KnowledgeConflictDetector::new();

        assert!(detector.check("高血压怎么办", "坚持吃降压药", &kb).is_conflict);

        kb.add_synonym("需要长期服药控制", "降压药");
        assert!(!detector.check("高血压怎么办", "坚持吃降压药", &kb).is_conflict);
    }
}
