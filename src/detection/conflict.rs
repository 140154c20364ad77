//! Lexical check of answers against known facts.

use tracing::warn;

use super::types::KnowledgeConflict;

/// Read access to `(key, fact)` pairs.
///
/// Entries are checked in iteration order and the first conflicting key
/// wins, so implementations should iterate deterministically.
pub trait KnowledgeSource: Send + Sync {
    fn entries(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_>;

    /// Alternative phrasings accepted in place of `fact`.
    fn synonyms(&self, _fact: &str) -> Vec<&str> {
        Vec::new()
    }
}

impl KnowledgeSource for Vec<(String, String)> {
    fn entries(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_> {
        Box::new(self.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

/// Flags answers that omit the stored fact for a key the question mentions.
///
/// Deliberately coarse: a key is "mentioned" when it is a substring of the
/// question, and the fact is "respected" when it (or a registered synonym)
/// is a substring of the answer.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeConflictDetector;

impl KnowledgeConflictDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn check(
        &self,
        question: &str,
        answer: &str,
        knowledge: &dyn KnowledgeSource,
    ) -> KnowledgeConflict {
        if question.is_empty() || answer.is_empty() {
            return KnowledgeConflict::none();
        }

        for (key, fact) in knowledge.entries() {
            if key.is_empty() || !question.contains(key) {
                continue;
            }

            let respected = answer.contains(fact)
                || knowledge
                    .synonyms(fact)
                    .iter()
                    .any(|s| !s.is_empty() && answer.contains(s));
            if respected {
                continue;
            }

            warn!(key, "Answer may conflict with stored knowledge");
            return KnowledgeConflict {
                is_conflict: true,
                info: format!("Answer may conflict with known information: {} - {}", key, fact),
                key: Some(key.to_string()),
            };
        }

        KnowledgeConflict::none()
    }
}
