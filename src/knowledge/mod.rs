//! Knowledge store used by the conflict detector.
//!
//! [`KnowledgeBase`] holds `key -> fact` pairs in insertion order. It is
//! passed explicitly to every check through the
//! [`KnowledgeSource`](crate::detection::KnowledgeSource) trait; there is no
//! global instance.
//!
//! Persistence is a pretty-printed JSON object (key order preserved), with
//! CSV import and export for bulk editing.

mod store;

pub use store::{KnowledgeBase, DEFAULT_FACTS};
