//! Persistent verification history.
//!
//! Every completed [`VerificationResult`](crate::detection::VerificationResult)
//! can be written to a SQLite database and queried later for recent or
//! filtered entries, aggregate statistics and a Markdown report. The same
//! database keeps a log of individual LLM calls.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hallucheck_core::history::{HistoryFilter, SqliteHistoryStore};
//!
//! let store = SqliteHistoryStore::open("data/history.db")?;
//! store.save(&result)?;
//!
//! let stats = store.stats()?;
//! println!("{} of {} high risk", stats.high_risk, stats.total);
//!
//! let risky = store.query(&HistoryFilter::new().with_high_risk(true).with_limit(20))?;
//! println!("{}", store.report()?);
//! ```

mod schema;
mod store;

pub use schema::SCHEMA_VERSION;
pub use store::{
    HistoryFilter, HistoryStats, SimilarityHistogram, SqliteHistoryStore, SIMILARITY_BUCKETS,
};
