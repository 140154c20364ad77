//! SQLite-backed verification history.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::detection::{SignalScore, VerificationResult};
use crate::error::{Error, Result};
use crate::llm::{ApiCallRecord, CallRecorder};

use super::schema::{initialize_schema, is_initialized};

const SELECT_COLUMNS: &str = "SELECT id, question, answer, keywords, reverse_question, similarity,
        candidates, signals, risk_score, is_high_risk, factuality_score, factuality_reason,
        knowledge_conflict, conflict_info, error, created_at, latency_ms
    FROM verifications";

/// Aggregate statistics over stored verifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total: u64,
    pub high_risk: u64,
    pub low_risk: u64,
    /// Mean reverse similarity over verifications that produced an answer
    pub average_similarity: f64,
    pub average_risk_score: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl HistoryStats {
    pub fn high_risk_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.high_risk as f64 / self.total as f64
        }
    }
}

/// Labels of the [`SimilarityHistogram`] buckets.
pub const SIMILARITY_BUCKETS: [&str; 5] = ["0.0-0.2", "0.2-0.4", "0.4-0.6", "0.6-0.8", "0.8-1.0"];

/// Reverse similarity of answered verifications in five equal-width buckets.
///
/// Buckets are half-open (`[0.0, 0.2)` and so on) except the last, which
/// also holds 1.0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityHistogram {
    pub counts: [u64; 5],
}

impl SimilarityHistogram {
    fn bucket(similarity: f64) -> usize {
        ((similarity.clamp(0.0, 1.0) * 5.0).floor() as usize).min(4)
    }

    pub fn add(&mut self, similarity: f64) {
        self.counts[Self::bucket(similarity)] += 1;
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// `(label, count)` pairs, lowest bucket first.
    pub fn buckets(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        SIMILARITY_BUCKETS.iter().copied().zip(self.counts.iter().copied())
    }
}

/// Criteria for [`SqliteHistoryStore::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFilter {
    pub high_risk: Option<bool>,
    /// Keep only failed (`true`) or only answered (`false`) verifications
    pub failed: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    /// Substring of the question or the answer
    pub text: Option<String>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_high_risk(mut self, high_risk: bool) -> Self {
        self.high_risk = Some(high_risk);
        self
    }

    pub fn with_failed(mut self, failed: bool) -> Self {
        self.failed = Some(failed);
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(high_risk) = self.high_risk {
            clauses.push("is_high_risk = ?");
            values.push(Value::Integer(i64::from(high_risk)));
        }
        match self.failed {
            Some(true) => clauses.push("error IS NOT NULL"),
            Some(false) => clauses.push("error IS NULL"),
            None => {}
        }
        if let Some(since) = self.since {
            clauses.push("created_at >= ?");
            values.push(Value::Text(format_timestamp(&since)));
        }
        if let Some(ref text) = self.text {
            clauses.push("(instr(question, ?) > 0 OR instr(answer, ?) > 0)");
            values.push(Value::Text(text.clone()));
            values.push(Value::Text(text.clone()));
        }

        let mut sql = SELECT_COLUMNS.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ?");
        values.push(Value::Integer(
            self.limit.map(|n| n.min(i64::MAX as usize) as i64).unwrap_or(-1),
        ));

        (sql, values)
    }
}

/// SQLite-backed store of [`VerificationResult`]s and LLM call records.
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteHistoryStore {
    /// Open or create a history database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        if !is_initialized(&conn) {
            info!(path = %path.display(), "Creating history database");
        }
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Database file, if the store is not in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Timestamped sibling of the database file used by
    /// [`clear_with_backup`](Self::clear_with_backup):
    /// `history.db` becomes `history.db.20250101120000.bak`.
    pub fn backup_path(&self, at: DateTime<Utc>) -> Option<PathBuf> {
        self.path.as_ref().map(|path| {
            let mut name = path.as_os_str().to_owned();
            name.push(format!(".{}.bak", at.format("%Y%m%d%H%M%S")));
            PathBuf::from(name)
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn).map_err(|e| Error::HistoryStorage(e.to_string()))
    }

    /// Store a result, replacing any previous row with the same id.
    pub fn save(&self, result: &VerificationResult) -> Result<()> {
        let keywords = serde_json::to_string(&result.keywords)?;
        let candidates = serde_json::to_string(&result.candidates)?;
        let signals = serde_json::to_string(&result.signals)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO verifications (
                    id, question, answer, keywords, reverse_question, similarity,
                    candidates, signals, risk_score, is_high_risk, factuality_score,
                    factuality_reason, knowledge_conflict, conflict_info, error,
                    created_at, latency_ms
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    result.id.to_string(),
                    result.question,
                    result.answer,
                    keywords,
                    result.reverse_question,
                    result.similarity,
                    candidates,
                    signals,
                    result.risk_score,
                    result.is_high_risk,
                    result.factuality_score,
                    result.factuality_reason,
                    result.knowledge_conflict,
                    result.conflict_info,
                    result.error,
                    format_timestamp(&result.created_at),
                    result.latency_ms as i64,
                ],
            )?;
            Ok(())
        })?;

        debug!(id = %result.id, "Verification saved");
        Ok(())
    }

    /// Get a result by id.
    pub fn get(&self, id: &Uuid) -> Result<Option<VerificationResult>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id.to_string()],
                Self::row_to_result,
            )
            .optional()
        })
    }

    /// The most recent results, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<VerificationResult>> {
        self.query(&HistoryFilter::new().with_limit(limit))
    }

    /// Results matching `filter`, newest first.
    pub fn query(&self, filter: &HistoryFilter) -> Result<Vec<VerificationResult>> {
        let (sql, values) = filter.to_sql();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), Self::row_to_result)?;
            rows.collect()
        })
    }

    pub fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM verifications", [], |row| {
                row.get::<_, i64>(0)
            })
        })
        .map(|n| n.max(0) as u64)
    }

    pub fn stats(&self) -> Result<HistoryStats> {
        self.with_conn(|conn| {
            let (total, high_risk, average_risk_score, last_updated): (
                i64,
                i64,
                Option<f64>,
                Option<String>,
            ) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(is_high_risk), 0), AVG(risk_score), MAX(created_at)
                 FROM verifications",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

            let average_similarity: Option<f64> = conn.query_row(
                "SELECT AVG(similarity) FROM verifications WHERE error IS NULL",
                [],
                |row| row.get(0),
            )?;

            let total = total.max(0) as u64;
            let high_risk = high_risk.max(0) as u64;

            Ok(HistoryStats {
                total,
                high_risk,
                low_risk: total.saturating_sub(high_risk),
                average_similarity: average_similarity.unwrap_or(0.0),
                average_risk_score: average_risk_score.unwrap_or(0.0),
                last_updated: last_updated.as_deref().map(parse_timestamp),
            })
        })
    }

    /// Similarity distribution over verifications that produced an answer.
    pub fn similarity_histogram(&self) -> Result<SimilarityHistogram> {
        let similarities: Vec<f64> = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT similarity FROM verifications WHERE error IS NULL")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })?;

        let mut histogram = SimilarityHistogram::default();
        for similarity in similarities {
            histogram.add(similarity);
        }
        Ok(histogram)
    }

    /// Markdown summary of the stored history.
    pub fn report(&self) -> Result<String> {
        let stats = self.stats()?;
        let mut report = String::from("# Verification Report\n\n");

        if stats.total == 0 {
            report.push_str("No verifications recorded yet.\n");
            return Ok(report);
        }

        let histogram = self.similarity_histogram()?;
        let percent = |n: u64| n as f64 / stats.total as f64 * 100.0;

        // Writing to a String cannot fail.
        let _ = writeln!(report, "Generated: {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(report, "## Summary\n");
        let _ = writeln!(report, "- Total verifications: {}", stats.total);
        let _ = writeln!(
            report,
            "- High risk: {} ({:.1}%)",
            stats.high_risk,
            percent(stats.high_risk)
        );
        let _ = writeln!(
            report,
            "- Low risk: {} ({:.1}%)",
            stats.low_risk,
            percent(stats.low_risk)
        );
        let _ = writeln!(report, "- Average similarity: {:.4}", stats.average_similarity);
        let _ = writeln!(report, "- Average risk score: {:.4}", stats.average_risk_score);
        let _ = writeln!(report, "\n## Similarity Distribution\n");
        for (label, count) in histogram.buckets() {
            let _ = writeln!(report, "- {}: {}", label, count);
        }

        Ok(report)
    }

    /// Copy the whole database to `dest`, which must not exist yet.
    pub fn backup(&self, dest: impl AsRef<Path>) -> Result<()> {
        let dest = dest.as_ref();
        if dest.exists() {
            return Err(Error::HistoryStorage(format!(
                "Backup target already exists: {}",
                dest.display()
            )));
        }
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let target = dest.to_string_lossy().into_owned();
        self.with_conn(|conn| conn.execute("VACUUM INTO ?1", params![target]))?;

        info!(path = %dest.display(), "History backed up");
        Ok(())
    }

    /// Delete every stored result. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.with_conn(|conn| conn.execute("DELETE FROM verifications", []))?;
        info!(removed, "History cleared");
        Ok(removed)
    }

    /// [`backup`](Self::backup) to `dest`, then [`clear`](Self::clear).
    /// Nothing is deleted if the backup fails.
    pub fn clear_with_backup(&self, dest: impl AsRef<Path>) -> Result<usize> {
        self.backup(dest)?;
        self.clear()
    }

    /// Append one LLM call to the call log.
    pub fn save_api_call(&self, record: &ApiCallRecord) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO api_calls (timestamp, model, prompt, response, elapsed_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    format_timestamp(&record.timestamp),
                    record.model,
                    record.prompt,
                    record.response,
                    record.elapsed_ms.min(i64::MAX as u64) as i64,
                ],
            )?;
            Ok(())
        })
    }

    /// The most recent LLM calls, newest first.
    pub fn api_calls(&self, limit: usize) -> Result<Vec<ApiCallRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, model, prompt, response, elapsed_ms FROM api_calls
                 ORDER BY timestamp DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit.min(i64::MAX as usize) as i64], |row| {
                let timestamp: String = row.get(0)?;
                let elapsed_ms: i64 = row.get(4)?;
                Ok(ApiCallRecord {
                    timestamp: parse_timestamp(&timestamp),
                    model: row.get(1)?,
                    prompt: row.get(2)?,
                    response: row.get(3)?,
                    elapsed_ms: elapsed_ms.max(0) as u64,
                })
            })?;
            rows.collect()
        })
    }

    fn row_to_result(row: &rusqlite::Row) -> rusqlite::Result<VerificationResult> {
        let id_str: String = row.get(0)?;
        let keywords: String = row.get(3)?;
        let candidates: String = row.get(6)?;
        let signals: String = row.get(7)?;
        let created_at: String = row.get(15)?;
        let latency_ms: i64 = row.get(16)?;

        Ok(VerificationResult {
            id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::new_v4()),
            question: row.get(1)?,
            answer: row.get(2)?,
            keywords: serde_json::from_str(&keywords).unwrap_or_default(),
            reverse_question: row.get(4)?,
            similarity: row.get(5)?,
            candidates: serde_json::from_str(&candidates).unwrap_or_default(),
            signals: serde_json::from_str::<Vec<SignalScore>>(&signals).unwrap_or_default(),
            risk_score: row.get(8)?,
            is_high_risk: row.get(9)?,
            factuality_score: row.get(10)?,
            factuality_reason: row.get(11)?,
            knowledge_conflict: row.get(12)?,
            conflict_info: row.get(13)?,
            error: row.get(14)?,
            created_at: parse_timestamp(&created_at),
            latency_ms: latency_ms.max(0) as u64,
        })
    }
}

impl CallRecorder for SqliteHistoryStore {
    fn record_call(&self, record: &ApiCallRecord) -> Result<()> {
        self.save_api_call(record)
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
