//! Error types for hallucheck-core.

use thiserror::Error;

/// Result type alias using hallucheck-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP statuses worth retrying: rate limiting and server-side failures.
const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Errors that can occur outside the detection core.
#[derive(Error, Debug)]
pub enum Error {
    /// LLM API returned a non-success status
    #[error("LLM API error: {provider} ({status}) - {message}")]
    LlmApi {
        provider: String,
        status: u16,
        message: String,
    },

    /// LLM error (simple variant)
    #[error("LLM error: {0}")]
    LLM(String),

    /// Network-level failure before a response arrived
    #[error("Transport error: {0}")]
    Transport(String),

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Knowledge store load/save/import error
    #[error("Knowledge store error: {0}")]
    KnowledgeStore(String),

    /// Verification history storage error
    #[error("History storage error: {0}")]
    HistoryStorage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A signal weight that is negative or not finite
    #[error("Invalid weight for {signal}: {value}")]
    InvalidWeight { signal: String, value: f64 },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an LLM API error.
    pub fn llm_api(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::LlmApi {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create an invalid weight error.
    pub fn invalid_weight(signal: impl Into<String>, value: f64) -> Self {
        Self::InvalidWeight {
            signal: signal.into(),
            value,
        }
    }

    /// Whether a retry may succeed.
    ///
    /// Rate limits, server errors, transport failures and timeouts are
    /// transient; everything else (auth, bad request, parse) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::LlmApi { status, .. } => TRANSIENT_STATUSES.contains(status),
            Self::Transport(_) | Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Self::KnowledgeStore(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::HistoryStorage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::llm_api("hunyuan", 429, "rate limited").is_transient());
        assert!(Error::llm_api("hunyuan", 503, "unavailable").is_transient());
        assert!(Error::Transport("connection reset".into()).is_transient());
        assert!(Error::timeout(120_000).is_transient());

        assert!(!Error::llm_api("hunyuan", 401, "bad key").is_transient());
        assert!(!Error::llm_api("openai", 400, "bad request").is_transient());
        assert!(!Error::LLM("no choices".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = Error::llm_api("openai", 500, "boom");
        assert_eq!(err.to_string(), "LLM API error: openai (500) - boom");

        let err = Error::invalid_weight("topic_drift", -0.1);
        assert_eq!(err.to_string(), "Invalid weight for topic_drift: -0.1");
    }
}
