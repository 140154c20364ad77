//! Configuration for hallucheck.
//!
//! [`Settings`] is loaded in layers with `figment`: built-in defaults, then an
//! optional JSON file, then `HALLUCHECK_*` environment variables (`__`
//! separates nested keys, e.g. `HALLUCHECK_THRESHOLDS__RISK_THRESHOLD=0.6`).
//! A `.env` file in the working directory is read first.
//!
//! Detection thresholds are read through [`SharedThresholds`], a cloneable
//! handle that can be updated while the process runs. Each evaluation takes
//! one snapshot, so an update only affects calls issued after it.

use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::detection::{ReverseConfig, SignalKind};
use crate::error::{Error, Result};
use crate::llm::{ClientConfig, LlmTextGenerator, OpenAIClient, Provider, RetryPolicy};

/// Weight of each signal in the risk aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub reverse_question: f64,
    pub topic_drift: f64,
    pub factuality: f64,
    pub knowledge_conflict: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            reverse_question: 0.6,
            topic_drift: 0.15,
            factuality: 0.15,
            knowledge_conflict: 0.1,
        }
    }
}

impl SignalWeights {
    pub fn get(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::ReverseQuestion => self.reverse_question,
            SignalKind::TopicDrift => self.topic_drift,
            SignalKind::Factuality => self.factuality,
            SignalKind::KnowledgeConflict => self.knowledge_conflict,
        }
    }

    fn slot(&mut self, kind: SignalKind) -> &mut f64 {
        match kind {
            SignalKind::ReverseQuestion => &mut self.reverse_question,
            SignalKind::TopicDrift => &mut self.topic_drift,
            SignalKind::Factuality => &mut self.factuality,
            SignalKind::KnowledgeConflict => &mut self.knowledge_conflict,
        }
    }

    /// Every weight must lie within `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        for kind in SignalKind::ALL {
            validate_weight(kind, self.get(kind))?;
        }
        Ok(())
    }

    pub fn total(&self) -> f64 {
        SignalKind::ALL.iter().map(|k| self.get(*k)).sum()
    }
}

fn validate_weight(kind: SignalKind, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::invalid_weight(kind.as_str(), value))
    }
}

fn validate_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

/// Decision thresholds and signal weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Risk above this is high risk
    pub risk_threshold: f64,
    /// Reverse similarity below this is high risk regardless of the aggregate
    pub similarity_critical: f64,
    pub weights: SignalWeights,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            risk_threshold: 0.5,
            similarity_critical: 0.4,
            weights: SignalWeights::default(),
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        validate_unit("risk_threshold", self.risk_threshold)?;
        validate_unit("similarity_critical", self.similarity_critical)?;
        self.weights.validate()
    }
}

/// Process-wide, runtime-mutable thresholds.
///
/// Clones share the same state. Rejected updates leave the previous values
/// in place.
#[derive(Debug, Clone, Default)]
pub struct SharedThresholds {
    inner: Arc<RwLock<Thresholds>>,
}

impl SharedThresholds {
    pub fn new(thresholds: Thresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(thresholds)),
        })
    }

    /// Copy of the current values.
    pub fn snapshot(&self) -> Thresholds {
        self.inner.read().clone()
    }

    pub fn set_risk_threshold(&self, value: f64) -> Result<()> {
        validate_unit("risk_threshold", value)?;
        self.inner.write().risk_threshold = value;
        info!(value, "Risk threshold updated");
        Ok(())
    }

    pub fn set_similarity_critical(&self, value: f64) -> Result<()> {
        validate_unit("similarity_critical", value)?;
        self.inner.write().similarity_critical = value;
        info!(value, "Critical similarity updated");
        Ok(())
    }

    pub fn set_weight(&self, kind: SignalKind, value: f64) -> Result<()> {
        validate_weight(kind, value)?;
        *self.inner.write().weights.slot(kind) = value;
        info!(signal = %kind, value, "Signal weight updated");
        Ok(())
    }

    pub fn set_weights(&self, weights: SignalWeights) -> Result<()> {
        weights.validate()?;
        self.inner.write().weights = weights;
        info!("Signal weights updated");
        Ok(())
    }

    pub fn replace(&self, thresholds: Thresholds) -> Result<()> {
        thresholds.validate()?;
        *self.inner.write() = thresholds;
        Ok(())
    }
}

/// LLM endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub enable_enhancement: bool,
    /// Temperature for answering the question under test
    pub answer_temperature: f64,
    /// Token cap for every generation
    pub max_tokens: u32,
    /// Log each successful call to the history database
    pub record_calls: bool,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: Provider::Hunyuan,
            api_key: None,
            base_url: None,
            model: None,
            timeout_secs: 120,
            enable_enhancement: true,
            answer_temperature: 0.7,
            max_tokens: 100,
            record_calls: true,
        }
    }
}

impl LlmSettings {
    pub fn client_config(&self) -> Result<ClientConfig> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "No API key configured; set HALLUCHECK_LLM__API_KEY or HUNYUAN_API_KEY"
                        .to_string(),
                )
            })?;

        let mut config = ClientConfig::new(api_key)
            .with_timeout(self.timeout_secs)
            .with_enhancement(self.enable_enhancement && self.provider == Provider::Hunyuan);
        if let Some(ref url) = self.base_url {
            config = config.with_base_url(url);
        }
        if let Some(ref model) = self.model {
            config = config.with_default_model(model);
        }
        Ok(config)
    }
}

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub retry: RetryPolicy,
    pub thresholds: Thresholds,
    pub reverse: ReverseConfig,
    /// Directory for the knowledge file and history database
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            retry: RetryPolicy::default(),
            thresholds: Thresholds::default(),
            reverse: ReverseConfig::default(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Settings {
    pub const ENV_PREFIX: &'static str = "HALLUCHECK_";
    pub const API_KEY_FALLBACK_VAR: &'static str = "HUNYUAN_API_KEY";

    /// Load settings from defaults, `file` (if it exists) and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env");
        }

        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = file {
            if path.exists() {
                figment = figment.merge(Json::file(path));
            }
        }
        figment = figment.merge(Env::prefixed(Self::ENV_PREFIX).split("__"));

        let mut settings: Settings = figment
            .extract()
            .map_err(|e| Error::Config(format!("Failed to load settings: {}", e)))?;

        if settings.llm.api_key.is_none() {
            settings.llm.api_key = std::env::var(Self::API_KEY_FALLBACK_VAR).ok();
        }
        settings.thresholds.validate()?;

        Ok(settings)
    }

    /// Write settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn knowledge_path(&self) -> PathBuf {
        self.data_dir.join("knowledge_base.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.db")
    }

    pub fn shared_thresholds(&self) -> Result<SharedThresholds> {
        SharedThresholds::new(self.thresholds.clone())
    }

    /// Text generator over the configured endpoint.
    pub fn text_generator(&self) -> Result<LlmTextGenerator> {
        let config = self.llm.client_config()?;
        let client = match self.llm.provider {
            Provider::Hunyuan => OpenAIClient::hunyuan(config)?,
            Provider::OpenAI => OpenAIClient::new(config)?,
            Provider::Mock => {
                return Err(Error::Config(
                    "The mock provider cannot be built from settings".to_string(),
                ))
            }
        };
        Ok(LlmTextGenerator::new(Arc::new(client)).with_policy(self.retry.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_thresholds() {
        let t = Thresholds::default();
        assert_eq!(t.risk_threshold, 0.5);
        assert_eq!(t.similarity_critical, 0.4);
        assert!((t.weights.total() - 1.0).abs() < 1e-9);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_invalid_weight_keeps_previous() {
        let shared = SharedThresholds::default();

        let err = shared.set_weight(SignalKind::Factuality, -0.1).unwrap_err();
        assert!(matches!(err, Error::InvalidWeight { .. }));
        assert!(shared.set_weight(SignalKind::Factuality, f64::NAN).is_err());

        let weights = SignalWeights {
            topic_drift: f64::INFINITY,
            ..SignalWeights::default()
        };
        assert!(shared.set_weights(weights).is_err());

        assert_eq!(shared.snapshot().weights, SignalWeights::default());
    }

    #[test]
    fn test_weight_above_one_rejected() {
        let shared = SharedThresholds::default();

        let err = shared.set_weight(SignalKind::ReverseQuestion, 2.0).unwrap_err();
        assert!(matches!(err, Error::InvalidWeight { .. }));
        assert!(shared.set_weight(SignalKind::TopicDrift, 1.0).is_ok());

        let weights = SignalWeights {
            factuality: 1.5,
            ..SignalWeights::default()
        };
        assert!(shared.set_weights(weights).is_err());

        let snapshot = shared.snapshot().weights;
        assert_eq!(snapshot.reverse_question, SignalWeights::default().reverse_question);
        assert_eq!(snapshot.topic_drift, 1.0);
        assert_eq!(snapshot.factuality, SignalWeights::default().factuality);
    }

    #[test]
    fn test_updates_visible_through_clones() {
        let shared = SharedThresholds::default();
        let other = shared.clone();

        other.set_risk_threshold(0.7).unwrap();
        other.set_weight(SignalKind::ReverseQuestion, 0.0).unwrap();

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.risk_threshold, 0.7);
        assert_eq!(snapshot.weights.reverse_question, 0.0);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let shared = SharedThresholds::default();
        let before = shared.snapshot();
        shared.set_similarity_critical(0.2).unwrap();
        assert_eq!(before.similarity_critical, 0.4);
        assert_eq!(shared.snapshot().similarity_critical, 0.2);
    }

    #[test]
    fn test_threshold_range_checked() {
        let shared = SharedThresholds::default();
        assert!(matches!(shared.set_risk_threshold(1.5), Err(Error::Config(_))));
        assert!(SharedThresholds::new(Thresholds {
            similarity_critical: -1.0,
            ..Thresholds::default()
        })
        .is_err());
    }

    #[test]
    fn test_settings_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.llm.api_key = Some("file-key".into());
        settings.thresholds.risk_threshold = 0.65;
        settings.reverse.attempts = 5;
        settings.data_dir = dir.path().join("data");
        settings.save(&path).unwrap();

        let loaded = Settings::load(Some(&path)).unwrap();
        assert_eq!(loaded.llm.api_key.as_deref(), Some("file-key"));
        assert_eq!(loaded.thresholds.risk_threshold, 0.65);
        assert_eq!(loaded.reverse.attempts, 5);
        assert_eq!(loaded.knowledge_path(), dir.path().join("data").join("knowledge_base.json"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"thresholds": {"weights": {"factuality": 0.3}}}"#).unwrap();

        let loaded = Settings::load(Some(&path)).unwrap();
        assert_eq!(loaded.thresholds.weights.factuality, 0.3);
        assert_eq!(loaded.thresholds.weights.reverse_question, 0.6);
        assert_eq!(loaded.retry, RetryPolicy::default());
    }

    #[test]
    fn test_invalid_file_thresholds_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"thresholds": {"weights": {"topic_drift": -1.0}}}"#).unwrap();

        assert!(Settings::load(Some(&path)).is_err());

        std::fs::write(&path, r#"{"thresholds": {"weights": {"reverse_question": 3.0}}}"#).unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn test_client_config_requires_key() {
        let llm = LlmSettings::default();
        assert!(matches!(llm.client_config(), Err(Error::Config(_))));

        let llm = LlmSettings {
            api_key: Some("k".into()),
            model: Some("hunyuan-lite".into()),
            ..LlmSettings::default()
        };
        let config = llm.client_config().unwrap();
        assert_eq!(config.default_model.as_deref(), Some("hunyuan-lite"));
        assert!(config.enable_enhancement);
    }
}
