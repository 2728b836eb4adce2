#![forbid(unsafe_code)]

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use deepcheck_engines::{
    Classifier, RemoteInferenceClassifier, RemoteInferenceConfig, UnconfiguredClassifier,
};
use deepcheck_kernel_contracts::classify::BackboneId;

pub const LOADING_DELAY_MS_DEFAULT: u64 = 2_000;
pub const SIDEBAR_LIMIT_DEFAULT: usize = 5;
pub const CLASSIFIER_TIMEOUT_MS_DEFAULT: u32 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {reason}")]
    InvalidValue { var: &'static str, reason: String },
    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub data_dir: PathBuf,
    pub loading_delay: Duration,
    pub sidebar_limit: usize,
}

impl WorkflowConfig {
    pub fn mvp_v1(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            loading_delay: Duration::from_millis(LOADING_DELAY_MS_DEFAULT),
            sidebar_limit: SIDEBAR_LIMIT_DEFAULT,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("DEEPCHECK_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| ".".to_string());
        let mut cfg = Self::mvp_v1(data_dir);
        if let Some(raw) = lookup("DEEPCHECK_LOADING_DELAY_MS") {
            let ms = parse_in_range("DEEPCHECK_LOADING_DELAY_MS", &raw, 0..=60_000)?;
            cfg.loading_delay = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("DEEPCHECK_HISTORY_SIDEBAR_LIMIT") {
            cfg.sidebar_limit =
                parse_in_range("DEEPCHECK_HISTORY_SIDEBAR_LIMIT", &raw, 1..=100)? as usize;
        }
        Ok(cfg)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }

    pub fn users_path(&self) -> PathBuf {
        self.results_dir().join("users.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.results_dir().join("history.json")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierSettings {
    pub backbone: BackboneId,
    pub endpoint: Option<String>,
    pub bearer_token: Option<String>,
    pub timeout_ms: u32,
}

impl ClassifierSettings {
    pub fn mvp_v1() -> Self {
        Self {
            backbone: BackboneId::Vit224,
            endpoint: None,
            bearer_token: None,
            timeout_ms: CLASSIFIER_TIMEOUT_MS_DEFAULT,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut s = Self::mvp_v1();
        if let Some(raw) = lookup("DEEPCHECK_CLASSIFIER_BACKBONE") {
            s.backbone = BackboneId::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                var: "DEEPCHECK_CLASSIFIER_BACKBONE",
                reason: format!(
                    "unknown backbone '{raw}'. allowed: {}",
                    BackboneId::allowed_names().join(", ")
                ),
            })?;
        }
        s.endpoint = lookup("DEEPCHECK_CLASSIFIER_ENDPOINT").filter(|v| !v.trim().is_empty());
        s.bearer_token = lookup("DEEPCHECK_CLASSIFIER_TOKEN").filter(|v| !v.trim().is_empty());
        if let Some(raw) = lookup("DEEPCHECK_CLASSIFIER_TIMEOUT_MS") {
            s.timeout_ms =
                parse_in_range("DEEPCHECK_CLASSIFIER_TIMEOUT_MS", &raw, 100..=300_000)? as u32;
        }
        Ok(s)
    }

    /// Builds the classifier selected by these settings.
    pub fn build_classifier(&self) -> Result<Arc<dyn Classifier>, ConfigError> {
        let endpoint = self
            .endpoint
            .clone()
            .ok_or(ConfigError::Missing("DEEPCHECK_CLASSIFIER_ENDPOINT"))?;
        let remote = RemoteInferenceConfig {
            endpoint,
            bearer_token: self.bearer_token.clone(),
            timeout_ms: self.timeout_ms,
        };
        let classifier = RemoteInferenceClassifier::new(self.backbone, remote).map_err(|e| {
            ConfigError::InvalidValue {
                var: "DEEPCHECK_CLASSIFIER_ENDPOINT",
                reason: e.to_string(),
            }
        })?;
        Ok(Arc::new(classifier))
    }

    /// Like `build_classifier`, but a missing endpoint mounts an
    /// `UnconfiguredClassifier` instead of failing. For callers that only
    /// touch accounts.
    pub fn build_classifier_or_unconfigured(&self) -> Result<Arc<dyn Classifier>, ConfigError> {
        match self.build_classifier() {
            Err(err @ ConfigError::Missing(_)) => Ok(Arc::new(UnconfiguredClassifier::new(
                self.backbone,
                err.to_string(),
            ))),
            other => other,
        }
    }
}

fn parse_in_range(
    var: &'static str,
    raw: &str,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let v = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            var,
            reason: format!("'{raw}' is not an unsigned integer"),
        })?;
    if !range.contains(&v) {
        return Err(ConfigError::InvalidValue {
            var,
            reason: format!("{v} is outside {}..={}", range.start(), range.end()),
        });
    }
    Ok(v)
}
