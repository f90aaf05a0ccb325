use super::labels::{LabelSet, ANIME_GENRES};
use super::lifecycle::ReadinessPolicy;
use super::preprocess::DEFAULT_INPUT_SIZE;
use crate::error::{PipelineError, Result};
use crate::pipelines::utils::BackendCandidate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::time::Duration;

/// Model location used by [`GenrePredictor::initialize_default`](super::GenrePredictor::initialize_default).
pub const DEFAULT_MODEL_LOCATION: &str = "models/model.json";

/// Readiness wait settings as they appear in a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Wait granularity in milliseconds.
    pub poll_interval_ms: u64,
    /// Number of intervals before a waiting caller gives up.
    pub max_attempts: u32,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        ReadinessPolicy::default().into()
    }
}

impl From<ReadinessConfig> for ReadinessPolicy {
    fn from(config: ReadinessConfig) -> Self {
        ReadinessPolicy {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.max_attempts,
        }
    }
}

impl From<ReadinessPolicy> for ReadinessConfig {
    fn from(policy: ReadinessPolicy) -> Self {
        ReadinessConfig {
            poll_interval_ms: millis_rounded_up(policy.poll_interval),
            max_attempts: policy.max_attempts,
        }
    }
}

/// Settings for a [`GenrePredictor`](super::GenrePredictor).
///
/// Every field has a default, so a config file only needs the values it
/// changes:
///
/// ```json
/// { "model_location": "hf://acme/anime-genres", "backends": ["cpu"] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Where the model artifact lives (path, URL or `hf://` location).
    pub model_location: String,
    /// Output labels, in the order of the model's output vector.
    pub labels: Vec<String>,
    /// Side length of the square model input.
    pub input_size: u32,
    /// Compute backends to try, in order.
    pub backends: Vec<BackendCandidate>,
    /// Bounded wait used by the `*_when_ready` operations.
    pub readiness: ReadinessConfig,
    /// Fail `initialize` instead of falling back to an untrained model.
    pub strict_loading: bool,
    /// Timeout for HTTP fetches of models and images.
    pub fetch_timeout_ms: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            model_location: DEFAULT_MODEL_LOCATION.to_string(),
            labels: ANIME_GENRES.iter().map(|l| l.to_string()).collect(),
            input_size: DEFAULT_INPUT_SIZE,
            backends: BackendCandidate::default_order(),
            readiness: ReadinessConfig::default(),
            strict_loading: false,
            fetch_timeout_ms: 30_000,
        }
    }
}

impl PredictorConfig {
    /// Read and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PredictorConfig = serde_json::from_str(json)
            .map_err(|e| PipelineError::Config(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values that have no sensible interpretation.
    pub fn validate(&self) -> Result<()> {
        if self.model_location.trim().is_empty() {
            return Err(PipelineError::Config("model_location must not be empty".into()));
        }
        if self.input_size == 0 {
            return Err(PipelineError::Config("input_size must be positive".into()));
        }
        if self.backends.is_empty() {
            return Err(PipelineError::Config(
                "backends must list at least one candidate".into(),
            ));
        }
        if self.readiness.poll_interval_ms == 0 || self.readiness.max_attempts == 0 {
            return Err(PipelineError::Config(
                "readiness poll_interval_ms and max_attempts must be positive".into(),
            ));
        }
        if Duration::from_millis(self.readiness.poll_interval_ms)
            .checked_mul(self.readiness.max_attempts)
            .is_none()
        {
            return Err(PipelineError::Config(format!(
                "readiness wait of {} x {} ms is too long",
                self.readiness.max_attempts, self.readiness.poll_interval_ms
            )));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(PipelineError::Config("fetch_timeout_ms must be positive".into()));
        }
        self.label_set().map(|_| ())
    }

    /// The configured labels as a validated [`LabelSet`].
    pub fn label_set(&self) -> Result<LabelSet> {
        LabelSet::new(self.labels.iter().cloned())
    }

    /// The readiness wait as a [`ReadinessPolicy`].
    pub fn readiness_policy(&self) -> ReadinessPolicy {
        self.readiness.into()
    }

    /// HTTP fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Whole milliseconds in `duration`, rounding any fraction up so a non-zero
/// duration never becomes 0 ms.
pub(crate) fn millis_rounded_up(duration: Duration) -> u64 {
    let mut millis = duration.as_millis();
    if duration.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    u64::try_from(millis).unwrap_or(u64::MAX)
}
