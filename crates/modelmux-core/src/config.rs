//! Operator/environment surface (§6.5) and strategy weight table (§6.2).
//!
//! Settings are resolved in ascending priority: compiled-in defaults, then a
//! TOML settings file, then `MODELMUX_*` environment variable overrides —
//! the same chain-of-responsibility shape the registry's variable resolver
//! chain uses, just applied to whole settings rather than individual string
//! values.

use crate::error::ConfigurationError;
use crate::types::Strategy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

/// Recognized operator configuration (§6.5 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_strategy: Strategy,
    pub default_model: Option<String>,
    pub per_provider_concurrency: HashMap<String, usize>,
    pub default_provider_concurrency: usize,
    pub attempt_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub fallback_depth: usize,
    pub health_ttl_ms: u64,
    pub disabled_features: Vec<String>,
    pub arbiter_model: Option<String>,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub failure_threshold: u32,
    pub failure_window_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_strategy: Strategy::Balanced,
            default_model: None,
            per_provider_concurrency: HashMap::new(),
            default_provider_concurrency: 8,
            attempt_timeout_ms: 60_000,
            request_timeout_ms: 120_000,
            fallback_depth: 3,
            health_ttl_ms: 60_000,
            disabled_features: Vec::new(),
            arbiter_model: None,
            max_retries: 2,
            backoff_base_ms: 250,
            backoff_cap_ms: 4_000,
            failure_threshold: 5,
            failure_window_secs: 60,
        }
    }
}

impl Settings {
    /// Layer a TOML settings file on top of the defaults.
    pub fn merge_toml(mut self, toml_str: &str) -> Result<Self, ConfigurationError> {
        let file: Settings = toml::from_str(toml_str).map_err(|e| ConfigurationError::Manifest {
            reason: format!("invalid settings TOML: {e}"),
        })?;
        self = file;
        Ok(self)
    }

    /// Layer `MODELMUX_*` environment variable overrides on top.
    /// Unknown or malformed variables are ignored with a debug log, matching
    /// the loader's "unknown fields ignored with a warning" posture for the
    /// registry manifest.
    pub fn merge_env(mut self) -> Self {
        if let Ok(v) = env::var("MODELMUX_DEFAULT_MODEL") {
            self.default_model = Some(v);
        }
        if let Ok(v) = env::var("MODELMUX_ATTEMPT_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                self.attempt_timeout_ms = n;
            } else {
                log::debug!("config.env.ignored key=MODELMUX_ATTEMPT_TIMEOUT_MS reason=not_a_number");
            }
        }
        if let Ok(v) = env::var("MODELMUX_REQUEST_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                self.request_timeout_ms = n;
            }
        }
        if let Ok(v) = env::var("MODELMUX_FALLBACK_DEPTH") {
            if let Ok(n) = v.parse() {
                self.fallback_depth = n;
            }
        }
        if let Ok(v) = env::var("MODELMUX_HEALTH_TTL_MS") {
            if let Ok(n) = v.parse() {
                self.health_ttl_ms = n;
            }
        }
        if let Ok(v) = env::var("MODELMUX_ARBITER_MODEL") {
            self.arbiter_model = Some(v);
        }
        if let Ok(v) = env::var("MODELMUX_DISABLED_FEATURES") {
            self.disabled_features = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        self
    }

    pub fn is_feature_disabled(&self, feature: &str) -> bool {
        self.disabled_features.iter().any(|f| f == feature)
    }

    pub fn provider_concurrency(&self, provider: &str) -> usize {
        self.per_provider_concurrency
            .get(provider)
            .copied()
            .unwrap_or(self.default_provider_concurrency)
    }
}

/// The four Scorer weights for one named strategy (§4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrategyWeights {
    pub task: f64,
    pub perf: f64,
    pub acc: f64,
    pub cost: f64,
}

impl StrategyWeights {
    fn validate(&self, name: &str) -> Result<(), ConfigurationError> {
        if [self.task, self.perf, self.acc, self.cost]
            .iter()
            .any(|w| *w < 0.0)
        {
            return Err(ConfigurationError::Strategy {
                name: name.to_string(),
                reason: "weights must be non-negative".into(),
            });
        }
        let sum = self.task + self.perf + self.acc + self.cost;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigurationError::Strategy {
                name: name.to_string(),
                reason: format!("weights must sum to 1 (got {sum})"),
            });
        }
        Ok(())
    }
}

/// Declarative scorer configuration (§6.2): one weight set per strategy plus
/// a shared `cost_ceiling`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTable {
    pub cost_ceiling: Option<f64>,
    pub strategies: HashMap<String, StrategyWeights>,
}

impl StrategyTable {
    /// The hardcoded defaults from §4.4, used when no operator table is supplied.
    pub fn builtin_defaults() -> Self {
        let mut strategies = HashMap::new();
        strategies.insert(
            "quality".to_string(),
            StrategyWeights { task: 0.40, perf: 0.10, acc: 0.40, cost: 0.10 },
        );
        strategies.insert(
            "speed".to_string(),
            StrategyWeights { task: 0.20, perf: 0.60, acc: 0.10, cost: 0.10 },
        );
        strategies.insert(
            "cost".to_string(),
            StrategyWeights { task: 0.20, perf: 0.10, acc: 0.10, cost: 0.60 },
        );
        strategies.insert(
            "balanced".to_string(),
            StrategyWeights { task: 0.30, perf: 0.25, acc: 0.25, cost: 0.20 },
        );
        Self {
            cost_ceiling: None,
            strategies,
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        let table: StrategyTable =
            serde_yaml::from_str(yaml).map_err(|e| ConfigurationError::Strategy {
                name: "<table>".into(),
                reason: format!("invalid YAML: {e}"),
            })?;
        for (name, weights) in &table.strategies {
            weights.validate(name)?;
        }
        Ok(table)
    }

    pub fn weights_for(&self, strategy: Strategy) -> StrategyWeights {
        let key = match strategy {
            Strategy::Quality => "quality",
            Strategy::Speed => "speed",
            Strategy::Cost => "cost",
            Strategy::Balanced => "balanced",
        };
        self.strategies
            .get(key)
            .copied()
            .unwrap_or_else(|| Self::builtin_defaults().strategies[key])
    }
}
