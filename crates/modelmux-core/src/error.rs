use thiserror::Error;

/// One observed attempt against a model, kept for `ExhaustedFallbacks` reporting.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub model_id: String,
    pub error_kind: String,
    pub message: String,
}

/// Configuration-related errors (registry / strategy / secret misconfiguration). Permanent.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("manifest rejected: {reason}")]
    Manifest { reason: String },

    #[error("strategy '{name}' rejected: {reason}")]
    Strategy { name: String, reason: String },

    #[error("secret resolution failed: {reason}")]
    Secret { reason: String },

    #[error("registry is empty")]
    EmptyRegistry,
}

/// The full taxonomy surfaced to callers, per the error handling design (§7).
/// Every variant carries enough structure to build a remediation hint; none
/// degrade to an opaque string.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("rate limited by '{provider}'{}", retry_after_ms.map(|ms| format!(", retry after {ms}ms")).unwrap_or_default())]
    RateLimited {
        provider: String,
        retry_after_ms: Option<u64>,
    },

    #[error("attempt against '{model_id}' timed out after {elapsed_ms}ms")]
    Timeout { model_id: String, elapsed_ms: u64 },

    #[error("transient network error calling '{provider}': {reason}")]
    NetworkTransient { provider: String, reason: String },

    #[error("provider '{provider}' refused on policy grounds: {reason}")]
    ContentPolicy { provider: String, reason: String },

    #[error("consensus low quorum: {succeeded}/{attempted} participants succeeded")]
    LowQuorum {
        succeeded: usize,
        attempted: usize,
        partial: Vec<crate::types::ConsensusParticipant>,
    },

    #[error("template error in step '{step}': {reason}")]
    Template { step: String, reason: String },

    #[error("resume schema drift in pipeline '{pipeline_id}': {reason}")]
    ResumeSchemaDrift { pipeline_id: String, reason: String },

    #[error("cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("feature '{feature}' is disabled")]
    FeatureDisabled { feature: String },

    #[error("exhausted {} fallback attempt(s) for trace {trace_id}", attempts.len())]
    ExhaustedFallbacks {
        trace_id: String,
        attempts: Vec<AttemptOutcome>,
    },
}

impl OrchestrationError {
    /// Stable, language-agnostic kind name matching §7's taxonomy labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::Configuration(_) => "ConfigurationError",
            Self::ProviderUnavailable { .. } => "ProviderUnavailable",
            Self::RateLimited { .. } => "RateLimited",
            Self::Timeout { .. } => "Timeout",
            Self::NetworkTransient { .. } => "NetworkTransient",
            Self::ContentPolicy { .. } => "ContentPolicy",
            Self::LowQuorum { .. } => "LowQuorum",
            Self::Template { .. } => "TemplateError",
            Self::ResumeSchemaDrift { .. } => "ResumeSchemaDrift",
            Self::Cancelled { .. } => "Cancelled",
            Self::FeatureDisabled { .. } => "FeatureDisabled",
            Self::ExhaustedFallbacks { .. } => "ExhaustedFallbacks",
        }
    }

    /// Whether the Executor should retry this kind locally (§4.7/§7).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::NetworkTransient { .. }
        )
    }

    /// A short, operator-facing remediation hint, when one applies.
    pub fn remediation_hint(&self) -> Option<&'static str> {
        match self {
            Self::RateLimited { .. } => Some("lower per_provider_concurrency or raise backoff caps"),
            Self::Timeout { .. } => Some("raise attempt_timeout_ms or request_timeout_ms"),
            Self::ProviderUnavailable { .. } => Some("check provider credentials and endpoint configuration"),
            Self::LowQuorum { .. } => Some("lower consensus n or disable stance steering"),
            Self::Configuration(ConfigurationError::Secret { .. }) => {
                Some("configure provider credentials")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_match_spec_taxonomy() {
        let rl = OrchestrationError::RateLimited {
            provider: "openai".into(),
            retry_after_ms: Some(1000),
        };
        assert!(rl.is_transient());
        assert_eq!(rl.kind(), "RateLimited");

        let cp = OrchestrationError::ContentPolicy {
            provider: "openai".into(),
            reason: "refused".into(),
        };
        assert!(!cp.is_transient());
    }

    #[test]
    fn configuration_error_converts_via_from() {
        let cfg: OrchestrationError = ConfigurationError::EmptyRegistry.into();
        assert_eq!(cfg.kind(), "ConfigurationError");
    }

    #[test]
    fn remediation_hint_present_for_rate_limited() {
        let err = OrchestrationError::RateLimited {
            provider: "anthropic".into(),
            retry_after_ms: None,
        };
        assert!(err.remediation_hint().is_some());
    }
}
