//! Interfaces the orchestration core depends on but does not implement
//! itself: the provider adapter contract (§4.1) and the three sinks the
//! core writes through (§6.4). Concrete adapters live in
//! `modelmux-providers`; concrete sinks are supplied by the embedding
//! application.

use crate::error::{ConfigurationError, OrchestrationError};
use crate::types::{Checkpoint, UsageRecord};
use async_trait::async_trait;
use std::time::Duration;

/// One generate call, already rendered into prompt + sampling parameters.
#[derive(Debug, Clone)]
pub struct GenerateCall {
    pub api_name: String,
    pub prompt: String,
    pub image_refs: Vec<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub require_json: bool,
    pub timeout: Duration,
}

/// Raw result of one successful generate call, before cost/latency are
/// stamped on by the Executor.
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub finish_reason: Option<String>,
}

/// Health status of a provider, cached by the Client Pool up to a TTL (§4.1).
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub available: bool,
    pub reason: Option<String>,
}

/// A delta emitted during `ProviderClient::stream`.
#[derive(Debug, Clone)]
pub struct TokenDelta {
    pub text: String,
    pub done: bool,
}

/// The uniform contract every provider adapter satisfies (§4.1). Adapters
/// own all provider-specific request framing, auth header injection, and
/// response parsing. An adapter MUST NOT retry internally: retry is the
/// Executor's job, applied uniformly across providers.
#[async_trait]
pub trait ProviderClient: Send + Sync + std::fmt::Debug {
    /// Provider tag this client serves, e.g. `"openai"`.
    fn provider_tag(&self) -> &str;

    /// Cheap liveness probe. Callers are expected to cache the result up to
    /// a configurable TTL rather than call this per request.
    async fn health(&self) -> HealthStatus;

    /// Issue one generate call. Returns a classified `OrchestrationError`
    /// (never a bare string) on failure so the Executor can decide whether
    /// to retry.
    async fn generate(&self, call: &GenerateCall) -> Result<GenerateOutcome, OrchestrationError>;

    /// Optional streaming variant. The default implementation rejects with
    /// `FeatureDisabled`, which adapters without streaming support can rely on.
    async fn stream(
        &self,
        call: &GenerateCall,
        on_delta: &mut (dyn FnMut(TokenDelta) + Send),
    ) -> Result<GenerateOutcome, OrchestrationError> {
        let _ = (call, on_delta);
        Err(OrchestrationError::FeatureDisabled {
            feature: format!("{}::stream", self.provider_tag()),
        })
    }

    /// `cost_usd` for the given token counts against a specific model.
    fn cost(&self, input_tokens: u64, output_tokens: u64, api_name: &str) -> f64;
}

/// Append-only usage sink (§6.4). Failures are logged by the caller and
/// never propagate upward — the trait itself models that by having no
/// fallible return value reach request handling paths.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn append(&self, record: UsageRecord);
}

/// Checkpoint persistence for the Chain Orchestrator (§6.4). Unlike the
/// usage sink, failures here are fatal to the run in progress.
#[async_trait]
pub trait CheckpointSink: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<String, ConfigurationError>;
    async fn load(&self, checkpoint_id: &str) -> Result<Checkpoint, ConfigurationError>;
    async fn list(&self, pipeline_id: &str) -> Result<Vec<Checkpoint>, ConfigurationError>;
}

/// A `UsageSink` that drops every record. Useful as a default when the
/// embedding application hasn't wired up a real sink yet.
pub struct NullUsageSink;

#[async_trait]
impl UsageSink for NullUsageSink {
    async fn append(&self, _record: UsageRecord) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_usage_sink_accepts_any_record() {
        use crate::types::{Provider, UsageOutcome, UsageRecord};
        let sink = NullUsageSink;
        sink.append(UsageRecord {
            trace_id: "t1".into(),
            model_id: "m".into(),
            provider: Provider::Local,
            started_at_ms: 0,
            finished_at_ms: 1,
            input_tokens: 1,
            output_tokens: 1,
            cost_usd: 0.0,
            outcome: UsageOutcome::Ok,
        })
        .await;
    }
}
