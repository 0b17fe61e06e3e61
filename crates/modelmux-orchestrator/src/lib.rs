//! Policy and control-flow layer (L3-L5, L7-L10): turns a `Request` into a
//! routed, retried, fallback-aware `ApiResponse`, and builds Consensus and
//! Chain on top of the same `Orchestrator::route_request` entry point.
//!
//! `modelmux-core` supplies the data model and `modelmux-providers` the
//! network adapters; nothing in this crate talks to a provider directly.

pub mod analyzer;
pub mod chain;
pub mod consensus;
pub mod executor;
pub mod orchestrator;
pub mod scorer;
pub mod selector;

use chrono::Utc;
use modelmux_core::error::OrchestrationError;
use modelmux_core::registry::ListFilter;
use modelmux_core::traits::CheckpointSink;
use modelmux_core::types::{
    ApiResponse, ChainResult, ConsensusRequest, ConsensusResult, ModelCapability, Pipeline, Provider, Request,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub use orchestrator::Orchestrator;

/// One provider's liveness as reported by `ModelMux::health` (§6.3).
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub available: bool,
    pub last_check_ts: i64,
    pub reason: Option<String>,
}

/// The embedding application's single entry point: composes the
/// Orchestrator with the Consensus Engine and Chain Orchestrator, which both
/// invoke `route_request` rather than talking to providers directly (§6.3).
pub struct ModelMux {
    orchestrator: Orchestrator,
    checkpoints: Arc<dyn CheckpointSink>,
}

impl ModelMux {
    pub fn new(orchestrator: Orchestrator, checkpoints: Arc<dyn CheckpointSink>) -> Self {
        Self { orchestrator, checkpoints }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// `route_request(Request) -> ApiResponse | OrchestrationError` (§6.3).
    pub async fn route_request(&self, req: Request) -> Result<ApiResponse, OrchestrationError> {
        self.orchestrator.route_request(req).await
    }

    /// `run_consensus(ConsensusRequest) -> ConsensusResult | LowQuorumError | OrchestrationError` (§6.3).
    pub async fn run_consensus(&self, req: ConsensusRequest) -> Result<ConsensusResult, OrchestrationError> {
        consensus::ConsensusEngine::new(&self.orchestrator).run(req).await
    }

    /// `run_pipeline(Pipeline) -> ChainResult | ChainError` (§6.3).
    pub async fn run_pipeline(&self, pipeline: Pipeline) -> Result<ChainResult, OrchestrationError> {
        chain::ChainOrchestrator::new(&self.orchestrator, self.checkpoints.clone())
            .run_pipeline(pipeline)
            .await
    }

    /// `resume_pipeline(pipeline_id, checkpoint_id, overrides?) -> ChainResult | ChainError` (§6.3).
    ///
    /// Checkpoints persist context, not step definitions, so the caller
    /// supplies the `Pipeline` again; its `pipeline_id` must match the
    /// checkpoint's or this returns `ResumeSchemaDrift`.
    pub async fn resume_pipeline(
        &self,
        pipeline: Pipeline,
        checkpoint_id: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> Result<ChainResult, OrchestrationError> {
        chain::ChainOrchestrator::new(&self.orchestrator, self.checkpoints.clone())
            .resume_pipeline(pipeline, checkpoint_id, overrides)
            .await
    }

    /// `list_models(filter?) -> [ModelCapability]` (§6.3).
    pub fn list_models(&self, filter: Option<ListFilter>) -> Vec<ModelCapability> {
        self.orchestrator.registry().list(&filter.unwrap_or_default())
    }

    /// `health() -> {provider -> {available, last_check_ts, reason?}}` (§6.3).
    /// Only probes providers actually present in the registry; each result
    /// is cached by the Client Pool up to `health_ttl_ms`.
    pub async fn health(&self) -> HashMap<Provider, ProviderHealth> {
        let providers: HashSet<Provider> = self
            .orchestrator
            .registry()
            .list(&ListFilter::default())
            .iter()
            .map(|m| m.provider)
            .collect();

        let mut report = HashMap::new();
        for provider in providers {
            let checked_at = Utc::now().timestamp_millis();
            let health = match self.orchestrator.pool().health(provider).await {
                Ok(status) => ProviderHealth {
                    available: status.available,
                    last_check_ts: checked_at,
                    reason: status.reason,
                },
                Err(err) => ProviderHealth {
                    available: false,
                    last_check_ts: checked_at,
                    reason: Some(err.to_string()),
                },
            };
            report.insert(provider, health);
        }
        report
    }
}
