//! Orchestrator (L8, §4.8): the top-level entry point. Composes Analyzer →
//! Selector → Executor with fallback across the chain, carrying every
//! attempt under one `trace_id`.
//!
//! State machine (§4.8):
//! `ACCEPTED → ANALYZED → SELECTED → EXECUTING → (DONE | FALLBACK) → (DONE | EXHAUSTED)`

use crate::analyzer::TaskAnalyzer;
use crate::executor::Executor;
use crate::selector::Selector;
use modelmux_core::config::{Settings, StrategyTable};
use modelmux_core::error::{AttemptOutcome, ConfigurationError, OrchestrationError};
use modelmux_core::registry::{ListFilter, ModelRegistry};
use modelmux_core::types::{ApiResponse, Request, TaskRequirements};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Composes the registry, strategy table, analyzer, and executor into the
/// `route_request` entry point. Owned by the embedding application; cheap to
/// clone its inner `Arc`s if multiple entry points are needed.
pub struct Orchestrator {
    registry: ModelRegistry,
    strategy_table: StrategyTable,
    analyzer: TaskAnalyzer,
    executor: Executor,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(
        registry: ModelRegistry,
        strategy_table: StrategyTable,
        analyzer: TaskAnalyzer,
        executor: Executor,
        settings: Settings,
    ) -> Self {
        Self {
            registry,
            strategy_table,
            analyzer,
            executor,
            settings,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn strategy_table(&self) -> &StrategyTable {
        &self.strategy_table
    }

    pub fn analyzer(&self) -> &TaskAnalyzer {
        &self.analyzer
    }

    pub fn pool(&self) -> &Arc<modelmux_providers::connection_pool::ClientPool> {
        self.executor.pool()
    }

    /// A model id the hint resolves to, if it names a registered and
    /// available model (§4.8 SELECTED: "if present and resolves to a usable
    /// model, use it").
    fn resolve_hint(&self, req: &Request) -> Option<String> {
        let hint = req.model_hint.as_ref()?;
        let model = self.registry.get(hint)?;
        model.available.then_some(model.id)
    }

    /// The reason every model in the registry fails to satisfy `req`, used
    /// to build the boundary-case `ExhaustedFallbacks` when the Selector
    /// returns no candidates at all (§8, "require_vision with no
    /// vision-capable model").
    fn no_candidate_reason(req: &TaskRequirements) -> &'static str {
        if req.require_vision {
            "no vision-capable model"
        } else if req.require_tools {
            "no tool-capable model"
        } else if req.require_json {
            "no json-mode-capable model"
        } else {
            "no model with sufficient context_window"
        }
    }

    fn exhausted_with_no_candidates(&self, trace_id: &str, req: &TaskRequirements) -> OrchestrationError {
        let reason = Self::no_candidate_reason(req);
        let attempts = self
            .registry
            .list(&ListFilter::available())
            .into_iter()
            .map(|m| AttemptOutcome {
                model_id: m.id,
                error_kind: "ValidationError".to_string(),
                message: reason.to_string(),
            })
            .collect();
        OrchestrationError::ExhaustedFallbacks {
            trace_id: trace_id.to_string(),
            attempts,
        }
    }

    /// `route_request` (§4.8, §6.3): the orchestrator's main entry point.
    pub async fn route_request(&self, mut req: Request) -> Result<ApiResponse, OrchestrationError> {
        let trace_id = req.trace_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        req.trace_id = Some(trace_id.clone());
        log::info!("orchestrator.route.begin trace_id={trace_id}");

        if self.registry.is_empty() {
            log::warn!("orchestrator.route.rejected trace_id={trace_id} reason=empty_registry");
            return Err(OrchestrationError::Configuration(ConfigurationError::EmptyRegistry));
        }

        if self.settings.request_timeout_ms == 0 {
            log::warn!("orchestrator.route.cancelled trace_id={trace_id} reason=zero_deadline");
            return Err(OrchestrationError::Cancelled {
                reason: "request_timeout_ms is zero".to_string(),
            });
        }
        let deadline = Instant::now() + Duration::from_millis(self.settings.request_timeout_ms);

        let task_reqs = self.analyzer.analyze(&req).await;
        log::debug!(
            "orchestrator.route.analyzed trace_id={trace_id} task_type={:?} confidence={}",
            task_reqs.task_type, task_reqs.confidence
        );

        let selector = Selector::new(&self.registry, &self.strategy_table);

        let mut next_model_id = self
            .resolve_hint(&req)
            .or_else(|| selector.select(&task_reqs, 1).into_iter().next());

        if next_model_id.is_none() {
            return Err(self.exhausted_with_no_candidates(&trace_id, &task_reqs));
        }

        let mut tried: HashSet<String> = HashSet::new();
        let mut attempts: Vec<AttemptOutcome> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut attempt_index: u32 = 0;

        loop {
            let Some(model_id) = next_model_id.take() else {
                log::warn!("orchestrator.route.exhausted trace_id={trace_id} attempts={}", attempts.len());
                return Err(OrchestrationError::ExhaustedFallbacks { trace_id, attempts });
            };

            if Instant::now() >= deadline {
                log::warn!("orchestrator.route.cancelled trace_id={trace_id} reason=deadline_exceeded");
                return Err(OrchestrationError::Cancelled {
                    reason: format!("request deadline exceeded before attempting '{model_id}'"),
                });
            }

            let Some(model) = self.registry.get(&model_id) else {
                attempts.push(AttemptOutcome {
                    model_id: model_id.clone(),
                    error_kind: "ValidationError".to_string(),
                    message: "model id does not resolve in the current registry snapshot".to_string(),
                });
                tried.insert(model_id);
                next_model_id = selector
                    .fallback_chain(&task_reqs, &tried, self.settings.fallback_depth)
                    .into_iter()
                    .next();
                continue;
            };

            tried.insert(model.id.clone());
            match self.executor.run(&req, &model, attempt_index, &trace_id, Some(deadline)).await {
                Ok(mut response) => {
                    response.warnings = warnings;
                    log::info!(
                        "orchestrator.route.done trace_id={trace_id} model_id={} attempt={attempt_index}",
                        model.id
                    );
                    return Ok(response);
                }
                Err(err) => {
                    warnings.push(format!("skipped {}: {}", model.id, err.kind()));
                    attempts.push(AttemptOutcome {
                        model_id: model.id.clone(),
                        error_kind: err.kind().to_string(),
                        message: err.to_string(),
                    });
                    attempt_index += 1;
                    log::warn!(
                        "orchestrator.fallback.trigger trace_id={trace_id} model_id={} reason={}",
                        model.id, err.kind()
                    );
                    next_model_id = selector
                        .fallback_chain(&task_reqs, &tried, self.settings.fallback_depth)
                        .into_iter()
                        .next();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::TaskAnalyzer;
    use modelmux_core::auth::{ProviderSecrets, ProviderSecretsSource};
    use modelmux_core::error::ConfigurationError;
    use modelmux_core::traits::NullUsageSink;
    use modelmux_core::types::{CapabilityFlag, Maturity, ModelScores, Provider, StrategyChoice};
    use modelmux_providers::connection_pool::{ClientPool, PoolConfig};
    use std::collections::HashMap;
    use std::sync::Arc;

    struct NoSecrets;
    impl ProviderSecretsSource for NoSecrets {
        fn get(&self, _provider: &str) -> Result<ProviderSecrets, ConfigurationError> {
            Ok(ProviderSecrets::default())
        }
    }

    fn local_model(id: &str, reasoning: f64) -> modelmux_core::types::ModelCapability {
        local_model_with_api_name(id, reasoning, "local-echo")
    }

    fn local_model_with_api_name(id: &str, reasoning: f64, api_name: &str) -> modelmux_core::types::ModelCapability {
        modelmux_core::types::ModelCapability {
            id: id.to_string(),
            provider: Provider::Local,
            api_name: api_name.to_string(),
            context_window: 32_000,
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
            scores: ModelScores { reasoning, coding: 50.0, speed: 50.0, accuracy: 80.0 },
            capabilities: vec![],
            maturity: Maturity::Stable,
            available: true,
        }
    }

    fn orchestrator(models: Vec<modelmux_core::types::ModelCapability>) -> Orchestrator {
        let registry = ModelRegistry::new(models);
        let strategy_table = StrategyTable::builtin_defaults();
        let analyzer = TaskAnalyzer::heuristics_only();
        let pool = Arc::new(ClientPool::new(PoolConfig::default(), Arc::new(NoSecrets), HashMap::new()));
        let executor = Executor::new(pool, Arc::new(NullUsageSink), Settings::default());
        Orchestrator::new(registry, strategy_table, analyzer, executor, Settings::default())
    }

    fn request(prompt: &str) -> Request {
        Request {
            prompt: prompt.to_string(),
            strategy: StrategyChoice::Named(modelmux_core::types::Strategy::Quality),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn happy_path_routes_to_best_scoring_model() {
        let orch = orchestrator(vec![local_model("m-fast", 40.0), local_model("m-smart", 95.0)]);
        let response = orch.route_request(request("prove sqrt 2 is irrational")).await.unwrap();
        assert_eq!(response.model_id, "m-smart");
        assert_eq!(response.attempt_index, 0);
    }

    #[tokio::test]
    async fn fallback_fires_when_primary_fails_permanently() {
        let orch = orchestrator(vec![
            local_model("m-fast", 40.0),
            local_model_with_api_name("m-smart", 95.0, "local-fail-content-policy"),
        ]);
        let mut req = request("tell me something harmless");
        req.model_hint = Some("m-smart".to_string());
        req.task_type_hint = Some(modelmux_core::types::TaskType::Reasoning);
        let response = orch.route_request(req).await.unwrap();
        assert_eq!(response.model_id, "m-fast");
        assert_eq!(response.attempt_index, 1);
        assert!(response.warnings.iter().any(|w| w.contains("m-smart")));
    }

    #[tokio::test]
    async fn empty_registry_is_a_configuration_error() {
        let orch = orchestrator(vec![]);
        let err = orch.route_request(request("hello")).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Configuration(ConfigurationError::EmptyRegistry)));
    }

    #[tokio::test]
    async fn zero_deadline_cancels_immediately() {
        let mut orch = orchestrator(vec![local_model("m-1", 80.0)]);
        orch.settings.request_timeout_ms = 0;
        let err = orch.route_request(request("hello")).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn require_vision_with_no_vision_model_reports_validation_per_attempt() {
        let orch = orchestrator(vec![local_model("m-text-only", 80.0)]);
        let mut req = request("describe this image");
        req.image_refs = vec!["data:image/png;base64,abc".to_string()];
        let err = orch.route_request(req).await.unwrap_err();
        match err {
            OrchestrationError::ExhaustedFallbacks { attempts, .. } => {
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].error_kind, "ValidationError");
                assert!(attempts[0].message.contains("vision"));
            }
            other => panic!("expected ExhaustedFallbacks, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn model_hint_bypasses_selector_when_available() {
        let orch = orchestrator(vec![local_model("m-fast", 95.0), local_model("m-slow", 10.0)]);
        let mut req = request("hello");
        req.model_hint = Some("m-slow".to_string());
        let response = orch.route_request(req).await.unwrap();
        assert_eq!(response.model_id, "m-slow");
    }

    #[tokio::test]
    async fn vision_capable_model_is_selected_when_present() {
        let mut vision_model = local_model("m-vision", 80.0);
        vision_model.capabilities.push(CapabilityFlag::Vision);
        let orch = orchestrator(vec![local_model("m-text", 90.0), vision_model]);
        let mut req = request("describe this image");
        req.image_refs = vec!["data:image/png;base64,abc".to_string()];
        let response = orch.route_request(req).await.unwrap();
        assert_eq!(response.model_id, "m-vision");
    }
}
