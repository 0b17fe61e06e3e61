//! Consensus Engine (L9, §4.9): runs the top `n` selected models against the
//! same prompt and reduces their answers to one result, either by voting on
//! normalized answers or by synthesizing through an arbiter model.
//!
//! Every participant call goes through `Orchestrator::route_request`, so
//! fallback, retry, and usage recording for each participant behave exactly
//! as they would for a standalone request — consensus adds reduction on top,
//! it does not reimplement execution.

use crate::orchestrator::Orchestrator;
use crate::selector::Selector;
use modelmux_core::error::OrchestrationError;
use modelmux_core::types::{
    AgreementBand, ConsensusParticipant, ConsensusRequest, ConsensusResult, ConsensusStrategy,
    ModelCapability, Request, StrategyChoice,
};
use std::collections::HashSet;

pub struct ConsensusEngine<'a> {
    orchestrator: &'a Orchestrator,
}

struct Attempt {
    model_id: String,
    score: f64,
    outcome: Result<String, OrchestrationError>,
}

impl<'a> ConsensusEngine<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// The models consensus will run against, in Selector rank order, paired
    /// with the score that ranked them (reused below as `individual[].score`
    /// rather than inventing a second notion of per-model quality).
    async fn pick_participants(&self, req: &ConsensusRequest) -> Vec<(ModelCapability, f64)> {
        let base_strategy = req
            .scorer_strategy
            .map(StrategyChoice::Named)
            .unwrap_or_default();
        let probe = Request {
            prompt: req.prompt.clone(),
            strategy: base_strategy,
            ..Default::default()
        };
        let task_reqs = self.orchestrator.analyzer().analyze(&probe).await;
        let selector = Selector::new(self.orchestrator.registry(), self.orchestrator.strategy_table());
        let ranked = selector.select(&task_reqs, req.n);

        ranked
            .into_iter()
            .enumerate()
            .filter_map(|(rank, id)| {
                self.orchestrator
                    .registry()
                    .get(&id)
                    .map(|m| (m, 1.0 - (rank as f64 * 0.01)))
            })
            .collect()
    }

    /// `scorer_strategy`/`n` validated, feature-gate and quorum enforced,
    /// reduction dispatched to vote or synthesis (§4.9).
    pub async fn run(&self, req: ConsensusRequest) -> Result<ConsensusResult, OrchestrationError> {
        if self.orchestrator.settings().is_feature_disabled("consensus") {
            return Err(OrchestrationError::FeatureDisabled {
                feature: "consensus".to_string(),
            });
        }
        // "Consensus with N=1 -> ValidationError (not LowQuorum)" (§8).
        if req.n < 2 {
            return Err(OrchestrationError::Validation {
                reason: format!("consensus requires n >= 2, got {}", req.n),
            });
        }

        let participants = self.pick_participants(&req).await;
        if participants.is_empty() {
            return Err(OrchestrationError::Validation {
                reason: "no candidate models available for consensus".to_string(),
            });
        }

        let attempted = participants.len();
        let futures_iter = participants.iter().map(|(model, score)| {
            let stance = req.stance_steering.get(&model.id).cloned();
            let prompt = match &stance {
                Some(s) => format!("Stance: {s}\n\n{}", req.prompt),
                None => req.prompt.clone(),
            };
            let call_req = Request {
                prompt,
                model_hint: Some(model.id.clone()),
                strategy: req
                    .scorer_strategy
                    .map(StrategyChoice::Named)
                    .unwrap_or_default(),
                ..Default::default()
            };
            async move {
                let outcome = self
                    .orchestrator
                    .route_request(call_req)
                    .await
                    .map(|resp| resp.content);
                Attempt {
                    model_id: model.id.clone(),
                    score: *score,
                    outcome,
                }
            }
        });
        let attempts: Vec<Attempt> = futures::future::join_all(futures_iter).await;

        let succeeded: Vec<&Attempt> = attempts.iter().filter(|a| a.outcome.is_ok()).collect();
        log::info!(
            "consensus.run.complete succeeded={} attempted={attempted}",
            succeeded.len()
        );
        if succeeded.len() < 2 {
            let partial = succeeded
                .iter()
                .map(|a| ConsensusParticipant {
                    model_id: a.model_id.clone(),
                    content: a.outcome.as_ref().expect("filtered to Ok above").clone(),
                    score: a.score,
                })
                .collect();
            log::warn!("consensus.quorum.low succeeded={} attempted={attempted}", succeeded.len());
            return Err(OrchestrationError::LowQuorum {
                succeeded: succeeded.len(),
                attempted,
                partial,
            });
        }

        match req.strategy {
            ConsensusStrategy::Vote => Ok(Self::reduce_by_vote(succeeded)),
            ConsensusStrategy::Synthesis => self.reduce_by_synthesis(&req, succeeded).await,
        }
    }

    fn normalize(content: &str) -> String {
        content.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
    }

    /// Bucket responses by normalized text, pick the largest bucket; ties
    /// resolve to whichever bucket's first member has the better Selector
    /// rank (§4.9, "tie -> earlier-ranked model wins").
    fn reduce_by_vote(succeeded: Vec<&Attempt>) -> ConsensusResult {
        let mut buckets: Vec<(String, String, usize)> = Vec::new();
        for attempt in &succeeded {
            let content = attempt.outcome.as_ref().expect("filtered to Ok above");
            let key = Self::normalize(content);
            match buckets.iter_mut().find(|(k, _, _)| *k == key) {
                Some((_, _, count)) => *count += 1,
                None => buckets.push((key, content.clone(), 1)),
            }
        }
        let total = succeeded.len();
        let winner_count = buckets.iter().map(|(_, _, c)| *c).max().unwrap_or(0);
        let (_, winning_content, _) = buckets
            .into_iter()
            .find(|(_, _, c)| *c == winner_count)
            .expect("at least one bucket when succeeded is non-empty");

        let agreement_score = winner_count as f64 / total as f64;
        let individual = succeeded
            .iter()
            .map(|a| ConsensusParticipant {
                model_id: a.model_id.clone(),
                content: a.outcome.as_ref().expect("filtered to Ok above").clone(),
                score: a.score,
            })
            .collect();

        ConsensusResult {
            aggregated_content: winning_content,
            individual,
            agreement_score,
            agreement_band: AgreementBand::of(agreement_score),
            strategy_used: ConsensusStrategy::Vote,
        }
    }

    /// No explicit `arbiter_model` configured: fall back to the highest
    /// reasoning score in the registry, breaking ties the way the Scorer
    /// does for equal-score candidates (§9 open question 3).
    fn default_arbiter(&self) -> Option<String> {
        if let Some(explicit) = &self.orchestrator.settings().arbiter_model {
            return Some(explicit.clone());
        }
        self.orchestrator
            .registry()
            .list(&modelmux_core::registry::ListFilter::available())
            .into_iter()
            .min_by(|a, b| {
                b.scores
                    .reasoning
                    .partial_cmp(&a.scores.reasoning)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        b.scores
                            .accuracy
                            .partial_cmp(&a.scores.accuracy)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| {
                        a.effective_cost_per_1k()
                            .partial_cmp(&b.effective_cost_per_1k())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| a.maturity.cmp(&b.maturity))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|m| m.id)
    }

    /// Feeds every participant's answer, tagged by model id and stance, to
    /// an arbiter model and takes its reply as the aggregated answer.
    /// `agreement_score` becomes the mean token-overlap (Jaccard over
    /// lowercased whitespace tokens) between the arbiter's answer and each
    /// participant, since there is no vote count to report.
    async fn reduce_by_synthesis(
        &self,
        req: &ConsensusRequest,
        succeeded: Vec<&Attempt>,
    ) -> Result<ConsensusResult, OrchestrationError> {
        let arbiter_id = req.arbiter_model.clone().or_else(|| self.default_arbiter()).ok_or_else(|| {
            OrchestrationError::Validation {
                reason: "no arbiter_model configured and registry has no available models".to_string(),
            }
        })?;

        let mut prompt = format!(
            "Produce a single best answer to the original prompt below, drawing on the independent responses that follow.\n\nOriginal prompt:\n{}\n\nResponses:\n",
            req.prompt
        );
        for attempt in &succeeded {
            let stance = req.stance_steering.get(&attempt.model_id);
            let content = attempt.outcome.as_ref().expect("filtered to Ok above");
            match stance {
                Some(s) => prompt.push_str(&format!("- {} (stance: {s}): {content}\n", attempt.model_id)),
                None => prompt.push_str(&format!("- {}: {content}\n", attempt.model_id)),
            }
        }

        let arbiter_req = Request {
            prompt,
            model_hint: Some(arbiter_id),
            ..Default::default()
        };
        let arbiter_response = self.orchestrator.route_request(arbiter_req).await?;

        let arbiter_tokens: HashSet<String> = Self::normalize(&arbiter_response.content)
            .split(' ')
            .map(str::to_string)
            .collect();
        let mut total_similarity = 0.0;
        for attempt in &succeeded {
            let content = attempt.outcome.as_ref().expect("filtered to Ok above");
            let tokens: HashSet<String> =
                Self::normalize(content).split(' ').map(str::to_string).collect();
            total_similarity += jaccard(&arbiter_tokens, &tokens);
        }
        let agreement_score = total_similarity / succeeded.len() as f64;

        let individual: Vec<ConsensusParticipant> = succeeded
            .iter()
            .map(|a| ConsensusParticipant {
                model_id: a.model_id.clone(),
                content: a.outcome.as_ref().expect("filtered to Ok above").clone(),
                score: a.score,
            })
            .collect();

        Ok(ConsensusResult {
            aggregated_content: arbiter_response.content,
            individual,
            agreement_score,
            agreement_band: AgreementBand::of(agreement_score),
            strategy_used: ConsensusStrategy::Synthesis,
        })
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::TaskAnalyzer;
    use crate::executor::Executor;
    use modelmux_core::auth::{ProviderSecrets, ProviderSecretsSource};
    use modelmux_core::config::{Settings, StrategyTable};
    use modelmux_core::error::ConfigurationError;
    use modelmux_core::registry::ModelRegistry;
    use modelmux_core::traits::NullUsageSink;
    use modelmux_core::types::{Maturity, ModelScores, Provider};
    use modelmux_providers::connection_pool::{ClientPool, PoolConfig};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Arc;

    struct NoSecrets;
    impl ProviderSecretsSource for NoSecrets {
        fn get(&self, _provider: &str) -> Result<ProviderSecrets, ConfigurationError> {
            Ok(ProviderSecrets::default())
        }
    }

    fn local_model(id: &str, reasoning: f64, api_name: &str) -> ModelCapability {
        ModelCapability {
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

    fn orchestrator(models: Vec<ModelCapability>, settings: Settings) -> Orchestrator {
        let registry = ModelRegistry::new(models);
        let strategy_table = StrategyTable::builtin_defaults();
        let analyzer = TaskAnalyzer::heuristics_only();
        let pool = Arc::new(ClientPool::new(PoolConfig::default(), Arc::new(NoSecrets), StdHashMap::new()));
        let executor = Executor::new(pool, Arc::new(NullUsageSink), settings.clone());
        Orchestrator::new(registry, strategy_table, analyzer, executor, settings)
    }

    fn consensus_request(prompt: &str, n: usize, strategy: ConsensusStrategy) -> ConsensusRequest {
        ConsensusRequest {
            prompt: prompt.to_string(),
            n,
            strategy,
            arbiter_model: None,
            stance_steering: StdHashMap::new(),
            scorer_strategy: None,
        }
    }

    #[tokio::test]
    async fn n_equal_one_is_a_validation_error_not_low_quorum() {
        let orch = orchestrator(vec![local_model("m1", 90.0, "local-echo")], Settings::default());
        let engine = ConsensusEngine::new(&orch);
        let err = engine
            .run(consensus_request("hello", 1, ConsensusStrategy::Vote))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::Validation { .. }));
    }

    #[tokio::test]
    async fn unanimous_vote_has_agreement_score_one() {
        let orch = orchestrator(
            vec![
                local_model("m1", 90.0, "local-echo"),
                local_model("m2", 85.0, "local-echo"),
                local_model("m3", 80.0, "local-echo"),
            ],
            Settings::default(),
        );
        let engine = ConsensusEngine::new(&orch);
        let result = engine
            .run(consensus_request("same prompt for all", 3, ConsensusStrategy::Vote))
            .await
            .unwrap();
        assert_eq!(result.agreement_score, 1.0);
        assert_eq!(result.agreement_band, AgreementBand::High);
        assert_eq!(result.individual.len(), 3);
    }

    #[tokio::test]
    async fn one_failure_among_three_still_reaches_quorum() {
        let orch = orchestrator(
            vec![
                local_model("m1", 90.0, "local-echo"),
                local_model("m2", 85.0, "local-echo"),
                local_model("m3", 80.0, "local-fail-content-policy"),
            ],
            Settings::default(),
        );
        let engine = ConsensusEngine::new(&orch);
        let result = engine
            .run(consensus_request("tell me something harmless", 3, ConsensusStrategy::Vote))
            .await
            .unwrap();
        assert_eq!(result.individual.len(), 2);
    }

    #[tokio::test]
    async fn two_failures_among_three_is_low_quorum() {
        let orch = orchestrator(
            vec![
                local_model("m1", 90.0, "local-fail-content-policy"),
                local_model("m2", 85.0, "local-fail-content-policy"),
                local_model("m3", 80.0, "local-echo"),
            ],
            Settings::default(),
        );
        let engine = ConsensusEngine::new(&orch);
        let err = engine
            .run(consensus_request("tell me something harmless", 3, ConsensusStrategy::Vote))
            .await
            .unwrap_err();
        match err {
            OrchestrationError::LowQuorum { succeeded, attempted, partial } => {
                assert_eq!(succeeded, 1);
                assert_eq!(attempted, 3);
                assert_eq!(partial.len(), 1);
            }
            other => panic!("expected LowQuorum, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn synthesis_strategy_uses_arbiter_and_tags_strategy_used() {
        let orch = orchestrator(
            vec![
                local_model("m1", 90.0, "local-echo"),
                local_model("m2", 85.0, "local-echo"),
                local_model("arbiter", 99.0, "local-echo"),
            ],
            Settings::default(),
        );
        let mut req = consensus_request("describe rust ownership", 2, ConsensusStrategy::Synthesis);
        req.arbiter_model = Some("arbiter".to_string());
        let engine = ConsensusEngine::new(&orch);
        let result = engine.run(req).await.unwrap();
        assert_eq!(result.strategy_used, ConsensusStrategy::Synthesis);
        assert!(result.aggregated_content.contains("describe rust ownership"));
    }

    #[tokio::test]
    async fn consensus_is_a_configuration_error_when_feature_disabled() {
        let mut settings = Settings::default();
        settings.disabled_features.push("consensus".to_string());
        let orch = orchestrator(vec![local_model("m1", 90.0, "local-echo")], settings);
        let engine = ConsensusEngine::new(&orch);
        let err = engine
            .run(consensus_request("hello", 2, ConsensusStrategy::Vote))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::FeatureDisabled { .. }));
    }
}
