//! Selector (L5, §4.5): turns requirements + registry into an ordered list
//! of candidate model ids, and produces fallback chains when a primary
//! attempt fails.

use crate::scorer::{compare_candidates, score};
use modelmux_core::config::StrategyTable;
use modelmux_core::registry::{ListFilter, ModelRegistry};
use modelmux_core::types::{ModelCapability, Strategy, TaskRequirements};
use std::collections::HashSet;

pub struct Selector<'a> {
    registry: &'a ModelRegistry,
    strategy_table: &'a StrategyTable,
}

impl<'a> Selector<'a> {
    pub fn new(registry: &'a ModelRegistry, strategy_table: &'a StrategyTable) -> Self {
        Self { registry, strategy_table }
    }

    fn ranked_candidates(
        &self,
        req: &TaskRequirements,
        priority: Strategy,
        excluding: &HashSet<String>,
    ) -> Vec<(f64, ModelCapability)> {
        let models = self.registry.list(&ListFilter::available());
        let weights = self.strategy_table.weights_for(priority);
        let cost_ceiling = self.strategy_table.cost_ceiling.unwrap_or_else(|| {
            models
                .iter()
                .map(ModelCapability::effective_cost_per_1k)
                .fold(0.0_f64, f64::max)
                .max(1e-9)
        });

        let mut scored: Vec<(f64, ModelCapability)> = models
            .into_iter()
            .filter(|m| !excluding.contains(&m.id))
            .map(|m| (score(req, &m, &weights, cost_ceiling), m))
            .filter(|(s, _)| *s > 0.0)
            .collect();

        scored.sort_by(compare_candidates);
        scored
    }

    /// Best `k` model ids, excluding zero-scored models (§4.5).
    pub fn select(&self, req: &TaskRequirements, k: usize) -> Vec<String> {
        self.ranked_candidates(req, req.priority, &HashSet::new())
            .into_iter()
            .take(k)
            .map(|(_, m)| m.id)
            .collect()
    }

    /// Ordered fallback ids suitable once the primary has failed, capped at
    /// `depth` (§4.5, default 3 from `Settings::fallback_depth`).
    pub fn fallback_chain(&self, req: &TaskRequirements, excluding: &HashSet<String>, depth: usize) -> Vec<String> {
        self.ranked_candidates(req, req.priority, excluding)
            .into_iter()
            .take(depth)
            .map(|(_, m)| m.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelmux_core::types::{Maturity, ModelScores, Provider, TaskType};

    fn model(id: &str, reasoning: f64) -> ModelCapability {
        ModelCapability {
            id: id.to_string(),
            provider: Provider::Openai,
            api_name: id.to_string(),
            context_window: 128_000,
            input_cost_per_1k: 0.001,
            output_cost_per_1k: 0.002,
            scores: ModelScores { reasoning, coding: 50.0, speed: 50.0, accuracy: 80.0 },
            capabilities: vec![],
            maturity: Maturity::Stable,
            available: true,
        }
    }

    fn requirements() -> TaskRequirements {
        TaskRequirements {
            task_type: TaskType::Reasoning,
            min_context: 1000,
            require_vision: false,
            require_tools: false,
            require_json: false,
            priority: Strategy::Quality,
            confidence: 1.0,
        }
    }

    #[test]
    fn select_prefers_higher_reasoning_score() {
        let registry = ModelRegistry::new(vec![model("m-smart", 95.0), model("m-fast", 40.0)]);
        let table = StrategyTable::builtin_defaults();
        let selector = Selector::new(&registry, &table);
        let picks = selector.select(&requirements(), 1);
        assert_eq!(picks, vec!["m-smart".to_string()]);
    }

    #[test]
    fn select_k_is_a_prefix_of_select_k_plus_one() {
        let registry = ModelRegistry::new(vec![
            model("m1", 90.0),
            model("m2", 80.0),
            model("m3", 70.0),
        ]);
        let table = StrategyTable::builtin_defaults();
        let selector = Selector::new(&registry, &table);
        let top1 = selector.select(&requirements(), 1);
        let top2 = selector.select(&requirements(), 2);
        assert_eq!(top2[..top1.len()], top1[..]);
    }

    #[test]
    fn fallback_chain_excludes_already_tried_models() {
        let registry = ModelRegistry::new(vec![model("m-smart", 95.0), model("m-fast", 80.0)]);
        let table = StrategyTable::builtin_defaults();
        let selector = Selector::new(&registry, &table);
        let mut excluding = HashSet::new();
        excluding.insert("m-smart".to_string());
        let fallback = selector.fallback_chain(&requirements(), &excluding, 3);
        assert_eq!(fallback, vec!["m-fast".to_string()]);
    }

    #[test]
    fn empty_registry_yields_no_candidates() {
        let registry = ModelRegistry::empty();
        let table = StrategyTable::builtin_defaults();
        let selector = Selector::new(&registry, &table);
        assert!(selector.select(&requirements(), 1).is_empty());
    }
}
