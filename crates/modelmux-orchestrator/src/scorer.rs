//! Scorer (L4, §4.4): a pure function from `(TaskRequirements, ModelCapability,
//! StrategyWeights)` to a score in `[0, 1]`. No I/O, no mutable state.

use modelmux_core::config::StrategyWeights;
use modelmux_core::types::{CapabilityFlag, ModelCapability, TaskRequirements, TaskType};

/// `score == 0.0` for any model failing a hard filter (§4.4, invariant 3 in §8).
pub fn score(req: &TaskRequirements, model: &ModelCapability, weights: &StrategyWeights, cost_ceiling: f64) -> f64 {
    if req.require_vision && !model.has(CapabilityFlag::Vision) {
        return 0.0;
    }
    if req.require_tools && !model.has(CapabilityFlag::Tools) {
        return 0.0;
    }
    if req.require_json && !model.has(CapabilityFlag::JsonMode) {
        return 0.0;
    }
    if req.min_context > model.context_window {
        return 0.0;
    }
    if !model.available {
        return 0.0;
    }

    let task = task_affinity(req.task_type, model);
    let perf = (model.scores.speed / 100.0).clamp(0.0, 1.0);
    let acc = (model.scores.accuracy / 100.0).clamp(0.0, 1.0);
    let cost = if cost_ceiling <= 0.0 {
        0.0
    } else {
        1.0 - (model.effective_cost_per_1k() / cost_ceiling).clamp(0.0, 1.0)
    };

    weights.task * task + weights.perf * perf + weights.acc * acc + weights.cost * cost
}

fn task_affinity(task_type: TaskType, model: &ModelCapability) -> f64 {
    let raw = match task_type {
        TaskType::CodeGeneration | TaskType::Debugging | TaskType::Refactor => model.scores.coding,
        TaskType::Reasoning | TaskType::Analysis => model.scores.reasoning,
        TaskType::Writing | TaskType::Translation | TaskType::General | TaskType::Vision => {
            return 0.5;
        }
    };
    (raw / 100.0).clamp(0.0, 1.0)
}

/// Ordering used by the Selector (§4.4 tie-breaks): higher score first, then
/// higher accuracy, then lower effective cost, then maturity (stable <
/// beta < alpha by derive order, so `Ord` already sorts stable first), then
/// lexicographic id.
pub fn compare_candidates(
    a: &(f64, ModelCapability),
    b: &(f64, ModelCapability),
) -> std::cmp::Ordering {
    b.0.partial_cmp(&a.0)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| {
            b.1.scores
                .accuracy
                .partial_cmp(&a.1.scores.accuracy)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .then_with(|| {
            a.1.effective_cost_per_1k()
                .partial_cmp(&b.1.effective_cost_per_1k())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .then_with(|| a.1.maturity.cmp(&b.1.maturity))
        .then_with(|| a.1.id.cmp(&b.1.id))
}
