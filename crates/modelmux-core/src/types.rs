//! Core data types shared by the registry, selector, executor, and the
//! consensus/chain layers built on top of them.
//!
//! These are value types: nothing here owns a network connection or a
//! background task. Provider adapters and the orchestrator convert between
//! these shapes and the wire formats of individual backends.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Enumerated provider tags recognized by the registry loader (§6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Anthropic,
    Google,
    Xai,
    Azure,
    Bedrock,
    Local,
    Dial,
}

impl Provider {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Xai => "xai",
            Self::Azure => "azure",
            Self::Bedrock => "bedrock",
            Self::Local => "local",
            Self::Dial => "dial",
        }
    }

    pub fn parse_tag(tag: &str) -> Option<Self> {
        match tag {
            "openai" => Some(Self::Openai),
            "anthropic" => Some(Self::Anthropic),
            "google" => Some(Self::Google),
            "xai" => Some(Self::Xai),
            "azure" => Some(Self::Azure),
            "bedrock" => Some(Self::Bedrock),
            "local" => Some(Self::Local),
            "dial" => Some(Self::Dial),
            _ => None,
        }
    }
}

/// Capability flags a model may advertise (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityFlag {
    Vision,
    Tools,
    JsonMode,
    Streaming,
    LongContext,
    FunctionCalling,
}

/// Model maturity tier, used as a Scorer tie-break (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Maturity {
    Stable,
    Beta,
    Alpha,
}

/// The four raw quality axes reported per model, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModelScores {
    pub reasoning: f64,
    pub coding: f64,
    pub speed: f64,
    pub accuracy: f64,
}

/// Immutable registry entry (§3). `ModelCapability::id` uniquely keys the
/// registry; two entries sharing an `id` is a manifest load error (§6.1).
///
/// # Examples
///
/// ```
/// use modelmux_core::types::{ModelCapability, Provider, Maturity, ModelScores};
///
/// let model = ModelCapability {
///     id: "gpt-4o".to_string(),
///     provider: Provider::Openai,
///     api_name: "gpt-4o".to_string(),
///     context_window: 128_000,
///     input_cost_per_1k: 0.005,
///     output_cost_per_1k: 0.015,
///     scores: ModelScores { reasoning: 92.0, coding: 88.0, speed: 70.0, accuracy: 90.0 },
///     capabilities: vec![],
///     maturity: Maturity::Stable,
///     available: true,
/// };
/// assert_eq!(model.id, "gpt-4o");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCapability {
    pub id: String,
    pub provider: Provider,
    pub api_name: String,
    pub context_window: u64,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    pub scores: ModelScores,
    #[serde(default)]
    pub capabilities: Vec<CapabilityFlag>,
    pub maturity: Maturity,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl ModelCapability {
    pub fn has(&self, flag: CapabilityFlag) -> bool {
        self.capabilities.contains(&flag)
    }

    /// `(input_cost + 3 * output_cost) / 4` — output-weighted per the Scorer (§4.4).
    pub fn effective_cost_per_1k(&self) -> f64 {
        (self.input_cost_per_1k + 3.0 * self.output_cost_per_1k) / 4.0
    }

    pub fn cost_usd(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_cost_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_cost_per_1k
    }
}

/// Classification produced by the Task Analyzer (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    CodeGeneration,
    Debugging,
    Refactor,
    Reasoning,
    Writing,
    Analysis,
    Translation,
    Vision,
    General,
}

/// Operator/caller preference driving the Scorer's weight table (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Quality,
    Speed,
    Cost,
    Balanced,
}

/// `Request.strategy`: either `auto` (resolve via `default_strategy`) or a
/// named strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyChoice {
    Auto,
    Named(Strategy),
}

impl Default for StrategyChoice {
    fn default() -> Self {
        Self::Auto
    }
}

/// Requirements record produced by the Analyzer and consumed by the Scorer (§3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequirements {
    pub task_type: TaskType,
    pub min_context: u64,
    pub require_vision: bool,
    pub require_tools: bool,
    pub require_json: bool,
    pub priority: Strategy,
    pub confidence: f64,
}

/// The orchestrator's input (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    pub prompt: String,
    #[serde(default)]
    pub image_refs: Vec<String>,
    #[serde(default)]
    pub model_hint: Option<String>,
    #[serde(default)]
    pub task_type_hint: Option<TaskType>,
    #[serde(default)]
    pub strategy: StrategyChoice,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub require_tools: bool,
    #[serde(default)]
    pub require_json: bool,
    #[serde(default)]
    pub trace_id: Option<String>,
}

/// The orchestrator's output (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub content: String,
    pub model_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
    pub cost_usd: f64,
    pub attempt_index: u32,
    pub trace_id: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Outcome recorded for one executed attempt, appended to the usage sink (§6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageOutcome {
    Ok,
    Retried,
    FallbackUsed,
    Failed,
}

/// Append-only usage record emitted once per executed attempt (§3, invariant 2 in §8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub trace_id: String,
    pub model_id: String,
    pub provider: Provider,
    pub started_at_ms: i64,
    pub finished_at_ms: i64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub outcome: UsageOutcome,
}

/// One participant's contribution to a consensus run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusParticipant {
    pub model_id: String,
    pub content: String,
    pub score: f64,
}

/// Which consensus algorithm produced a `ConsensusResult` (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusStrategy {
    Vote,
    Synthesis,
}

/// Named band over `ConsensusResult::agreement_score` (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgreementBand {
    Low,
    Medium,
    High,
}

impl AgreementBand {
    pub fn of(score: f64) -> Self {
        if score < 0.5 {
            Self::Low
        } else if score <= 0.8 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

/// Output of the Consensus Engine (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub aggregated_content: String,
    pub individual: Vec<ConsensusParticipant>,
    pub agreement_score: f64,
    pub agreement_band: AgreementBand,
    pub strategy_used: ConsensusStrategy,
}

/// A request to run consensus over the top `n` selected models (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRequest {
    pub prompt: String,
    #[serde(default = "default_consensus_n")]
    pub n: usize,
    pub strategy: ConsensusStrategy,
    #[serde(default)]
    pub arbiter_model: Option<String>,
    #[serde(default)]
    pub stance_steering: HashMap<String, String>,
    #[serde(default)]
    pub scorer_strategy: Option<Strategy>,
}

fn default_consensus_n() -> usize {
    3
}

/// One named stage in a `Pipeline` (§3, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    pub name: String,
    pub prompt_template: String,
    #[serde(default)]
    pub model_hint: Option<String>,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub require_vision: bool,
    pub output_key: String,
}

/// An ordered, checkpointable chain of steps (§3, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub pipeline_id: String,
    pub steps: Vec<PipelineStep>,
    #[serde(default)]
    pub inputs: HashMap<String, String>,
}

/// A persisted chain context snapshot (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub pipeline_id: String,
    pub step_index_completed: usize,
    pub context_snapshot: HashMap<String, String>,
    pub created_at_ms: i64,
}

/// Result of running (or resuming) a pipeline to completion (§6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResult {
    pub pipeline_id: String,
    pub context: HashMap<String, String>,
    pub steps_completed: usize,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agreement_band_thresholds_match_spec() {
        assert_eq!(AgreementBand::of(0.0), AgreementBand::Low);
        assert_eq!(AgreementBand::of(0.499), AgreementBand::Low);
        assert_eq!(AgreementBand::of(0.5), AgreementBand::Medium);
        assert_eq!(AgreementBand::of(0.8), AgreementBand::Medium);
        assert_eq!(AgreementBand::of(0.801), AgreementBand::High);
        assert_eq!(AgreementBand::of(1.0), AgreementBand::High);
    }

    #[test]
    fn effective_cost_weights_output_three_to_one() {
        let model = ModelCapability {
            id: "m".into(),
            provider: Provider::Openai,
            api_name: "m".into(),
            context_window: 1000,
            input_cost_per_1k: 1.0,
            output_cost_per_1k: 3.0,
            scores: ModelScores::default(),
            capabilities: vec![],
            maturity: Maturity::Stable,
            available: true,
        };
        assert_eq!(model.effective_cost_per_1k(), (1.0 + 9.0) / 4.0);
    }

    #[test]
    fn provider_tag_round_trips() {
        for tag in ["openai", "anthropic", "google", "xai", "azure", "bedrock", "local", "dial"] {
            let provider = Provider::parse_tag(tag).expect("known tag");
            assert_eq!(provider.as_tag(), tag);
        }
        assert!(Provider::parse_tag("not-a-provider").is_none());
    }

    #[test]
    fn strategy_choice_defaults_to_auto() {
        assert_eq!(StrategyChoice::default(), StrategyChoice::Auto);
    }
}
