//! Task Analyzer (L3, §4.3): classifies a prompt into `TaskRequirements`
//! via an ordered heuristic rule set, falling back to an LLM classification
//! call through the Orchestrator when no rule crosses the confidence
//! threshold.

use modelmux_core::types::{Request, Strategy, TaskRequirements, TaskType};
use once_cell::sync::Lazy;
use regex::Regex;

const CONFIDENCE_THRESHOLD: f64 = 0.8;
const BYTES_PER_TOKEN_ESTIMATE: u64 = 4;
const CONTEXT_SAFETY_MARGIN: u64 = 512;

struct HeuristicRule {
    task_type: TaskType,
    pattern: Lazy<Regex>,
    confidence: f64,
}

macro_rules! rule {
    ($task_type:expr, $pattern:expr, $confidence:expr) => {
        HeuristicRule {
            task_type: $task_type,
            pattern: Lazy::new(|| Regex::new($pattern).expect("heuristic pattern is valid")),
            confidence: $confidence,
        }
    };
}

static RULES: Lazy<Vec<HeuristicRule>> = Lazy::new(|| vec![
    rule!(
        TaskType::Debugging,
        r"(?i)\b(fix|debug|stack ?trace|exception|crash(es|ing)?|why (is|does) .* (fail|break))\b",
        0.9
    ),
    rule!(
        TaskType::CodeGeneration,
        r"(?i)\b(write|implement|generate) (a |an |the )?(function|class|script|program|snippet)\b",
        0.88
    ),
    rule!(
        TaskType::Refactor,
        r"(?i)\b(refactor|clean ?up|simplify|restructure) (this|the|my)? ?code\b",
        0.85
    ),
    rule!(
        TaskType::Translation,
        r"(?i)\btranslate\b.*\b(to|into)\b",
        0.9
    ),
    rule!(
        TaskType::Reasoning,
        r"(?i)\b(prove|derive|solve|step by step|logical(ly)?|why must)\b",
        0.82
    ),
    rule!(
        TaskType::Analysis,
        r"(?i)\b(analyz(e|is)|compare|evaluate|summarize the (data|findings|results))\b",
        0.82
    ),
    rule!(
        TaskType::Writing,
        r"(?i)\b(write|draft|compose) (a |an )?(essay|email|story|blog|poem|article)\b",
        0.85
    ),
]);

/// A classifier invoked when no heuristic rule crosses the confidence
/// threshold. Implemented by a thin wrapper around the Orchestrator so the
/// Analyzer itself never talks to a provider directly (§4.3 bypasses
/// Consensus but not the Orchestrator).
#[async_trait::async_trait]
pub trait FallbackClassifier: Send + Sync {
    async fn classify(&self, prompt: &str) -> Option<(TaskType, f64)>;
}

/// A classifier that always returns `None`, used when no LLM fallback is
/// configured — the Analyzer then settles on `General` at confidence 0.
pub struct NoFallbackClassifier;

#[async_trait::async_trait]
impl FallbackClassifier for NoFallbackClassifier {
    async fn classify(&self, _prompt: &str) -> Option<(TaskType, f64)> {
        None
    }
}

pub struct TaskAnalyzer {
    fallback: Box<dyn FallbackClassifier>,
}

impl TaskAnalyzer {
    pub fn new(fallback: Box<dyn FallbackClassifier>) -> Self {
        Self { fallback }
    }

    pub fn heuristics_only() -> Self {
        Self::new(Box::new(NoFallbackClassifier))
    }

    fn classify_heuristically(prompt: &str) -> Option<(TaskType, f64)> {
        RULES
            .iter()
            .find(|rule| rule.confidence >= CONFIDENCE_THRESHOLD && rule.pattern.is_match(prompt))
            .map(|rule| (rule.task_type, rule.confidence))
    }

    pub async fn analyze(&self, req: &Request) -> TaskRequirements {
        let (task_type, confidence) = if let Some(hint) = req.task_type_hint {
            (hint, 1.0)
        } else if let Some(found) = Self::classify_heuristically(&req.prompt) {
            found
        } else if let Some(found) = self.fallback.classify(&req.prompt).await {
            found
        } else {
            log::debug!("analyzer.classify.fallback_to_general");
            (TaskType::General, 0.0)
        };

        let priority = match req.strategy {
            modelmux_core::types::StrategyChoice::Named(strategy) => strategy,
            modelmux_core::types::StrategyChoice::Auto => Strategy::Balanced,
        };

        TaskRequirements {
            task_type,
            min_context: req.prompt.len() as u64 * BYTES_PER_TOKEN_ESTIMATE + CONTEXT_SAFETY_MARGIN,
            require_vision: !req.image_refs.is_empty(),
            require_tools: req.require_tools,
            require_json: req.require_json,
            priority,
            confidence,
        }
    }
}
