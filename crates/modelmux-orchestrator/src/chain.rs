//! Chain Orchestrator (L10, §4.10): runs a `Pipeline` of named steps
//! sequentially, rendering each step's prompt template against the running
//! context, routing it through `Orchestrator::route_request`, and
//! checkpointing the context after every completed step before the next one
//! starts.
//!
//! Template rendering is deliberately minimal (§9 Design Notes): named
//! placeholders only, no expressions, and an unresolved placeholder is a
//! hard, non-retryable `TemplateError`.

use crate::orchestrator::Orchestrator;
use handlebars::Handlebars;
use modelmux_core::error::OrchestrationError;
use modelmux_core::traits::CheckpointSink;
use modelmux_core::types::{Checkpoint, ChainResult, Pipeline, PipelineStep, Request, StrategyChoice};
use std::collections::HashMap;
use std::sync::Arc;

pub struct ChainOrchestrator<'a> {
    orchestrator: &'a Orchestrator,
    checkpoints: Arc<dyn CheckpointSink>,
}

impl<'a> ChainOrchestrator<'a> {
    pub fn new(orchestrator: &'a Orchestrator, checkpoints: Arc<dyn CheckpointSink>) -> Self {
        Self { orchestrator, checkpoints }
    }

    /// Renders `template` against `context` with handlebars in strict mode,
    /// so a reference to a key missing from `context` raises instead of
    /// silently emitting an empty string.
    fn render(step_name: &str, template: &str, context: &HashMap<String, String>) -> Result<String, OrchestrationError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.render_template(template, context).map_err(|e| OrchestrationError::Template {
            step: step_name.to_string(),
            reason: e.to_string(),
        })
    }

    fn build_request(step: &PipelineStep, prompt: String) -> Request {
        Request {
            prompt,
            model_hint: step.model_hint.clone(),
            task_type_hint: step.task_type,
            require_tools: false,
            require_json: false,
            strategy: StrategyChoice::Auto,
            image_refs: if step.require_vision {
                vec!["pipeline-step-vision-placeholder".to_string()]
            } else {
                Vec::new()
            },
            ..Default::default()
        }
    }

    async fn run_step(
        &self,
        step: &PipelineStep,
        context: &HashMap<String, String>,
    ) -> Result<String, OrchestrationError> {
        let prompt = Self::render(&step.name, &step.prompt_template, context)?;
        let req = Self::build_request(step, prompt);
        let response = self.orchestrator.route_request(req).await?;
        Ok(response.content)
    }

    async fn checkpoint_after(
        &self,
        pipeline_id: &str,
        step_index_completed: usize,
        context: &HashMap<String, String>,
    ) -> Result<(), OrchestrationError> {
        let checkpoint = Checkpoint {
            checkpoint_id: format!("{pipeline_id}-step-{step_index_completed}"),
            pipeline_id: pipeline_id.to_string(),
            step_index_completed,
            context_snapshot: context.clone(),
            created_at_ms: chrono::Utc::now().timestamp_millis(),
        };
        self.checkpoints.save(&checkpoint).await.map_err(OrchestrationError::Configuration)?;
        log::info!(
            "chain.checkpoint.saved pipeline_id={pipeline_id} step_index_completed={step_index_completed}"
        );
        Ok(())
    }

    /// Runs every step of `pipeline` from the beginning (§4.10).
    pub async fn run_pipeline(&self, pipeline: Pipeline) -> Result<ChainResult, OrchestrationError> {
        if self.orchestrator.settings().is_feature_disabled("chain") {
            return Err(OrchestrationError::FeatureDisabled { feature: "chain".to_string() });
        }
        self.execute_from(pipeline.pipeline_id.clone(), pipeline.steps, pipeline.inputs, 0)
            .await
    }

    /// Resumes `pipeline_id` from `checkpoint_id`, merging `overrides` into
    /// the restored context before re-running the remaining steps. The
    /// pipeline's step list must be supplied again since checkpoints persist
    /// context, not step definitions (§3 Checkpoint has no `steps` field).
    pub async fn resume_pipeline(
        &self,
        pipeline: Pipeline,
        checkpoint_id: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> Result<ChainResult, OrchestrationError> {
        if self.orchestrator.settings().is_feature_disabled("chain") {
            return Err(OrchestrationError::FeatureDisabled { feature: "chain".to_string() });
        }
        let checkpoint = self
            .checkpoints
            .load(checkpoint_id)
            .await
            .map_err(OrchestrationError::Configuration)?;

        if checkpoint.pipeline_id != pipeline.pipeline_id {
            return Err(OrchestrationError::ResumeSchemaDrift {
                pipeline_id: pipeline.pipeline_id.clone(),
                reason: format!(
                    "checkpoint belongs to pipeline '{}', not '{}'",
                    checkpoint.pipeline_id, pipeline.pipeline_id
                ),
            });
        }
        if checkpoint.step_index_completed >= pipeline.steps.len() {
            return Err(OrchestrationError::ResumeSchemaDrift {
                pipeline_id: pipeline.pipeline_id.clone(),
                reason: format!(
                    "checkpoint step_index_completed={} but pipeline has only {} steps",
                    checkpoint.step_index_completed,
                    pipeline.steps.len()
                ),
            });
        }

        let mut context = checkpoint.context_snapshot.clone();
        let mut warnings = Vec::new();
        if let Some(overrides) = overrides {
            for (key, value) in overrides {
                if context.contains_key(&key) {
                    warnings.push(format!("override replaced existing context key '{key}'"));
                }
                context.insert(key, value);
            }
        }

        log::info!(
            "chain.resume.begin pipeline_id={} from_step={}",
            pipeline.pipeline_id, checkpoint.step_index_completed
        );
        let mut result = self
            .execute_from(
                pipeline.pipeline_id,
                pipeline.steps,
                context,
                checkpoint.step_index_completed,
            )
            .await?;
        result.warnings.extend(warnings);
        Ok(result)
    }

    /// Shared sequential executor: runs `steps[start_index..]` against
    /// `context`, checkpointing after each step (§4.10, §8 invariant 6).
    async fn execute_from(
        &self,
        pipeline_id: String,
        steps: Vec<PipelineStep>,
        mut context: HashMap<String, String>,
        start_index: usize,
    ) -> Result<ChainResult, OrchestrationError> {
        let mut steps_completed = start_index;
        for (index, step) in steps.iter().enumerate().skip(start_index) {
            log::debug!("chain.step.begin pipeline_id={pipeline_id} step={} index={index}", step.name);
            let output = self.run_step(step, &context).await?;
            context.insert(step.output_key.clone(), output);
            steps_completed = index + 1;
            self.checkpoint_after(&pipeline_id, steps_completed, &context).await?;
        }

        Ok(ChainResult {
            pipeline_id,
            context,
            steps_completed,
            warnings: Vec::new(),
        })
    }
}
