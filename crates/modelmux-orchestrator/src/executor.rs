//! Executor (L7, §4.7): runs one attempt against one `(ModelCapability,
//! ProviderClient)` pair with per-attempt timeout and transient-error retry.
//! Never chooses another model — that is the Orchestrator's job.

use modelmux_core::config::Settings;
use modelmux_core::error::OrchestrationError;
use modelmux_core::traits::{GenerateCall, UsageSink};
use modelmux_core::types::{ApiResponse, ModelCapability, Request, UsageOutcome, UsageRecord};
use modelmux_providers::connection_pool::ClientPool;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Executor {
    pool: Arc<ClientPool>,
    usage_sink: Arc<dyn UsageSink>,
    settings: Settings,
}

impl Executor {
    pub fn new(pool: Arc<ClientPool>, usage_sink: Arc<dyn UsageSink>, settings: Settings) -> Self {
        Self { pool, usage_sink, settings }
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    /// Exponential backoff with full jitter: `uniform(0, min(cap, base * 2^attempt))`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.settings.backoff_base_ms.saturating_mul(1u64 << attempt.min(16));
        let capped = exp.min(self.settings.backoff_cap_ms);
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered)
    }

    pub async fn run(
        &self,
        req: &Request,
        model: &ModelCapability,
        attempt_index: u32,
        trace_id: &str,
        deadline: Option<Instant>,
    ) -> Result<ApiResponse, OrchestrationError> {
        let call = GenerateCall {
            api_name: model.api_name.clone(),
            prompt: req.prompt.clone(),
            image_refs: req.image_refs.clone(),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            require_json: req.require_json,
            timeout: Duration::from_millis(self.settings.attempt_timeout_ms),
        };

        let mut retries = 0u32;
        let mut retried_at_all = false;
        loop {
            let lease = self.pool.acquire(model.provider, deadline).await?;
            let started_at_ms = chrono::Utc::now().timestamp_millis();
            let started = Instant::now();
            let outcome = tokio::time::timeout(call.timeout, lease.client.generate(&call)).await;

            let result = match outcome {
                Ok(inner) => inner,
                Err(_) => Err(OrchestrationError::Timeout {
                    model_id: model.id.clone(),
                    elapsed_ms: call.timeout.as_millis() as u64,
                }),
            };

            self.pool.record_outcome(model.provider, result.is_ok()).await?;

            match result {
                Ok(generated) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    let cost_usd = model.cost_usd(generated.input_tokens, generated.output_tokens);
                    self.usage_sink
                        .append(UsageRecord {
                            trace_id: trace_id.to_string(),
                            model_id: model.id.clone(),
                            provider: model.provider,
                            started_at_ms,
                            finished_at_ms: chrono::Utc::now().timestamp_millis(),
                            input_tokens: generated.input_tokens,
                            output_tokens: generated.output_tokens,
                            cost_usd,
                            outcome: if retried_at_all { UsageOutcome::Retried } else { UsageOutcome::Ok },
                        })
                        .await;
                    log::info!(
                        "executor.attempt.ok model={} attempt={} latency_ms={}",
                        model.id, attempt_index, latency_ms
                    );
                    return Ok(ApiResponse {
                        content: generated.content,
                        model_id: model.id.clone(),
                        input_tokens: generated.input_tokens,
                        output_tokens: generated.output_tokens,
                        latency_ms,
                        cost_usd,
                        attempt_index,
                        trace_id: trace_id.to_string(),
                        warnings: Vec::new(),
                    });
                }
                Err(err) if err.is_transient() && retries < self.settings.max_retries => {
                    retries += 1;
                    retried_at_all = true;
                    let delay = match &err {
                        OrchestrationError::RateLimited { retry_after_ms: Some(ms), .. } => {
                            Duration::from_millis(*ms)
                        }
                        _ => self.backoff_delay(retries),
                    };
                    log::warn!(
                        "executor.attempt.retry model={} attempt={} retry={} delay_ms={} reason={}",
                        model.id, attempt_index, retries, delay.as_millis(), err.kind()
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(err) => {
                    self.usage_sink
                        .append(UsageRecord {
                            trace_id: trace_id.to_string(),
                            model_id: model.id.clone(),
                            provider: model.provider,
                            started_at_ms,
                            finished_at_ms: chrono::Utc::now().timestamp_millis(),
                            input_tokens: 0,
                            output_tokens: 0,
                            cost_usd: 0.0,
                            outcome: UsageOutcome::Failed,
                        })
                        .await;
                    log::warn!(
                        "executor.attempt.failed model={} attempt={} reason={}",
                        model.id, attempt_index, err.kind()
                    );
                    return Err(err);
                }
            }
        }
    }
}
