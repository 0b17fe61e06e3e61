//! Deterministic, no-network provider used by tests and as a placeholder
//! registry entry for self-hosted models that don't need outbound HTTP.
//!
//! Behavior is driven by the prompt text and, for model-specific failure
//! injection, by `api_name`, so Executor/Orchestrator/Consensus/Chain tests
//! can assert on a specific outcome without mocking an HTTP layer: a prompt
//! containing `__fail_timeout__` times out, one containing
//! `__fail_rate_limit__` returns `RateLimited`, a call against the magic
//! `api_name` `local-fail-content-policy` is always refused regardless of
//! prompt (used to make one registry entry unconditionally permanent-fail
//! in fallback tests), and anything else echoes the prompt back with a
//! fixed token count.

use async_trait::async_trait;
use modelmux_core::error::OrchestrationError;
use modelmux_core::traits::{GenerateCall, GenerateOutcome, HealthStatus, ProviderClient};

#[derive(Debug)]
pub struct LocalClient;

impl LocalClient {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for LocalClient {
    fn provider_tag(&self) -> &str {
        "local"
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus { available: true, reason: None }
    }

    async fn generate(&self, call: &GenerateCall) -> Result<GenerateOutcome, OrchestrationError> {
        if call.api_name == "local-fail-content-policy" {
            return Err(OrchestrationError::ContentPolicy {
                provider: "local".into(),
                reason: "refused by local guardrails".into(),
            });
        }
        if call.prompt.contains("__fail_timeout__") {
            return Err(OrchestrationError::Timeout {
                model_id: call.api_name.clone(),
                elapsed_ms: call.timeout.as_millis() as u64,
            });
        }
        if call.prompt.contains("__fail_rate_limit__") {
            return Err(OrchestrationError::RateLimited {
                provider: "local".into(),
                retry_after_ms: Some(100),
            });
        }
        if call.prompt.contains("__fail_content_policy__") {
            return Err(OrchestrationError::ContentPolicy {
                provider: "local".into(),
                reason: "refused by local guardrails".into(),
            });
        }
        if call.require_json && !call.prompt.contains("__allow_non_json__") {
            return Ok(GenerateOutcome {
                content: format!("{{\"echo\": {:?}}}", call.prompt),
                input_tokens: call.prompt.split_whitespace().count() as u64,
                output_tokens: 4,
                finish_reason: Some("stop".into()),
            });
        }
        Ok(GenerateOutcome {
            content: format!("echo: {}", call.prompt),
            input_tokens: call.prompt.split_whitespace().count() as u64,
            output_tokens: call.prompt.split_whitespace().count() as u64,
            finish_reason: Some("stop".into()),
        })
    }

    fn cost(&self, _input_tokens: u64, _output_tokens: u64, _api_name: &str) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn call(prompt: &str) -> GenerateCall {
        GenerateCall {
            api_name: "local-echo".into(),
            prompt: prompt.into(),
            image_refs: vec![],
            max_tokens: None,
            temperature: None,
            require_json: false,
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn echoes_prompt_by_default() {
        let client = LocalClient::new();
        let outcome = client.generate(&call("hello there")).await.unwrap();
        assert_eq!(outcome.content, "echo: hello there");
    }

    #[tokio::test]
    async fn magic_prompt_triggers_timeout() {
        let client = LocalClient::new();
        let err = client.generate(&call("__fail_timeout__")).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Timeout { .. }));
    }

    #[tokio::test]
    async fn magic_prompt_triggers_rate_limit() {
        let client = LocalClient::new();
        let err = client.generate(&call("__fail_rate_limit__")).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::RateLimited { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn magic_api_name_triggers_content_policy_regardless_of_prompt() {
        let client = LocalClient::new();
        let mut generate_call = call("tell me something harmless");
        generate_call.api_name = "local-fail-content-policy".into();
        let err = client.generate(&generate_call).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ContentPolicy { .. }));
    }

    #[tokio::test]
    async fn cost_is_always_zero() {
        let client = LocalClient::new();
        assert_eq!(client.cost(1000, 1000, "local-echo"), 0.0);
    }
}
