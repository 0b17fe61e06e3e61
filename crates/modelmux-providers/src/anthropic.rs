//! Anthropic messages API adapter.

use crate::shared::{parse_anthropic_response, ProviderHttpClient};
use async_trait::async_trait;
use modelmux_core::auth::AuthManager;
use modelmux_core::error::OrchestrationError;
use modelmux_core::traits::{GenerateCall, GenerateOutcome, HealthStatus, ProviderClient};
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug)]
pub struct AnthropicClient {
    http: ProviderHttpClient,
}

impl AnthropicClient {
    pub fn new(base_url: &str, auth: &AuthManager) -> Result<Self, OrchestrationError> {
        Ok(Self {
            http: ProviderHttpClient::with_extra_headers(
                "anthropic",
                base_url,
                auth,
                &[("anthropic-version", ANTHROPIC_VERSION)],
            )?,
        })
    }

    fn pricing(model: &str) -> (f64, f64) {
        if model.contains("haiku") {
            (0.00000025, 0.00000125)
        } else if model.contains("sonnet") {
            (0.000003, 0.000015)
        } else if model.contains("opus") {
            (0.000015, 0.000075)
        } else {
            (0.0, 0.0)
        }
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn provider_tag(&self) -> &str {
        "anthropic"
    }

    async fn health(&self) -> HealthStatus {
        match self
            .http
            .post_json(
                "/messages",
                &json!({
                    "model": "claude-3-5-haiku-20241022",
                    "max_tokens": 1,
                    "messages": [{"role": "user", "content": "ping"}],
                }),
                std::time::Duration::from_secs(5),
            )
            .await
        {
            Ok(_) => HealthStatus { available: true, reason: None },
            Err(e) => HealthStatus {
                available: false,
                reason: Some(e.to_string()),
            },
        }
    }

    async fn generate(&self, call: &GenerateCall) -> Result<GenerateOutcome, OrchestrationError> {
        let content = if call.image_refs.is_empty() {
            json!(call.prompt)
        } else {
            let mut parts = vec![json!({"type": "text", "text": call.prompt})];
            for image in &call.image_refs {
                parts.push(json!({
                    "type": "image",
                    "source": {"type": "url", "url": image},
                }));
            }
            json!(parts)
        };

        let mut payload = json!({
            "model": call.api_name,
            "max_tokens": call.max_tokens.unwrap_or(1024),
            "messages": [{"role": "user", "content": content}],
        });
        if let Some(temperature) = call.temperature {
            payload["temperature"] = json!(temperature);
        }

        let response = self.http.post_json("/messages", &payload, call.timeout).await?;
        parse_anthropic_response("anthropic", &response)
    }

    fn cost(&self, input_tokens: u64, output_tokens: u64, api_name: &str) -> f64 {
        let (input_cost, output_cost) = Self::pricing(api_name);
        (input_tokens as f64 * input_cost) + (output_tokens as f64 * output_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opus_is_pricier_than_haiku() {
        let (in_opus, out_opus) = AnthropicClient::pricing("claude-3-opus-20240229");
        let (in_haiku, out_haiku) = AnthropicClient::pricing("claude-3-5-haiku-20241022");
        assert!(in_opus > in_haiku);
        assert!(out_opus > out_haiku);
    }
}
