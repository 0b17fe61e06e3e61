//! OpenAI chat completions adapter.

use crate::shared::{parse_openai_chat_response, ProviderHttpClient};
use async_trait::async_trait;
use modelmux_core::auth::AuthManager;
use modelmux_core::error::OrchestrationError;
use modelmux_core::traits::{GenerateCall, GenerateOutcome, HealthStatus, ProviderClient};
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug)]
pub struct OpenAiClient {
    http: ProviderHttpClient,
}

impl OpenAiClient {
    pub fn new(base_url: &str, auth: &AuthManager) -> Result<Self, OrchestrationError> {
        Ok(Self {
            http: ProviderHttpClient::new("openai", base_url, auth)?,
        })
    }

    fn pricing(model: &str) -> (f64, f64) {
        match model {
            m if m.contains("gpt-4o") => (0.000005, 0.000015),
            m if m.contains("gpt-4") => (0.00001, 0.00003),
            m if m.contains("gpt-3.5") => (0.0000015, 0.000002),
            _ => (0.0, 0.0),
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn provider_tag(&self) -> &str {
        "openai"
    }

    async fn health(&self) -> HealthStatus {
        match self
            .http
            .post_json(
                "/chat/completions",
                &json!({
                    "model": "gpt-4o-mini",
                    "messages": [{"role": "user", "content": "ping"}],
                    "max_tokens": 1,
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
        let message = if call.image_refs.is_empty() {
            json!({"role": "user", "content": call.prompt})
        } else {
            let mut parts = vec![json!({"type": "text", "text": call.prompt})];
            for image in &call.image_refs {
                parts.push(json!({"type": "image_url", "image_url": {"url": image}}));
            }
            json!({"role": "user", "content": parts})
        };

        let mut payload = json!({
            "model": call.api_name,
            "messages": [message],
        });
        if let Some(max_tokens) = call.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = call.temperature {
            payload["temperature"] = json!(temperature);
        }
        if call.require_json {
            payload["response_format"] = json!({"type": "json_object"});
        }

        let response = self
            .http
            .post_json("/chat/completions", &payload, call.timeout)
            .await?;
        parse_openai_chat_response("openai", &response)
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
    fn gpt4o_pricing_is_cheaper_than_gpt4() {
        let (in_4o, out_4o) = OpenAiClient::pricing("gpt-4o");
        let (in_4, out_4) = OpenAiClient::pricing("gpt-4-turbo");
        assert!(in_4o < in_4);
        assert!(out_4o < out_4);
    }

    #[test]
    fn unknown_model_prices_at_zero() {
        assert_eq!(OpenAiClient::pricing("some-future-model"), (0.0, 0.0));
    }
}
