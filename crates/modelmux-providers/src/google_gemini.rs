//! Google Gemini `generateContent` adapter.

use crate::shared::{parse_gemini_response, ProviderHttpClient};
use async_trait::async_trait;
use modelmux_core::auth::AuthManager;
use modelmux_core::error::OrchestrationError;
use modelmux_core::traits::{GenerateCall, GenerateOutcome, HealthStatus, ProviderClient};
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug)]
pub struct GeminiClient {
    http: ProviderHttpClient,
}

impl GeminiClient {
    pub fn new(base_url: &str, auth: &AuthManager) -> Result<Self, OrchestrationError> {
        Ok(Self {
            http: ProviderHttpClient::new("google", base_url, auth)?,
        })
    }

    fn pricing(model: &str) -> (f64, f64) {
        if model.contains("flash") {
            (0.0000025, 0.0000075)
        } else {
            (0.000003, 0.00001)
        }
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn provider_tag(&self) -> &str {
        "google"
    }

    async fn health(&self) -> HealthStatus {
        let path = "/models/gemini-1.5-flash:generateContent";
        match self
            .http
            .post_json(
                path,
                &json!({
                    "contents": [{"parts": [{"text": "ping"}]}],
                    "generationConfig": {"maxOutputTokens": 1},
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
        let mut contents = vec![json!({"parts": [{"text": call.prompt}]})];
        for image in &call.image_refs {
            contents.push(json!({
                "parts": [{"inline_data": {"mime_type": "image/jpeg", "data": image}}]
            }));
        }

        let mut generation_config = json!({});
        if let Some(max_tokens) = call.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(temperature) = call.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if call.require_json {
            generation_config["response_mime_type"] = json!("application/json");
        }

        let payload = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });

        let path = format!("/models/{}:generateContent", call.api_name);
        let response = self.http.post_json(&path, &payload, call.timeout).await?;
        parse_gemini_response("google", &response)
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
    fn flash_is_cheaper_than_pro() {
        let (in_flash, out_flash) = GeminiClient::pricing("gemini-1.5-flash");
        let (in_pro, out_pro) = GeminiClient::pricing("gemini-1.5-pro");
        assert!(in_flash < in_pro);
        assert!(out_flash < out_pro);
    }
}
