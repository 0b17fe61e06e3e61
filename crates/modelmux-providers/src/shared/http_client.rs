//! Shared HTTP plumbing for provider adapters: issuing the POST, and
//! classifying the raw HTTP outcome into the §7 error taxonomy. Adapters
//! never retry here — they return a classified error and let the Executor
//! decide.

use modelmux_core::auth::AuthManager;
use modelmux_core::error::OrchestrationError;
use modelmux_core::redaction::redact_secrets_in_text;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// A thin authenticated HTTP client shared by every JSON-over-HTTPS adapter.
#[derive(Debug)]
pub struct ProviderHttpClient {
    client: Client,
    base_url: String,
    provider: String,
}

impl ProviderHttpClient {
    pub fn new(provider: &str, base_url: &str, auth: &AuthManager) -> Result<Self, OrchestrationError> {
        Self::with_extra_headers(provider, base_url, auth, &[])
    }

    /// Like `new`, but stamps additional static headers on every request —
    /// e.g. Anthropic's `anthropic-version`.
    pub fn with_extra_headers(
        provider: &str,
        base_url: &str,
        auth: &AuthManager,
        extra_headers: &[(&str, &str)],
    ) -> Result<Self, OrchestrationError> {
        let mut headers = reqwest::header::HeaderMap::new();
        auth.add_auth_headers(&mut headers)
            .map_err(OrchestrationError::from)?;
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        for (name, value) in extra_headers {
            let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| OrchestrationError::ProviderUnavailable {
                    provider: provider.to_string(),
                    reason: format!("invalid header name {name}: {e}"),
                })?;
            let header_value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| OrchestrationError::ProviderUnavailable {
                    provider: provider.to_string(),
                    reason: format!("invalid header value for {name}: {e}"),
                })?;
            headers.insert(header_name, header_value);
        }
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| OrchestrationError::ProviderUnavailable {
                provider: provider.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            provider: provider.to_string(),
        })
    }

    pub async fn post_json(
        &self,
        path: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value, OrchestrationError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error(&self.provider, e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| OrchestrationError::ProviderUnavailable {
                    provider: self.provider.clone(),
                    reason: format!("response body was not valid JSON: {e}"),
                });
        }

        let retry_after_ms = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1000);
        let body = response.text().await.unwrap_or_default();
        let err = classify_status_error(&self.provider, status, retry_after_ms, &body);
        log::warn!(
            "provider.http.error provider={} status={status} reason={}",
            self.provider,
            redact_secrets_in_text(&err.to_string())
        );
        Err(err)
    }
}

fn classify_transport_error(provider: &str, err: reqwest::Error) -> OrchestrationError {
    if err.is_timeout() {
        OrchestrationError::Timeout {
            model_id: provider.to_string(),
            elapsed_ms: 0,
        }
    } else {
        OrchestrationError::NetworkTransient {
            provider: provider.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Map an HTTP status + body into the §7 taxonomy. Shared across adapters so
/// "429 is transient, 4xx is permanent, 5xx is transient" is decided once.
fn classify_status_error(
    provider: &str,
    status: StatusCode,
    retry_after_ms: Option<u64>,
    body: &str,
) -> OrchestrationError {
    let message = extract_error_message(body).unwrap_or_else(|| body.to_string());
    match status {
        StatusCode::TOO_MANY_REQUESTS => OrchestrationError::RateLimited {
            provider: provider.to_string(),
            retry_after_ms,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => OrchestrationError::ProviderUnavailable {
            provider: provider.to_string(),
            reason: format!("authentication rejected: {message}"),
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => OrchestrationError::Validation {
            reason: format!("{provider} rejected the request: {message}"),
        },
        s if s == StatusCode::from_u16(451).unwrap() => OrchestrationError::ContentPolicy {
            provider: provider.to_string(),
            reason: message,
        },
        s if s.is_server_error() => OrchestrationError::NetworkTransient {
            provider: provider.to_string(),
            reason: format!("{status}: {message}"),
        },
        _ => OrchestrationError::ProviderUnavailable {
            provider: provider.to_string(),
            reason: format!("{status}: {message}"),
        },
    }
}

/// Extract a human-readable error message from a provider's error envelope,
/// trying the common shapes (`error.message`, `error` as string, `message`).
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    if let Some(error) = value.get("error") {
        if let Some(message) = error.get("message").and_then(|v| v.as_str()) {
            return Some(message.to_string());
        }
        if let Some(s) = error.as_str() {
            return Some(s.to_string());
        }
    }
    value
        .get("message")
        .and_then(|v| v.as_str())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_openai_style_error_message() {
        let body = r#"{"error": {"message": "invalid api key", "type": "auth_error"}}"#;
        assert_eq!(extract_error_message(body), Some("invalid api key".to_string()));
    }

    #[test]
    fn extracts_top_level_message() {
        let body = r#"{"message": "bad request"}"#;
        assert_eq!(extract_error_message(body), Some("bad request".to_string()));
    }

    #[test]
    fn status_classification_matches_taxonomy() {
        let rate_limited =
            classify_status_error("openai", StatusCode::TOO_MANY_REQUESTS, Some(1000), "{}");
        assert!(matches!(rate_limited, OrchestrationError::RateLimited { .. }));

        let server_err =
            classify_status_error("openai", StatusCode::BAD_GATEWAY, None, "{}");
        assert!(matches!(server_err, OrchestrationError::NetworkTransient { .. }));

        let auth_err = classify_status_error("openai", StatusCode::UNAUTHORIZED, None, "{}");
        assert!(matches!(auth_err, OrchestrationError::ProviderUnavailable { .. }));
    }

    #[test]
    fn secret_echoed_in_an_error_body_never_reaches_the_logged_line() {
        let body = r#"{"error": {"message": "rejected credential api_key: sk-live-deadbeef1234"}}"#;
        let err = classify_status_error("openai", StatusCode::UNAUTHORIZED, None, body);
        let logged = redact_secrets_in_text(&err.to_string());
        assert!(!logged.contains("sk-live-deadbeef1234"));
        assert!(logged.contains("***REDACTED***"));
    }
}
