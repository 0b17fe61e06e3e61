//! Provider adapters for the model-orchestration core.
//!
//! Every provider in this crate implements `modelmux_core::traits::ProviderClient`
//! against the same HTTP plumbing in `shared`, so the orchestrator never has
//! to special-case a wire format. `client_for` resolves a registry model's
//! provider tag to a live adapter instance.

pub mod anthropic;
pub mod connection_pool;
pub mod google_gemini;
pub mod local;
pub mod openai;
pub mod shared;

use modelmux_core::auth::{AuthManager, AuthType, ProviderSecretsSource};
use modelmux_core::error::OrchestrationError;
use modelmux_core::traits::ProviderClient;
use modelmux_core::types::Provider;
use std::sync::Arc;

/// Build a live client for a registry model's provider tag.
///
/// `base_url` is taken from the model's manifest entry so self-hosted or
/// region-pinned endpoints can override the provider default without code
/// changes; adapters fall back to their public endpoint when absent.
pub fn client_for(
    provider: Provider,
    base_url: Option<&str>,
    secrets: &dyn ProviderSecretsSource,
) -> Result<Arc<dyn ProviderClient>, OrchestrationError> {
    let tag = provider.as_tag();
    match provider {
        Provider::Local => Ok(Arc::new(local::LocalClient::new())),
        Provider::Openai => {
            let secret = secrets.get(tag)?;
            let auth = AuthManager::from_secrets(&secret, AuthType::Bearer)?;
            let client = openai::OpenAiClient::new(
                base_url.unwrap_or(openai::DEFAULT_BASE_URL),
                &auth,
            )?;
            Ok(Arc::new(client))
        }
        Provider::Anthropic => {
            let secret = secrets.get(tag)?;
            let auth = AuthManager::from_secrets(&secret, AuthType::ApiKeyHeader("x-api-key".into()))?;
            let client = anthropic::AnthropicClient::new(
                base_url.unwrap_or(anthropic::DEFAULT_BASE_URL),
                &auth,
            )?;
            Ok(Arc::new(client))
        }
        Provider::Google => {
            let secret = secrets.get(tag)?;
            let auth = AuthManager::from_secrets(&secret, AuthType::ApiKeyHeader("x-goog-api-key".into()))?;
            let client = google_gemini::GeminiClient::new(
                base_url.unwrap_or(google_gemini::DEFAULT_BASE_URL),
                &auth,
            )?;
            Ok(Arc::new(client))
        }
        other => Err(OrchestrationError::FeatureDisabled {
            feature: format!("provider adapter for {}", other.as_tag()),
        }),
    }
}
