use crate::error::ConfigurationError;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::collections::HashMap;

/// Secure string that clears memory on drop.
#[derive(Clone)]
pub struct SecureString {
    data: Vec<u8>,
}

impl SecureString {
    pub fn new(s: String) -> Self {
        Self {
            data: s.into_bytes(),
        }
    }

    pub fn as_str(&self) -> Result<&str, ConfigurationError> {
        std::str::from_utf8(&self.data).map_err(|e| ConfigurationError::Secret {
            reason: format!("secret value is not valid UTF-8: {e}"),
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for SecureString {
    fn drop(&mut self) {
        for byte in &mut self.data {
            *byte = 0;
        }
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureString([REDACTED] {} bytes)", self.len())
    }
}

impl std::fmt::Display for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Authentication scheme a provider adapter needs from its secrets.
#[derive(Debug, Clone)]
pub enum AuthType {
    Bearer,
    ApiKeyHeader(String),
}

/// Per-provider credentials resolved from a secrets source (§6.4).
#[derive(Debug, Clone, Default)]
pub struct ProviderSecrets {
    pub api_key: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub extra: HashMap<String, String>,
}

/// Anything the registry/providers can ask for provider credentials.
/// `modelmux-providers` adapters are constructed with a resolved `AuthManager`,
/// never with the raw secrets source.
pub trait ProviderSecretsSource: Send + Sync {
    fn get(&self, provider: &str) -> Result<ProviderSecrets, ConfigurationError>;
}

/// In-memory secrets source reading from process environment variables,
/// named `MODELMUX_<PROVIDER>_API_KEY` / `_REGION` / `_ENDPOINT`.
#[derive(Debug, Default)]
pub struct EnvSecretsSource;

impl ProviderSecretsSource for EnvSecretsSource {
    fn get(&self, provider: &str) -> Result<ProviderSecrets, ConfigurationError> {
        let upper = provider.to_uppercase();
        let api_key = std::env::var(format!("MODELMUX_{upper}_API_KEY")).ok();
        let region = std::env::var(format!("MODELMUX_{upper}_REGION")).ok();
        let endpoint = std::env::var(format!("MODELMUX_{upper}_ENDPOINT")).ok();
        Ok(ProviderSecrets {
            api_key,
            region,
            endpoint,
            extra: HashMap::new(),
        })
    }
}

/// Secure authentication manager: wraps one resolved credential and knows how
/// to stamp it onto outbound requests.
pub struct AuthManager {
    auth_type: AuthType,
    token: SecureString,
}

impl AuthManager {
    pub fn new(auth_type: AuthType, token: String) -> Result<Self, ConfigurationError> {
        Self::validate_token(&token)?;
        Ok(Self {
            auth_type,
            token: SecureString::new(token),
        })
    }

    /// Resolve from a `ProviderSecrets` record, given the scheme the provider expects.
    pub fn from_secrets(
        secrets: &ProviderSecrets,
        auth_type: AuthType,
    ) -> Result<Self, ConfigurationError> {
        let token = secrets
            .api_key
            .clone()
            .ok_or_else(|| ConfigurationError::Secret {
                reason: "no api_key present in provider secrets".into(),
            })?;
        Self::new(auth_type, token)
    }

    fn validate_token(token: &str) -> Result<(), ConfigurationError> {
        if token.is_empty() {
            return Err(ConfigurationError::Secret {
                reason: "authentication token cannot be empty".into(),
            });
        }
        if token.contains(' ') || token.contains('\n') || token.contains('\r') {
            return Err(ConfigurationError::Secret {
                reason: "authentication token contains invalid characters".into(),
            });
        }
        if token.starts_with("test") || token.starts_with("demo") || token == "placeholder" {
            warn!("auth.token.suspicious reason=looks_like_a_test_token");
        }
        Ok(())
    }

    /// Add authentication headers to an outbound request.
    pub fn add_auth_headers(&self, headers: &mut HeaderMap) -> Result<(), ConfigurationError> {
        let invalid = |e: reqwest::header::InvalidHeaderValue| ConfigurationError::Secret {
            reason: format!("credential does not form a valid header value: {e}"),
        };
        match &self.auth_type {
            AuthType::Bearer => {
                let value = format!("Bearer {}", self.token.as_str()?);
                headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).map_err(invalid)?);
            }
            AuthType::ApiKeyHeader(name) => {
                let value = HeaderValue::from_str(self.token.as_str()?).map_err(invalid)?;
                let header_name =
                    reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                        ConfigurationError::Secret {
                            reason: format!("invalid header name {name}: {e}"),
                        }
                    })?;
                headers.insert(header_name, value);
            }
        }
        debug!("auth.headers.added scheme={:?}", std::mem::discriminant(&self.auth_type));
        Ok(())
    }

    pub fn auth_type_name(&self) -> &'static str {
        match self.auth_type {
            AuthType::Bearer => "bearer",
            AuthType::ApiKeyHeader(_) => "api_key_header",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_round_trips_into_header() {
        let auth = AuthManager::new(AuthType::Bearer, "sk-test-0123456789".into()).unwrap();
        let mut headers = HeaderMap::new();
        auth.add_auth_headers(&mut headers).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-test-0123456789");
    }

    #[test]
    fn api_key_header_uses_custom_name() {
        let auth =
            AuthManager::new(AuthType::ApiKeyHeader("x-api-key".into()), "key-abc".into()).unwrap();
        let mut headers = HeaderMap::new();
        auth.add_auth_headers(&mut headers).unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "key-abc");
    }

    #[test]
    fn empty_token_rejected() {
        assert!(AuthManager::new(AuthType::Bearer, String::new()).is_err());
    }

    #[test]
    fn env_secrets_source_reads_prefixed_vars() {
        std::env::set_var("MODELMUX_OPENAI_API_KEY", "sk-env-key");
        let secrets = EnvSecretsSource.get("openai").unwrap();
        assert_eq!(secrets.api_key.as_deref(), Some("sk-env-key"));
        std::env::remove_var("MODELMUX_OPENAI_API_KEY");
    }

    #[test]
    fn from_secrets_requires_api_key() {
        let secrets = ProviderSecrets::default();
        assert!(AuthManager::from_secrets(&secrets, AuthType::Bearer).is_err());
    }
}
