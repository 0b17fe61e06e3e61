//! The Client Pool (§4.6): one logical pool per provider, bounding in-flight
//! calls with a semaphore and tearing a client down after it has failed too
//! many times in a rolling window. Adapted from the teacher's `PooledClient`
//! failure-threshold bookkeeping, but built around `tokio::sync::Semaphore`
//! rather than a `Vec<PooledClient>` freelist since the unit of pooling here
//! is "permission to call a provider concurrently", not a reusable `Client`
//! value — `reqwest::Client` is already internally pooled.

use crate::client_for;
use modelmux_core::auth::ProviderSecretsSource;
use modelmux_core::error::OrchestrationError;
use modelmux_core::traits::{HealthStatus, ProviderClient};
use modelmux_core::types::Provider;
use moka::future::Cache as MokaCache;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};

/// Tuning knobs for the pool, mirrored from `Settings` (§6.5).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub default_concurrency: usize,
    pub per_provider_concurrency: HashMap<String, usize>,
    pub failure_threshold: u32,
    pub failure_window: Duration,
    pub health_ttl: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_concurrency: 8,
            per_provider_concurrency: HashMap::new(),
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            health_ttl: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    fn concurrency_for(&self, provider: Provider) -> usize {
        self.per_provider_concurrency
            .get(provider.as_tag())
            .copied()
            .unwrap_or(self.default_concurrency)
    }
}

struct Slot {
    semaphore: Arc<Semaphore>,
    client: RwLock<Arc<dyn ProviderClient>>,
    base_url: Option<String>,
    recent_failures: Mutex<VecDeque<Instant>>,
}

/// Owns one `Slot` per provider, created lazily on first `acquire`.
pub struct ClientPool {
    config: PoolConfig,
    secrets: Arc<dyn ProviderSecretsSource>,
    base_urls: HashMap<Provider, String>,
    slots: RwLock<HashMap<Provider, Arc<Slot>>>,
    health_cache: MokaCache<Provider, HealthStatus>,
}

/// A leased pool slot. Dropping it releases the concurrency permit.
pub struct PoolLease {
    pub client: Arc<dyn ProviderClient>,
    _permit: OwnedSemaphorePermit,
}

impl ClientPool {
    pub fn new(
        config: PoolConfig,
        secrets: Arc<dyn ProviderSecretsSource>,
        base_urls: HashMap<Provider, String>,
    ) -> Self {
        let health_cache = MokaCache::builder()
            .time_to_live(config.health_ttl)
            .max_capacity(64)
            .build();
        Self {
            config,
            secrets,
            base_urls,
            slots: RwLock::new(HashMap::new()),
            health_cache,
        }
    }

    async fn slot_for(&self, provider: Provider) -> Result<Arc<Slot>, OrchestrationError> {
        if let Some(slot) = self.slots.read().await.get(&provider) {
            return Ok(slot.clone());
        }
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get(&provider) {
            return Ok(slot.clone());
        }
        let base_url = self.base_urls.get(&provider).cloned();
        let client = client_for(provider, base_url.as_deref(), self.secrets.as_ref())?;
        let slot = Arc::new(Slot {
            semaphore: Arc::new(Semaphore::new(self.config.concurrency_for(provider))),
            client: RwLock::new(client),
            base_url,
            recent_failures: Mutex::new(VecDeque::new()),
        });
        slots.insert(provider, slot.clone());
        Ok(slot)
    }

    /// Acquire a concurrency permit and the current client for `provider`,
    /// blocking until a slot frees up or `deadline` elapses.
    pub async fn acquire(
        &self,
        provider: Provider,
        deadline: Option<Instant>,
    ) -> Result<PoolLease, OrchestrationError> {
        let slot = self.slot_for(provider).await?;
        let permit_fut = slot.semaphore.clone().acquire_owned();
        let permit = match deadline {
            Some(when) => {
                let remaining = when.saturating_duration_since(Instant::now());
                tokio::time::timeout(remaining, permit_fut)
                    .await
                    .map_err(|_| OrchestrationError::Timeout {
                        model_id: provider.as_tag().to_string(),
                        elapsed_ms: remaining.as_millis() as u64,
                    })?
            }
            None => permit_fut.await,
        }
        .expect("semaphore is never closed");

        let client = slot.client.read().await.clone();
        Ok(PoolLease { client, _permit: permit })
    }

    /// Record an attempt outcome so the pool can tear down and recreate a
    /// client that has failed `failure_threshold` times within the window.
    pub async fn record_outcome(&self, provider: Provider, succeeded: bool) -> Result<(), OrchestrationError> {
        let slot = self.slot_for(provider).await?;
        let mut failures = slot.recent_failures.lock().await;
        let now = Instant::now();
        while let Some(oldest) = failures.front() {
            if now.duration_since(*oldest) > self.config.failure_window {
                failures.pop_front();
            } else {
                break;
            }
        }
        if succeeded {
            return Ok(());
        }
        failures.push_back(now);
        if failures.len() as u32 >= self.config.failure_threshold {
            failures.clear();
            drop(failures);
            let fresh = client_for(provider, slot.base_url.as_deref(), self.secrets.as_ref())?;
            *slot.client.write().await = fresh;
            log::warn!(
                "pool.client.recreated provider={} threshold={}",
                provider.as_tag(),
                self.config.failure_threshold
            );
        }
        Ok(())
    }

    /// Cheap liveness probe for `provider`, cached up to `health_ttl` (§4.1,
    /// §6.3 `health()`). A cache hit never touches the adapter.
    pub async fn health(&self, provider: Provider) -> Result<HealthStatus, OrchestrationError> {
        if let Some(status) = self.health_cache.get(&provider).await {
            return Ok(status);
        }
        let slot = self.slot_for(provider).await?;
        let client = slot.client.read().await.clone();
        let status = client.health().await;
        if !status.available {
            log::warn!(
                "pool.health.unavailable provider={} reason={}",
                provider.as_tag(),
                status.reason.as_deref().unwrap_or("unknown")
            );
        }
        self.health_cache.insert(provider, status.clone()).await;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelmux_core::auth::ProviderSecrets;

    struct TestSecrets;
    impl ProviderSecretsSource for TestSecrets {
        fn get(&self, _provider: &str) -> Result<ProviderSecrets, modelmux_core::error::ConfigurationError> {
            Ok(ProviderSecrets::default())
        }
    }

    fn local_pool() -> ClientPool {
        ClientPool::new(PoolConfig::default(), Arc::new(TestSecrets), HashMap::new())
    }

    #[tokio::test]
    async fn acquire_returns_a_usable_client() {
        let pool = local_pool();
        let lease = pool.acquire(Provider::Local, None).await.unwrap();
        assert_eq!(lease.client.provider_tag(), "local");
    }

    #[tokio::test]
    async fn per_provider_concurrency_limits_concurrent_leases() {
        let mut config = PoolConfig::default();
        config.per_provider_concurrency.insert("local".into(), 1);
        let pool = ClientPool::new(config, Arc::new(TestSecrets), HashMap::new());

        let first = pool.acquire(Provider::Local, None).await.unwrap();
        let soon = Instant::now() + Duration::from_millis(50);
        let second = pool.acquire(Provider::Local, Some(soon)).await;
        assert!(matches!(second, Err(OrchestrationError::Timeout { .. })));
        drop(first);
    }

    #[tokio::test]
    async fn failure_threshold_recreates_the_client() {
        let mut config = PoolConfig::default();
        config.failure_threshold = 2;
        let pool = ClientPool::new(config, Arc::new(TestSecrets), HashMap::new());

        pool.acquire(Provider::Local, None).await.unwrap();
        pool.record_outcome(Provider::Local, false).await.unwrap();
        pool.record_outcome(Provider::Local, false).await.unwrap();

        let slot = pool.slot_for(Provider::Local).await.unwrap();
        assert!(slot.recent_failures.lock().await.is_empty());
    }

    #[tokio::test]
    async fn health_is_cached_across_calls() {
        let pool = local_pool();
        let first = pool.health(Provider::Local).await.unwrap();
        let second = pool.health(Provider::Local).await.unwrap();
        assert_eq!(first.available, second.available);
        assert!(first.available);
    }
}
