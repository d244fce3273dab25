//! Registry-backed discovery with TTL-bounded cache refresh.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use beaconrpc_common::protocol::SERVERS_HEADER;
use beaconrpc_common::{Result, RpcError};

use crate::multi::MultiServerDiscovery;
use crate::{Discovery, SelectMode};

/// How long a pulled alive set stays fresh before the next get re-pulls.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(10);

/// Discovery that pulls the alive address set from a heartbeat registry.
///
/// The last successful pull is cached for the refresh TTL; `get` and
/// `get_all` transparently re-pull when it is stale and surface a pull
/// failure as their own failure instead of serving stale data. A TTL of
/// zero re-pulls on every call.
pub struct RegistryDiscovery {
    servers: MultiServerDiscovery,
    registry_url: String,
    client: reqwest::Client,
    ttl: Duration,
    last_refresh: Mutex<Option<Instant>>,
}

impl RegistryDiscovery {
    /// Creates a discovery pulling from the registry's listing endpoint.
    ///
    /// `registry_url` is the full URL of the registry path; `ttl` defaults
    /// to [`DEFAULT_REFRESH_TTL`].
    pub fn new(registry_url: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            servers: MultiServerDiscovery::new(Vec::new()),
            registry_url: registry_url.into(),
            client: reqwest::Client::new(),
            ttl: ttl.unwrap_or(DEFAULT_REFRESH_TTL),
            last_refresh: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        debug!(registry = %self.registry_url, "pulling alive server list");
        let response = self
            .client
            .get(&self.registry_url)
            .send()
            .await
            .map_err(|e| RpcError::Registry(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RpcError::Registry(format!(
                "registry listing failed: {}",
                response.status()
            )));
        }
        let raw = response
            .headers()
            .get(SERVERS_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                RpcError::Registry("registry response missing server list header".to_string())
            })?;
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect())
    }
}

#[async_trait]
impl Discovery for RegistryDiscovery {
    /// Re-pulls the alive list when the cache is stale; holding the
    /// refresh lock across the pull keeps concurrent gets from stampeding
    /// the registry.
    async fn refresh(&self) -> Result<()> {
        let mut last = self.last_refresh.lock().await;
        let fresh = !self.ttl.is_zero()
            && last.map_or(false, |at| at.elapsed() < self.ttl);
        if fresh {
            return Ok(());
        }
        let servers = self.fetch().await?;
        self.servers.update(servers).await?;
        *last = Some(Instant::now());
        Ok(())
    }

    /// Manual replacement also resets the cache window.
    async fn update(&self, servers: Vec<String>) -> Result<()> {
        let mut last = self.last_refresh.lock().await;
        self.servers.update(servers).await?;
        *last = Some(Instant::now());
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.refresh().await?;
        self.servers.get(mode).await
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        self.refresh().await?;
        self.servers.get_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refresh_failure_surfaces_from_get() {
        // nothing listens here
        let discovery = RegistryDiscovery::new("http://127.0.0.1:1/registry", None);
        let err = discovery.get(SelectMode::Random).await.unwrap_err();
        assert!(matches!(err, RpcError::Registry(_)));
    }

    #[tokio::test]
    async fn test_manual_update_serves_within_ttl() {
        let discovery = RegistryDiscovery::new(
            "http://127.0.0.1:1/registry",
            Some(Duration::from_secs(60)),
        );
        discovery
            .update(vec!["s1".to_string(), "s2".to_string()])
            .await
            .unwrap();

        // cache is fresh, so no pull is attempted against the dead URL
        let all = discovery.get_all().await.unwrap();
        assert_eq!(all, vec!["s1", "s2"]);
    }
}
