// Registry-backed discovery against a real registry server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use beaconrpc_common::protocol::DEFAULT_REGISTRY_PATH;
use beaconrpc_common::RpcError;
use beaconrpc_discovery::{Discovery, RegistryDiscovery, SelectMode};
use beaconrpc_registry::Registry;

async fn start_registry(ttl: Duration) -> (SocketAddr, Arc<Registry>) {
    let registry = Arc::new(Registry::new(ttl));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let serving = Arc::clone(&registry);
    tokio::spawn(async move {
        let _ = serving.serve(listener).await;
    });

    (addr, registry)
}

fn registry_url(addr: SocketAddr) -> String {
    format!("http://{}{}", addr, DEFAULT_REGISTRY_PATH)
}

#[tokio::test]
async fn test_get_all_pulls_alive_set() {
    let (addr, registry) = start_registry(Duration::from_secs(60)).await;
    registry.record("s2:2").await;
    registry.record("s1:1").await;

    let discovery = RegistryDiscovery::new(registry_url(addr), None);
    let all = discovery.get_all().await.unwrap();
    assert_eq!(all, vec!["s1:1", "s2:2"]);
}

#[tokio::test]
async fn test_get_selects_from_pulled_set() {
    let (addr, registry) = start_registry(Duration::from_secs(60)).await;
    registry.record("only:1").await;

    let discovery = RegistryDiscovery::new(registry_url(addr), None);
    let picked = discovery.get(SelectMode::RoundRobin).await.unwrap();
    assert_eq!(picked, "only:1");
}

#[tokio::test]
async fn test_empty_registry_yields_no_available_servers() {
    let (addr, _registry) = start_registry(Duration::from_secs(60)).await;

    let discovery = RegistryDiscovery::new(registry_url(addr), None);
    let err = discovery.get(SelectMode::Random).await.unwrap_err();
    assert!(matches!(err, RpcError::NoAvailableServers));
}

#[tokio::test]
async fn test_zero_ttl_always_repulls() {
    let (addr, registry) = start_registry(Duration::from_secs(60)).await;
    registry.record("old:1").await;

    let discovery = RegistryDiscovery::new(registry_url(addr), Some(Duration::ZERO));
    assert_eq!(discovery.get_all().await.unwrap(), vec!["old:1"]);

    // membership changes are visible on the very next call
    registry.record("new:2").await;
    assert_eq!(discovery.get_all().await.unwrap(), vec!["new:2", "old:1"]);
}

#[tokio::test]
async fn test_fresh_cache_skips_the_pull() {
    let (addr, registry) = start_registry(Duration::from_secs(60)).await;
    registry.record("cached:1").await;

    let discovery = RegistryDiscovery::new(registry_url(addr), Some(Duration::from_secs(60)));
    assert_eq!(discovery.get_all().await.unwrap(), vec!["cached:1"]);

    // within the refresh ttl the new entry is not seen yet
    registry.record("unseen:2").await;
    assert_eq!(discovery.get_all().await.unwrap(), vec!["cached:1"]);
}

#[tokio::test]
async fn test_refresh_failure_is_not_silent() {
    // dead registry with an always-stale cache: the failure must surface
    // instead of the previously updated set
    let dead = RegistryDiscovery::new("http://127.0.0.1:1/registry", Some(Duration::ZERO));
    dead.update(vec!["s:1".to_string()]).await.unwrap();
    let err = dead.get(SelectMode::Random).await.unwrap_err();
    assert!(matches!(err, RpcError::Registry(_)));
}
