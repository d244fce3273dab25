//! Heartbeat sender used by a registered server.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use beaconrpc_common::protocol::SERVER_HEADER;
use beaconrpc_common::{Result, RpcError};

use crate::registry::DEFAULT_TTL;

/// Safety margin subtracted from the TTL for the default send period, so
/// one missed beat still lands inside the expiry window.
const HEARTBEAT_MARGIN: Duration = Duration::from_secs(60);

/// Starts announcing `addr` to the registry: once immediately, then on a
/// fixed period forever.
///
/// The default period is the registry's default TTL minus the safety
/// margin. A failed send is logged and ticking continues — the margin
/// already tolerates one missed beat.
pub fn start_heartbeat(
    registry_url: impl Into<String>,
    addr: impl Into<String>,
    period: Option<Duration>,
) -> JoinHandle<()> {
    let registry_url = registry_url.into();
    let addr = addr.into();
    let period = period.unwrap_or(DEFAULT_TTL - HEARTBEAT_MARGIN);

    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let mut ticker = tokio::time::interval(period);
        loop {
            // first tick completes immediately
            ticker.tick().await;
            if let Err(e) = send_heartbeat(&client, &registry_url, &addr).await {
                warn!(%addr, registry = %registry_url, error = %e, "heartbeat send failed");
            }
        }
    })
}

/// Posts one heartbeat for `addr` to the registry.
pub async fn send_heartbeat(
    client: &reqwest::Client,
    registry_url: &str,
    addr: &str,
) -> Result<()> {
    debug!(%addr, registry = %registry_url, "sending heartbeat");
    let response = client
        .post(registry_url)
        .header(SERVER_HEADER, addr)
        .send()
        .await
        .map_err(|e| RpcError::Registry(e.to_string()))?;
    if !response.status().is_success() {
        return Err(RpcError::Registry(format!(
            "heartbeat rejected: {}",
            response.status()
        )));
    }
    Ok(())
}
