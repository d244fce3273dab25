//! The membership directory and its HTTP surface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use beaconrpc_common::protocol::{DEFAULT_REGISTRY_PATH, SERVERS_HEADER, SERVER_HEADER};
use beaconrpc_common::{Result, RpcError};

/// Entries unrenewed for this long are considered dead (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct ServerItem {
    last_heartbeat: Instant,
}

/// Heartbeat-driven directory of live server addresses.
///
/// `record` upserts an address's last-heartbeat time; `alive` returns the
/// sorted surviving set and deletes expired entries as a side effect. A
/// TTL of zero means entries never expire.
pub struct Registry {
    ttl: Duration,
    servers: Mutex<HashMap<String, ServerItem>>,
}

impl Registry {
    pub fn new(ttl: Duration) -> Self {
        Registry {
            ttl,
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// Upserts the address with last-heartbeat = now.
    pub async fn record(&self, addr: impl Into<String>) {
        let addr = addr.into();
        debug!(%addr, "heartbeat recorded");
        let mut servers = self.servers.lock().await;
        servers.insert(
            addr,
            ServerItem {
                last_heartbeat: Instant::now(),
            },
        );
    }

    /// Returns the sorted alive set, deleting expired entries on the way.
    pub async fn alive(&self) -> Vec<String> {
        let mut servers = self.servers.lock().await;
        let now = Instant::now();
        let mut alive = Vec::with_capacity(servers.len());
        servers.retain(|addr, item| {
            if self.ttl.is_zero() || now.duration_since(item.last_heartbeat) <= self.ttl {
                alive.push(addr.clone());
                true
            } else {
                false
            }
        });
        alive.sort();
        alive
    }

    /// Router exposing the registry protocol on its fixed path.
    ///
    /// GET returns the alive set comma-joined in one response header; POST
    /// records the address carried in one request header (missing or empty
    /// ⇒ 500); any other verb gets axum's 405.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route(
                DEFAULT_REGISTRY_PATH,
                get(list_alive).post(record_heartbeat),
            )
            .with_state(self)
    }

    /// Serves the registry protocol until an accept-level failure.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, path = DEFAULT_REGISTRY_PATH, "registry listening");
        }
        axum::serve(listener, self.router())
            .await
            .map_err(|e| RpcError::Connection(format!("registry server error: {}", e)))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

async fn list_alive(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let joined = registry.alive().await.join(",");
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&joined) {
        Ok(value) => {
            headers.insert(SERVERS_HEADER, value);
            (StatusCode::OK, headers)
        }
        Err(e) => {
            warn!(error = %e, "alive set not representable as a header value");
            (StatusCode::INTERNAL_SERVER_ERROR, headers)
        }
    }
}

async fn record_heartbeat(
    State(registry): State<Arc<Registry>>,
    headers: HeaderMap,
) -> StatusCode {
    let addr = headers
        .get(SERVER_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|addr| !addr.is_empty());
    match addr {
        Some(addr) => {
            registry.record(addr).await;
            StatusCode::OK
        }
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
