//! Discovery-backed convenience client.
//!
//! Picks a target address through a [`Discovery`] selection policy and
//! performs each call on a fresh connection, so concurrent calls stay
//! independent of each other's connection state.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use beaconrpc_common::{ConnectOptions, Result};
use beaconrpc_discovery::{Discovery, SelectMode};

use crate::client::Client;

/// Client that load-balances calls across discovered servers.
pub struct BalancedClient<D: Discovery> {
    discovery: D,
    mode: SelectMode,
    options: ConnectOptions,
}

impl<D: Discovery> BalancedClient<D> {
    pub fn new(discovery: D, mode: SelectMode, options: ConnectOptions) -> Self {
        Self {
            discovery,
            mode,
            options,
        }
    }

    /// The discovery backing this client.
    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    /// Picks a server and invokes `Service.Method` on it.
    pub async fn call<Args, Reply>(&self, service_method: &str, args: &Args) -> Result<Reply>
    where
        Args: Serialize + ?Sized,
        Reply: DeserializeOwned,
    {
        let addr = self.discovery.get(self.mode).await?;
        debug!(%addr, service_method, "balanced call");

        let client = Client::connect(&addr, self.options.clone()).await?;
        let result = client.call(service_method, args).await;
        let _ = client.close().await;
        result
    }
}
