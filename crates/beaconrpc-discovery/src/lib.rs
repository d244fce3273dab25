//! Beaconrpc Discovery
//!
//! Abstraction for obtaining one or all known server addresses under a
//! selection policy, with two implementations:
//!
//! - [`MultiServerDiscovery`] - a statically managed address set
//! - [`RegistryDiscovery`] - pulls the alive set from a heartbeat
//!   registry, cached with its own TTL
//!
//! # Example
//!
//! ```
//! use beaconrpc_discovery::{Discovery, MultiServerDiscovery, SelectMode};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let discovery = MultiServerDiscovery::new(vec![
//!     "127.0.0.1:9001".to_string(),
//!     "127.0.0.1:9002".to_string(),
//! ]);
//! let addr = discovery.get(SelectMode::RoundRobin).await?;
//! assert!(addr.starts_with("127.0.0.1"));
//! # Ok(())
//! # }
//! ```

mod multi;
mod registry;

use async_trait::async_trait;

use beaconrpc_common::Result;

pub use multi::MultiServerDiscovery;
pub use registry::{RegistryDiscovery, DEFAULT_REFRESH_TTL};

/// How [`Discovery::get`] picks among the known addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    /// Uniform choice from a private pseudo-random source
    Random,
    /// Cursor advancing by exactly one per successful get
    RoundRobin,
}

/// A set of known server addresses with selection policies.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Re-pulls the address set from upstream, if there is one.
    async fn refresh(&self) -> Result<()>;

    /// Atomically replaces the address set.
    async fn update(&self, servers: Vec<String>) -> Result<()>;

    /// Picks one address under the given mode.
    async fn get(&self, mode: SelectMode) -> Result<String>;

    /// Returns a copy of the address set.
    async fn get_all(&self) -> Result<Vec<String>>;
}
