//! Beaconrpc Registry
//!
//! A heartbeat-driven membership directory. Servers announce themselves
//! with periodic POSTs; consumers pull the alive set with a GET. Expiry is
//! lazy: entries past their TTL are deleted as a side effect of a listing,
//! so no background sweeper outlives the registry.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use beaconrpc_registry::{start_heartbeat, Registry};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(Registry::new(Duration::from_secs(300)));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:9999").await?;
//! tokio::spawn(registry.serve(listener));
//!
//! // a server keeps itself alive in the directory
//! start_heartbeat(
//!     "http://127.0.0.1:9999/_beaconrpc_/registry",
//!     "127.0.0.1:7700",
//!     None,
//! );
//! # Ok(())
//! # }
//! ```

mod heartbeat;
mod registry;

pub use heartbeat::{send_heartbeat, start_heartbeat};
pub use registry::{Registry, DEFAULT_TTL};
