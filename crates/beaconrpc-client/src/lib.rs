//! Beaconrpc Client
//!
//! The calling side of the framework: a multiplexing [`Client`] that
//! issues concurrent calls over one connection correlated by sequence
//! number, and a [`BalancedClient`] that picks a target server through a
//! discovery policy before each call.
//!
//! # Example
//!
//! ```no_run
//! use beaconrpc_client::Client;
//! use beaconrpc_common::ConnectOptions;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect("127.0.0.1:7700", ConnectOptions::new()).await?;
//! let sum: i64 = client.call("Arith.Add", &json!({"a": 1, "b": 2})).await?;
//! assert_eq!(sum, 3);
//! # Ok(())
//! # }
//! ```

mod balanced;
mod client;

pub use balanced::BalancedClient;
pub use client::Client;
