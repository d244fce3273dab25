//! Beaconrpc Server
//!
//! This crate provides the serving side of the framework: service
//! descriptors built by explicit registration, the per-connection state
//! machine with concurrent timeout-bounded dispatch, the accept loop, and
//! the HTTP CONNECT bridge.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use beaconrpc_server::{Server, Service};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct AddArgs { a: i64, b: i64 }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let server = Arc::new(Server::new());
//! server
//!     .register(
//!         Service::builder("Arith")
//!             .method("Add", |args: AddArgs| async move { Ok(args.a + args.b) })
//!             .build(),
//!     )
//!     .await?;
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
//! server.serve(listener).await?;
//! # Ok(())
//! # }
//! ```

pub mod http;
pub mod server;
pub mod service;

pub use server::Server;
pub use service::{Method, Service, ServiceBuilder};
