//! Core protocol types: the handshake record, the per-request header, and
//! the wire constants shared by servers, clients, the registry and
//! discovery.

pub mod error;
pub mod header;
pub mod options;

pub use error::{Result, RpcError};
pub use header::{Body, Header, INVALID_BODY};
pub use options::{ConnectOptions, MAGIC_NUMBER};

/// Default path on which an HTTP-bridged server tunnels the RPC protocol.
pub const DEFAULT_RPC_PATH: &str = "/_beaconrpc_";

/// Default path serving the service/method introspection listing.
pub const DEFAULT_DEBUG_PATH: &str = "/debug/beaconrpc";

/// Default path on which a registry serves heartbeats and alive listings.
pub const DEFAULT_REGISTRY_PATH: &str = "/_beaconrpc_/registry";

/// Response header carrying the comma-joined alive address set.
pub const SERVERS_HEADER: &str = "x-beaconrpc-servers";

/// Request header carrying the announcing server's address on a heartbeat.
pub const SERVER_HEADER: &str = "x-beaconrpc-server";
