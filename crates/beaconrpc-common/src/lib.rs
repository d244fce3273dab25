//! Beaconrpc Common Types and Wire Codecs
//!
//! This crate provides the protocol definitions and framing codecs shared by
//! every component of the beaconrpc RPC framework.
//!
//! # Overview
//!
//! Beaconrpc exposes method-shaped services over a network connection and
//! lets remote callers invoke them with request/response semantics. This
//! crate contains the pieces both ends of a connection agree on:
//!
//! - **Protocol Layer**: the connection-initial [`ConnectOptions`] record,
//!   the per-request [`Header`], and the shared [`RpcError`] type
//! - **Codec Layer**: pluggable header+body framing over a byte stream,
//!   selected through an injected [`CodecRegistry`]
//!
//! # Wire Protocol
//!
//! A connection starts with one self-delimited JSON line carrying the
//! [`ConnectOptions`] record (magic number, codec tag, timeouts). Every
//! frame after that is a header segment followed by a body segment, each
//! encoded by the negotiated codec as
//! `[4-byte length prefix as u32 big-endian] + [payload]`.
//!
//! # Example
//!
//! ```no_run
//! use beaconrpc_common::protocol::{ConnectOptions, Header};
//!
//! let options = ConnectOptions::new().with_handle_timeout_ms(5000);
//! let header = Header::request("Arith.Add", 1);
//! assert!(!header.is_error());
//! ```

pub mod codec;
pub mod protocol;

pub use protocol::error::{Result, RpcError};
pub use protocol::{Body, ConnectOptions, Header, INVALID_BODY, MAGIC_NUMBER};
