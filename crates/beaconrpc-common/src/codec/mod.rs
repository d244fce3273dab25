//! Codec module - header+body framing over a byte stream.
//!
//! A codec wraps one direction of a connection and frames [`Header`] and
//! [`Body`] values on it. Concrete codecs are selected by tag through a
//! [`CodecRegistry`] passed to the server or client at construction, so
//! there is no process-wide mutable table.
//!
//! Currently MessagePack is the only implemented codec; the enum dispatch
//! allows for future extensibility, and the `application/json` tag is
//! reserved but unimplemented — selecting it fails at open with a setup
//! error rather than at some later frame.
//!
//! # Example
//!
//! ```
//! use beaconrpc_common::codec::{CodecRegistry, MSGPACK_CODEC};
//!
//! let registry = CodecRegistry::new();
//! assert!(registry.resolve(MSGPACK_CODEC).is_some());
//! assert!(registry.resolve("application/cbor").is_none());
//! ```

mod msgpack;

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::protocol::error::{Result, RpcError};
use crate::protocol::{Body, Header};

pub use msgpack::{MessagePackReader, MessagePackWriter};

/// Tag selecting the MessagePack codec (implemented).
pub const MSGPACK_CODEC: &str = "application/msgpack";

/// Tag reserved for a JSON codec (not implemented).
pub const JSON_CODEC: &str = "application/json";

/// Kind of codec a tag resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    MessagePack,
    /// Reserved placeholder; opening it is a setup error.
    Json,
}

impl CodecKind {
    /// Builds the read and write halves of a codec over the given stream
    /// halves.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error for reserved-but-unimplemented kinds.
    pub fn open<R, W>(self, reader: R, writer: W) -> Result<(CodecReader<R>, CodecWriter<W>)>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        match self {
            CodecKind::MessagePack => Ok((
                CodecReader::MessagePack(MessagePackReader::new(reader)),
                CodecWriter::MessagePack(MessagePackWriter::new(writer)),
            )),
            CodecKind::Json => Err(RpcError::Protocol(
                "json codec is reserved but not implemented".to_string(),
            )),
        }
    }
}

/// Explicit tag → codec mapping, injected wherever a codec is negotiated.
///
/// The default mapping carries the MessagePack codec and the reserved JSON
/// placeholder. Resolving a tag that was never registered is a distinct
/// setup error from selecting the reserved placeholder.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    tags: HashMap<String, CodecKind>,
}

impl CodecRegistry {
    /// Creates the default mapping.
    pub fn new() -> Self {
        let mut registry = CodecRegistry {
            tags: HashMap::new(),
        };
        registry.register(MSGPACK_CODEC, CodecKind::MessagePack);
        registry.register(JSON_CODEC, CodecKind::Json);
        registry
    }

    /// Adds or replaces a tag mapping.
    pub fn register(&mut self, tag: impl Into<String>, kind: CodecKind) {
        self.tags.insert(tag.into(), kind);
    }

    /// Looks a tag up, `None` when it was never registered.
    pub fn resolve(&self, tag: &str) -> Option<CodecKind> {
        self.tags.get(tag).copied()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read half of a negotiated codec.
pub enum CodecReader<R> {
    MessagePack(MessagePackReader<R>),
}

impl<R> std::fmt::Debug for CodecReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecReader::MessagePack(_) => f.write_str("CodecReader::MessagePack"),
        }
    }
}

impl<R: AsyncRead + Unpin> CodecReader<R> {
    /// Reads and decodes the next frame's header.
    ///
    /// Any failure here is connection-fatal: a clean end-of-stream maps to
    /// [`RpcError::Closed`], everything else to [`RpcError::Framing`].
    pub async fn read_header(&mut self) -> Result<Header> {
        match self {
            CodecReader::MessagePack(reader) => reader.read_header().await,
        }
    }

    /// Reads and decodes the next frame's body into the uniform value.
    ///
    /// A decode failure ([`RpcError::Decode`]) consumes the frame and is
    /// recoverable; IO-level failures are connection-fatal.
    pub async fn read_body(&mut self) -> Result<Body> {
        match self {
            CodecReader::MessagePack(reader) => reader.read_body().await,
        }
    }
}

/// Write half of a negotiated codec.
pub enum CodecWriter<W> {
    MessagePack(MessagePackWriter<W>),
}

impl<W> std::fmt::Debug for CodecWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecWriter::MessagePack(_) => f.write_str("CodecWriter::MessagePack"),
        }
    }
}

impl<W: AsyncWrite + Unpin> CodecWriter<W> {
    /// Serializes header then body as one flushed unit.
    ///
    /// On an unrecoverable write failure the codec closes itself; later
    /// writes fail with [`RpcError::Closed`].
    pub async fn write(&mut self, header: &Header, body: &Body) -> Result<()> {
        match self {
            CodecWriter::MessagePack(writer) => writer.write(header, body).await,
        }
    }

    /// Releases the underlying stream. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        match self {
            CodecWriter::MessagePack(writer) => writer.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_tags() {
        let registry = CodecRegistry::new();
        assert_eq!(registry.resolve(MSGPACK_CODEC), Some(CodecKind::MessagePack));
        assert_eq!(registry.resolve(JSON_CODEC), Some(CodecKind::Json));
        assert_eq!(registry.resolve("application/gob"), None);
    }

    #[test]
    fn test_custom_tag_registration() {
        let mut registry = CodecRegistry::new();
        registry.register("application/x-msgpack", CodecKind::MessagePack);
        assert_eq!(
            registry.resolve("application/x-msgpack"),
            Some(CodecKind::MessagePack)
        );
    }

    #[tokio::test]
    async fn test_reserved_json_codec_fails_at_open() {
        let (stream, _other) = tokio::io::duplex(64);
        let (read_half, write_half) = tokio::io::split(stream);
        let err = CodecKind::Json.open(read_half, write_half).unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }
}
