use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::MSGPACK_CODEC;
use crate::protocol::error::{Result, RpcError};

/// Fixed protocol-family identifier. A connection whose handshake carries a
/// different value is aborted before any frame is exchanged.
pub const MAGIC_NUMBER: u32 = 0x2ea7c1;

/// Connection-initial handshake record.
///
/// Sent exactly once, before any framed request, as one self-delimited JSON
/// line. It names the protocol family (magic number), selects the wire
/// codec for everything that follows, and carries the two timeout knobs:
///
/// - `connect_timeout_ms` bounds the caller's dial (0 = no limit)
/// - `handle_timeout_ms` bounds the server-side handling of each request
///   on this connection (0 = wait for completion unconditionally)
///
/// # Example
///
/// ```
/// use beaconrpc_common::protocol::{ConnectOptions, MAGIC_NUMBER};
///
/// let options = ConnectOptions::new().with_handle_timeout_ms(2000);
/// assert_eq!(options.magic_number, MAGIC_NUMBER);
/// assert_eq!(options.handle_timeout(), Some(std::time::Duration::from_secs(2)));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectOptions {
    /// Marks this as a beaconrpc connection
    pub magic_number: u32,
    /// Tag selecting the wire codec, resolved through a `CodecRegistry`
    pub codec: String,
    /// Dial timeout in milliseconds (0 = no limit)
    pub connect_timeout_ms: u64,
    /// Per-request handling timeout in milliseconds (0 = no limit)
    pub handle_timeout_ms: u64,
}

impl ConnectOptions {
    /// Creates options with the default codec, a 10 second connect timeout
    /// and no handling timeout.
    pub fn new() -> Self {
        ConnectOptions {
            magic_number: MAGIC_NUMBER,
            codec: MSGPACK_CODEC.to_string(),
            connect_timeout_ms: 10_000,
            handle_timeout_ms: 0,
        }
    }

    /// Selects a different codec tag.
    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    /// Sets the dial timeout in milliseconds.
    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    /// Sets the per-request handling timeout in milliseconds.
    pub fn with_handle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.handle_timeout_ms = timeout_ms;
        self
    }

    /// Dial timeout as a duration, `None` when unbounded.
    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.connect_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Handling timeout as a duration, `None` when unbounded.
    pub fn handle_timeout(&self) -> Option<Duration> {
        match self.handle_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Writes the record as one JSON line and flushes it.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Reads one JSON line and parses it into an options record.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(RpcError::Closed);
        }
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new()
    }
}
