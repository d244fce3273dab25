//! MessagePack codec using `rmp-serde`.
//!
//! Each frame is a header segment followed by a body segment, both as
//! `[4-byte length as u32 big-endian] + [MessagePack data]`. Structs are
//! encoded with `to_vec_named` (map format), so the body round-trips
//! through the self-describing uniform value.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::protocol::error::{Result, RpcError};
use crate::protocol::{Body, Header};

/// Maximum size of one segment (16 MB), guards allocation from a corrupt
/// or hostile length prefix.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Read half of the MessagePack codec.
pub struct MessagePackReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> MessagePackReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads one length-prefixed segment.
    async fn read_segment(&mut self) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        if let Err(e) = self.reader.read_exact(&mut len_buf).await {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => RpcError::Closed,
                _ => RpcError::Io(e),
            });
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(RpcError::Framing(format!(
                "frame too large: {} bytes (max {} bytes)",
                len, MAX_FRAME_SIZE
            )));
        }

        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                RpcError::Framing("stream ended mid-frame".to_string())
            }
            _ => RpcError::Io(e),
        })?;

        Ok(buf)
    }

    /// Reads and decodes a header segment.
    ///
    /// A malformed header is a framing error: the stream offers no way to
    /// resynchronize past it.
    pub async fn read_header(&mut self) -> Result<Header> {
        let segment = self.read_segment().await?;
        rmp_serde::from_slice(&segment)
            .map_err(|e| RpcError::Framing(format!("malformed header: {}", e)))
    }

    /// Reads a body segment and decodes it into the uniform value.
    ///
    /// The segment's bytes are fully consumed before decoding, so a decode
    /// failure leaves the stream aligned on the next frame.
    pub async fn read_body(&mut self) -> Result<Body> {
        let segment = self.read_segment().await?;
        Ok(rmp_serde::from_slice(&segment)?)
    }
}

/// Write half of the MessagePack codec.
pub struct MessagePackWriter<W> {
    writer: W,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> MessagePackWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            closed: false,
        }
    }

    /// Serializes header then body as one flushed unit.
    ///
    /// Both segments are encoded in memory before any byte is written, so
    /// an encoding failure never leaves a partial frame on the wire. On a
    /// write failure the codec closes itself; the stream state is unknown
    /// past a short write.
    pub async fn write(&mut self, header: &Header, body: &Body) -> Result<()> {
        if self.closed {
            return Err(RpcError::Closed);
        }

        let header_bytes = rmp_serde::to_vec_named(header)?;
        let body_bytes = rmp_serde::to_vec_named(body)?;

        let mut frame = Vec::with_capacity(8 + header_bytes.len() + body_bytes.len());
        frame.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
        frame.extend_from_slice(&header_bytes);
        frame.extend_from_slice(&(body_bytes.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body_bytes);

        if let Err(e) = self.write_all_flush(&frame).await {
            warn!(error = %e, "frame write failed, closing codec");
            let _ = self.close().await;
            return Err(RpcError::Io(e));
        }
        Ok(())
    }

    async fn write_all_flush(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await
    }

    /// Shuts the write side down. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.writer.shutdown().await;
        Ok(())
    }
}
