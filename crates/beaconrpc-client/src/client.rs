//! Multiplexing RPC client.
//!
//! One connection carries any number of concurrent calls: each call takes
//! a fresh sequence number from an atomic counter, parks a oneshot slot in
//! the pending map, writes its frame under the writer lock, and awaits its
//! slot. A single receive task routes every response frame to the slot
//! matching its seq.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use beaconrpc_common::codec::{CodecReader, CodecRegistry, CodecWriter};
use beaconrpc_common::{Body, ConnectOptions, Header, Result, RpcError};

type FrameReader = CodecReader<BufReader<ReadHalf<TcpStream>>>;
type FrameWriter = CodecWriter<WriteHalf<TcpStream>>;
type ResponseSlot = oneshot::Sender<Result<(Header, Body)>>;

struct ClientInner {
    seq: AtomicU64,
    pending: Mutex<HashMap<u64, ResponseSlot>>,
    writer: Mutex<FrameWriter>,
    shutdown: AtomicBool,
}

/// RPC client multiplexing calls over one connection.
///
/// Cheap to clone; clones share the connection. Call [`Client::close`]
/// when done — dropping without closing leaves the connection to be
/// reaped when the peer closes its side.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Dials a server and performs the option handshake.
    ///
    /// The dial is bounded by the options' connect timeout (0 = no
    /// limit).
    pub async fn connect(addr: &str, options: ConnectOptions) -> Result<Self> {
        let stream = Self::dial(addr, &options).await?;
        Self::with_stream(stream, options, CodecRegistry::new()).await
    }

    /// Like [`Client::connect`] with an explicit codec mapping.
    pub async fn connect_with_codecs(
        addr: &str,
        options: ConnectOptions,
        codecs: CodecRegistry,
    ) -> Result<Self> {
        let stream = Self::dial(addr, &options).await?;
        Self::with_stream(stream, options, codecs).await
    }

    /// Dials a server through its HTTP bridge: an authority-form CONNECT
    /// handshake, then the ordinary option handshake on the taken-over
    /// transport.
    pub async fn connect_http(addr: &str, options: ConnectOptions) -> Result<Self> {
        let mut stream = Self::dial(addr, &options).await?;

        let request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n", addr, addr);
        stream.write_all(request.as_bytes()).await?;

        // read the response head byte-by-byte so nothing past the blank
        // line is consumed; the framed protocol follows immediately
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            let n = stream.read(&mut byte).await?;
            if n == 0 {
                return Err(RpcError::Connection(
                    "connection closed during CONNECT handshake".to_string(),
                ));
            }
            head.push(byte[0]);
            if head.len() > 4096 {
                return Err(RpcError::Connection(
                    "oversized CONNECT response".to_string(),
                ));
            }
        }
        let head = String::from_utf8_lossy(&head);
        let status_line = head.lines().next().unwrap_or_default();
        if !status_line.contains(" 200") {
            return Err(RpcError::Connection(format!(
                "CONNECT rejected: {}",
                status_line
            )));
        }

        Self::with_stream(stream, options, CodecRegistry::new()).await
    }

    async fn dial(addr: &str, options: &ConnectOptions) -> Result<TcpStream> {
        match options.connect_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| RpcError::Timeout(timeout.as_millis() as u64))?
                .map_err(RpcError::Io),
            None => TcpStream::connect(addr).await.map_err(RpcError::Io),
        }
    }

    async fn with_stream(
        stream: TcpStream,
        options: ConnectOptions,
        codecs: CodecRegistry,
    ) -> Result<Self> {
        let Some(kind) = codecs.resolve(&options.codec) else {
            return Err(RpcError::Protocol(format!(
                "unknown codec tag: {}",
                options.codec
            )));
        };

        let (read_half, mut write_half) = tokio::io::split(stream);
        options.write_to(&mut write_half).await?;
        let reader = BufReader::new(read_half);
        let (frame_reader, frame_writer) = kind.open(reader, write_half)?;

        let inner = Arc::new(ClientInner {
            seq: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            writer: Mutex::new(frame_writer),
            shutdown: AtomicBool::new(false),
        });

        let receive_inner = Arc::clone(&inner);
        tokio::spawn(receive_inner.receive_loop(frame_reader));

        Ok(Client { inner })
    }

    /// Invokes `Service.Method` with the given arguments and decodes the
    /// reply.
    ///
    /// A non-empty error in the response header surfaces as
    /// [`RpcError::Remote`].
    pub async fn call<Args, Reply>(&self, service_method: &str, args: &Args) -> Result<Reply>
    where
        Args: Serialize + ?Sized,
        Reply: DeserializeOwned,
    {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return Err(RpcError::Closed);
        }

        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        let header = Header::request(service_method, seq);
        let body = serde_json::to_value(args)?;

        let (slot_tx, slot_rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(seq, slot_tx);

        if let Err(e) = self.inner.writer.lock().await.write(&header, &body).await {
            self.inner.pending.lock().await.remove(&seq);
            return Err(e);
        }

        let (header, body) = match slot_rx.await {
            Ok(result) => result?,
            Err(_) => return Err(RpcError::Closed),
        };
        if header.is_error() {
            return Err(RpcError::Remote(header.error));
        }
        Ok(serde_json::from_value(body)?)
    }

    /// Shuts the connection's write side down, ending the session.
    pub async fn close(&self) -> Result<()> {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.writer.lock().await.close().await
    }
}

impl ClientInner {
    /// Routes response frames to their seq's slot until the stream ends,
    /// then fails every call still outstanding.
    async fn receive_loop(self: Arc<Self>, mut reader: FrameReader) {
        let reason = loop {
            let header = match reader.read_header().await {
                Ok(header) => header,
                Err(e) => break e,
            };
            let body = match reader.read_body().await {
                Ok(body) => body,
                Err(e) => break e,
            };

            match self.pending.lock().await.remove(&header.seq) {
                Some(slot) => {
                    let _ = slot.send(Ok((header, body)));
                }
                None => debug!(seq = header.seq, "response for unknown seq dropped"),
            }
        };

        if !matches!(reason, RpcError::Closed) {
            warn!(error = %reason, "receive loop terminated");
        }
        self.shutdown.store(true, Ordering::SeqCst);

        // fail every call still waiting
        let mut pending = self.pending.lock().await;
        for (_, slot) in pending.drain() {
            let _ = slot.send(Err(RpcError::Closed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_surfaces_io_error() {
        // nothing listens on port 1
        let err = Client::connect("127.0.0.1:1", ConnectOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Io(_)));
    }

    #[tokio::test]
    async fn test_unknown_codec_tag_fails_before_any_call() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let options = ConnectOptions::new().with_codec("application/bogus");
        let err = Client::connect(&addr.to_string(), options).await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_clones_share_the_session() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let client = Client::connect(&addr.to_string(), ConnectOptions::new())
            .await
            .unwrap();
        let clone = client.clone();
        client.close().await.unwrap();

        // the clone observes the shared shutdown
        let err = clone
            .call::<_, i64>("Arith.Add", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Closed));
    }
}
