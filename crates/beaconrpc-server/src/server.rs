//! Per-connection state machine and accept loop.
//!
//! A connection goes through four stages: handshake (one JSON-line
//! [`ConnectOptions`] record), codec resolution, the serving loop (one
//! spawned task per request, responses serialized through one writer
//! lock), and draining (in-flight requests finish before the codec
//! closes).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use beaconrpc_common::codec::{CodecReader, CodecRegistry, CodecWriter};
use beaconrpc_common::protocol::error::{Result, RpcError};
use beaconrpc_common::{Body, ConnectOptions, Header, INVALID_BODY, MAGIC_NUMBER};

use crate::service::{split_service_method, Method, Service};

/// One in-flight call: everything read and resolved for it.
///
/// Created when a frame is read, destroyed after its response is written.
struct PendingRequest {
    header: Header,
    args: Body,
    service: Arc<Service>,
    method: Arc<Method>,
}

/// An RPC server: the registered service table, the injected codec
/// mapping, and the connection-serving machinery.
pub struct Server {
    services: RwLock<HashMap<String, Arc<Service>>>,
    codecs: CodecRegistry,
}

impl Server {
    /// Creates a server with the default codec mapping.
    pub fn new() -> Self {
        Self::with_codecs(CodecRegistry::new())
    }

    /// Creates a server with an explicit tag → codec mapping.
    pub fn with_codecs(codecs: CodecRegistry) -> Self {
        Server {
            services: RwLock::new(HashMap::new()),
            codecs,
        }
    }

    /// Registers a service.
    ///
    /// # Errors
    ///
    /// Fails with `DuplicateService` when the name is already taken; the
    /// existing registration is left untouched.
    pub async fn register(&self, service: Service) -> Result<()> {
        let mut services = self.services.write().await;
        if services.contains_key(service.name()) {
            return Err(RpcError::DuplicateService(service.name().to_string()));
        }
        info!(service = service.name(), "service registered");
        services.insert(service.name().to_string(), Arc::new(service));
        Ok(())
    }

    /// Sorted service → method-names listing, for introspection.
    pub async fn service_index(&self) -> BTreeMap<String, Vec<String>> {
        let services = self.services.read().await;
        services
            .values()
            .map(|service| (service.name().to_string(), service.method_names()))
            .collect()
    }

    /// Accepts connections forever, one spawned serve task per connection.
    ///
    /// Returns only on an accept-level failure (including deliberate
    /// listener closure).
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await.map_err(|e| {
                warn!(error = %e, "accept failed");
                RpcError::Connection(format!("accept failed: {}", e))
            })?;
            debug!(%peer, "connection accepted");

            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.serve_conn(stream).await {
                    warn!(%peer, error = %e, "connection terminated");
                }
            });
        }
    }

    /// Serves one connection: handshake, codec resolution, then the
    /// request loop.
    ///
    /// A magic-number mismatch or an unresolvable codec tag aborts the
    /// connection without a response frame — no codec has been agreed yet,
    /// so none is possible.
    pub async fn serve_conn<S>(self: Arc<Self>, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let options = ConnectOptions::read_from(&mut reader).await?;
        if options.magic_number != MAGIC_NUMBER {
            warn!(magic = options.magic_number, "invalid magic number");
            return Err(RpcError::Protocol(format!(
                "invalid magic number {:#x}",
                options.magic_number
            )));
        }
        let Some(kind) = self.codecs.resolve(&options.codec) else {
            warn!(codec = %options.codec, "unknown codec tag");
            return Err(RpcError::Protocol(format!(
                "unknown codec tag: {}",
                options.codec
            )));
        };
        let (codec_reader, codec_writer) = kind.open(reader, write_half)?;

        self.serve_codec(codec_reader, codec_writer, &options).await;
        Ok(())
    }

    /// The serving loop plus the drain that follows it.
    async fn serve_codec<R, W>(
        &self,
        mut reader: CodecReader<R>,
        writer: CodecWriter<W>,
        options: &ConnectOptions,
    ) where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        // one lock serializes every response write on this connection
        let writer = Arc::new(Mutex::new(writer));
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let handle_timeout = options.handle_timeout();

        loop {
            let header = match reader.read_header().await {
                Ok(header) => header,
                Err(RpcError::Closed) => break,
                Err(e) => {
                    warn!(error = %e, "read header failed");
                    break;
                }
            };

            // the body is always consumed, even when resolution fails
            // below: the stream has no self-resynchronization, so every
            // frame must leave it aligned on the next header
            let args = match reader.read_body().await {
                Ok(body) => body,
                Err(RpcError::Decode(e)) => {
                    let mut response = header;
                    response.error = format!("read body: {}", e);
                    Self::send_response(&writer, &response, &INVALID_BODY).await;
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "read body failed");
                    break;
                }
            };

            let (service, method) = match self.find_method(&header.service_method).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    let mut response = header;
                    response.error = e.to_string();
                    Self::send_response(&writer, &response, &INVALID_BODY).await;
                    continue;
                }
            };

            let request = PendingRequest {
                header,
                args,
                service,
                method,
            };
            in_flight.spawn(Self::handle_request(
                request,
                Arc::clone(&writer),
                handle_timeout,
            ));
        }

        // drain: every dispatched request finishes (or times out) before
        // the codec closes, so no response write hits a closed stream
        while in_flight.join_next().await.is_some() {}
        let _ = writer.lock().await.close().await;
    }

    /// Resolves "Service.Method" against the registration table.
    ///
    /// The three failure cases — no separator, unknown service, unknown
    /// method — are distinct and all non-fatal to the connection.
    async fn find_method(&self, service_method: &str) -> Result<(Arc<Service>, Arc<Method>)> {
        let (service_name, method_name) = split_service_method(service_method)
            .ok_or_else(|| RpcError::InvalidServiceMethod(service_method.to_string()))?;
        let service = {
            let services = self.services.read().await;
            services
                .get(service_name)
                .cloned()
                .ok_or_else(|| RpcError::UnknownService(service_name.to_string()))?
        };
        let method = service
            .method(method_name)
            .ok_or_else(|| RpcError::UnknownMethod(method_name.to_string()))?;
        Ok((service, method))
    }

    /// Handles one request: invoke, race the timeout, write exactly one
    /// response frame.
    ///
    /// The invocation runs on its own task signalling a oneshot. If the
    /// timeout fires first, a timeout-tagged error frame is written and
    /// this task returns without ever reading the signal — the invocation
    /// keeps running but its result is discarded, so a second frame for
    /// this seq can never be written.
    async fn handle_request<W>(
        request: PendingRequest,
        writer: Arc<Mutex<CodecWriter<W>>>,
        handle_timeout: Option<Duration>,
    ) where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let PendingRequest {
            mut header,
            args,
            service,
            method,
        } = request;
        debug!(
            service = service.name(),
            method = method.name(),
            seq = header.seq,
            "dispatching request"
        );

        let invocation = method.invoke(args);
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = invocation.await;
            let _ = done_tx.send(result);
        });

        let outcome = match handle_timeout {
            None => done_rx.await.ok(),
            Some(timeout) => match tokio::time::timeout(timeout, done_rx).await {
                Ok(completed) => completed.ok(),
                Err(_elapsed) => {
                    header.error = format!(
                        "request handle timeout: expected completion within {}ms",
                        timeout.as_millis()
                    );
                    Self::send_response(&writer, &header, &INVALID_BODY).await;
                    return;
                }
            },
        };

        match outcome {
            Some(Ok(reply)) => {
                Self::send_response(&writer, &header, &reply).await;
            }
            Some(Err(message)) => {
                header.error = message;
                Self::send_response(&writer, &header, &INVALID_BODY).await;
            }
            None => {
                // invocation task died without signalling
                header.error = "method invocation aborted".to_string();
                Self::send_response(&writer, &header, &INVALID_BODY).await;
            }
        }
    }

    /// Writes one response frame under the write-exclusion lock.
    ///
    /// A write failure is logged, not propagated: the codec has closed
    /// itself and the serve loop will notice on its side.
    async fn send_response<W>(writer: &Arc<Mutex<CodecWriter<W>>>, header: &Header, body: &Body)
    where
        W: AsyncWrite + Unpin,
    {
        let mut writer = writer.lock().await;
        if let Err(e) = writer.write(header, body).await {
            warn!(seq = header.seq, error = %e, "write response failed");
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct EchoArgs {
        text: String,
    }

    fn echo_service() -> Service {
        Service::builder("Echo")
            .method("Echo", |args: EchoArgs| async move { Ok(args.text) })
            .build()
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let server = Server::new();
        server.register(echo_service()).await.unwrap();
        let err = server.register(echo_service()).await.unwrap_err();
        assert!(matches!(err, RpcError::DuplicateService(name) if name == "Echo"));
    }

    #[tokio::test]
    async fn test_find_method_distinguishes_failures() {
        let server = Server::new();
        server.register(echo_service()).await.unwrap();

        assert!(server.find_method("Echo.Echo").await.is_ok());
        assert!(matches!(
            server.find_method("no-separator").await.unwrap_err(),
            RpcError::InvalidServiceMethod(_)
        ));
        assert!(matches!(
            server.find_method("Nope.Echo").await.unwrap_err(),
            RpcError::UnknownService(_)
        ));
        assert!(matches!(
            server.find_method("Echo.Nope").await.unwrap_err(),
            RpcError::UnknownMethod(_)
        ));
    }

    #[tokio::test]
    async fn test_service_index_is_sorted() {
        let server = Server::new();
        server.register(echo_service()).await.unwrap();
        server
            .register(
                Service::builder("Arith")
                    .method("Add", |args: EchoArgs| async move { Ok(args.text) })
                    .build(),
            )
            .await
            .unwrap();

        let index = server.service_index().await;
        let names: Vec<&String> = index.keys().collect();
        assert_eq!(names, vec!["Arith", "Echo"]);
        assert_eq!(index["Echo"], vec!["Echo"]);
    }
}
