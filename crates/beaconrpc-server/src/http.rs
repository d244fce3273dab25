//! HTTP bridge: CONNECT tunneling into the raw framed protocol.
//!
//! One path accepts only the CONNECT verb; on CONNECT the server answers
//! `200` (the acknowledgement line of the tunnel handshake), hyper's
//! upgrade machinery hands over the raw transport, and the same
//! per-connection state machine serves it. Any other verb on the RPC path
//! gets `405`. A second path serves a JSON listing of registered services
//! and their methods.

use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use beaconrpc_common::protocol::{DEFAULT_DEBUG_PATH, DEFAULT_RPC_PATH};
use beaconrpc_common::{Result, RpcError};

use crate::server::Server;

impl Server {
    /// Serves the HTTP bridge on the given listener.
    ///
    /// Runs until an accept-level failure, handling each connection with
    /// http1 + upgrades so CONNECT can take over the transport.
    pub async fn serve_http(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "http bridge listening");
        }
        loop {
            let (stream, peer) = listener.accept().await.map_err(|e| {
                warn!(error = %e, "accept failed");
                RpcError::Connection(format!("accept failed: {}", e))
            })?;

            let server = Arc::clone(&self);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |request: Request<Incoming>| {
                    let server = Arc::clone(&server);
                    async move { Ok::<_, Infallible>(server.handle_http(request).await) }
                });
                if let Err(e) = http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    debug!(%peer, error = %e, "http connection ended");
                }
            });
        }
    }

    async fn handle_http(self: Arc<Self>, request: Request<Incoming>) -> Response<Full<Bytes>> {
        if request.method() == Method::CONNECT {
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                match hyper::upgrade::on(request).await {
                    Ok(upgraded) => {
                        if let Err(e) = server.serve_conn(TokioIo::new(upgraded)).await {
                            warn!(error = %e, "tunneled connection terminated");
                        }
                    }
                    Err(e) => warn!(error = %e, "connect upgrade failed"),
                }
            });
            // 200 completes the CONNECT handshake; the transport is handed
            // over once the response is on the wire
            return Response::new(Full::new(Bytes::new()));
        }

        let path = request.uri().path();
        if request.method() == Method::GET && path == DEFAULT_DEBUG_PATH {
            let index = self.service_index().await;
            let body = serde_json::to_vec(&index).unwrap_or_default();
            return Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/json")
                .body(Full::new(Bytes::from(body)))
                .unwrap();
        }

        if path == DEFAULT_RPC_PATH {
            return Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(Full::new(Bytes::from_static(b"405 must CONNECT\n")))
                .unwrap();
        }

        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }
}
