// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host readiness endpoint.
//!
//! `/ready` reflects [`HostReadiness`] only. The remote configuration status is
//! exposed separately on `/remote-config/status` and never feeds into readiness.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::status::{status_json, SubsystemStatus};

pub const READY_PATH: &str = "/ready";
pub const REMOTE_CONFIG_STATUS_PATH: &str = "/remote-config/status";

/// Readiness flag owned by the host process.
#[derive(Debug, Clone, Default)]
pub struct HostReadiness {
    ready: Arc<AtomicBool>,
}

impl HostReadiness {
    /// Starts not ready.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("failed to bind health server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("health server accept failed: {0}")]
    Accept(#[from] io::Error),
}

/// HTTP server for `/ready` and `/remote-config/status`.
#[derive(Debug, Clone)]
pub struct HealthServer {
    readiness: HostReadiness,
    remote_config: Option<SubsystemStatus>,
}

impl HealthServer {
    pub fn new(readiness: HostReadiness) -> Self {
        Self {
            readiness,
            remote_config: None,
        }
    }

    #[must_use]
    pub fn with_remote_config(mut self, status: SubsystemStatus) -> Self {
        self.remote_config = Some(status);
        self
    }

    pub async fn bind(addr: SocketAddr) -> Result<TcpListener, HealthError> {
        TcpListener::bind(addr)
            .await
            .map_err(|source| HealthError::Bind { addr, source })
    }

    /// Serves requests on `listener` until `shutdown` is cancelled.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), HealthError> {
        if let Ok(addr) = listener.local_addr() {
            info!("health server listening on {addr}");
        }
        let server = hyper::server::conn::http1::Builder::new();
        let mut connections = JoinSet::new();

        loop {
            let stream = tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("health server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("health server error: {e}");
                        return Err(e.into());
                    }
                    Ok((stream, _)) => stream,
                },
                Some(finished) = connections.join_next() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!("health connection handler panicked: {e:?}");
                        }
                    }
                    continue;
                }
            };

            let io = hyper_util::rt::TokioIo::new(stream);
            let server = server.clone();
            let handler = self.clone();
            connections.spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let response = handler.route(&req);
                    async move { Ok::<_, Infallible>(response) }
                });
                if let Err(e) = server.serve_connection(io, service).await {
                    debug!("health connection error: {e}");
                }
            });
        }
    }

    fn route<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, READY_PATH) => {
                if self.readiness.is_ready() {
                    text_response(StatusCode::OK, "ready")
                } else {
                    text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready")
                }
            }
            (&Method::GET, REMOTE_CONFIG_STATUS_PATH) => {
                let body = status_json(self.remote_config.as_ref()).to_string();
                let mut response = Response::new(Full::new(Bytes::from(body)));
                response.headers_mut().insert(
                    hyper::header::CONTENT_TYPE,
                    hyper::header::HeaderValue::from_static("application/json"),
                );
                response
            }
            (_, READY_PATH | REMOTE_CONFIG_STATUS_PATH) => {
                text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
            }
            _ => text_response(StatusCode::NOT_FOUND, "not found"),
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
