//! Standalone HTTP listener hosting a [`StreamableHttpService`].

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handler::StreamableHttpService;

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("bind failed: {0}")]
    Bind(std::io::Error),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns the listener loop. The endpoint path defaults to `/mcp`.
pub struct McpHttpServer {
    service: Arc<StreamableHttpService>,
    path: String,
    shutdown: CancellationToken,
}

impl McpHttpServer {
    pub fn new(service: StreamableHttpService) -> Self {
        Self {
            service: Arc::new(service),
            path: "/mcp".to_string(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn service(&self) -> &Arc<StreamableHttpService> {
        &self.service
    }

    /// Trigger shutdown: stop accepting and close every session.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind and run the accept loop. Returns once the shutdown handle fires.
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), HttpServerError> {
        let listener = TcpListener::bind(addr).await.map_err(HttpServerError::Bind)?;
        self.run(listener).await
    }

    /// Accept loop over an already-bound listener.
    pub async fn run(&self, listener: TcpListener) -> Result<(), HttpServerError> {
        let addr = listener.local_addr()?;
        info!(%addr, path = self.path, "MCP HTTP server listening");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    debug!(%remote, "connection accepted");
                    let service = self.service.clone();
                    let path = self.path.clone();
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let handler = service_fn(move |request| {
                            let service = service.clone();
                            let path = path.clone();
                            async move {
                                let response = if request.uri().path() == path {
                                    service.handle(request).await
                                } else {
                                    crate::handler::not_found()
                                };
                                Ok::<_, std::convert::Infallible>(response)
                            }
                        });
                        if let Err(e) = auto::Builder::new(TokioExecutor::new())
                            .serve_connection_with_upgrades(io, handler)
                            .await
                        {
                            debug!(error = %e, "connection ended with error");
                        }
                    });
                }
            }
        }

        info!("MCP HTTP server shutting down");
        self.service.shutdown().await;
        Ok(())
    }
}
