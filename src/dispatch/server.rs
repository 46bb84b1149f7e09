use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;

/// HTTP endpoint exposing a Prometheus registry in text format.
pub struct MetricsServer {
    listener: TcpListener,
    router: Router,
    addr: SocketAddr,
}

impl MetricsServer {
    /// Bind `listen` and route `path` to the registry.
    pub async fn bind(listen: &str, path: &str, registry: Registry) -> Result<Self, DispatchError> {
        let bind_err = |source: std::io::Error| DispatchError::Bind { addr: listen.to_string(), source };

        let listener = TcpListener::bind(listen).await.map_err(bind_err)?;
        let addr = listener.local_addr().map_err(bind_err)?;

        Ok(Self { listener, router: router(path, registry), addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve scrapes until `cancel` fires.
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), DispatchError> {
        tracing::info!(addr = %self.addr, "Listening for scrapes");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(DispatchError::Serve)
    }
}

pub fn router(path: &str, registry: Registry) -> Router {
    Router::new().route(path, get(scrape)).with_state(registry)
}

async fn scrape(State(registry): State<Registry>) -> Response {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();

    match encoder.encode(&registry.gather(), &mut buf) {
        Ok(()) => ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buf).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
