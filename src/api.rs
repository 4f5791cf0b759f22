use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::ToSocketAddrs;

use crate::metrics::PrometheusSink;

async fn export_metrics(sink: State<Arc<PrometheusSink>>) -> Response {
    match sink.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(err) => {
            log::error!("Failed to encode metrics: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to encode metrics",
            )
                .into_response()
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Serves the current metric values for scraping.
pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new(sink: Arc<PrometheusSink>) -> Self {
        let router = axum::Router::new()
            .route("/metrics", get(export_metrics))
            .route("/healthz", get(health))
            .with_state(sink);
        Self { router }
    }

    pub fn router(&self) -> axum::Router {
        self.router.clone()
    }

    /// Binds `addr` and serves requests until the server fails.
    pub async fn listen(self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("Serving metrics on {}", listener.local_addr()?);
        axum::serve(listener, self.router.into_make_service()).await
    }
}
