//! Exposition server.
//!
//! # Responsibilities
//! - Serve the metrics sink's scrape text on `/metrics`
//! - Answer liveness checks on `/healthz` (and legacy `/health`)
//! - Give in-flight scrapes a bounded grace period on shutdown

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::ExporterError;
use crate::observability::MetricsSink;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// HTTP server exposing the metrics sink.
pub struct ExpositionServer {
    router: Router,
    grace: Duration,
}

impl ExpositionServer {
    pub fn new(sink: Arc<dyn MetricsSink>, grace: Duration) -> Self {
        Self {
            router: Self::build_router(sink),
            grace,
        }
    }

    fn build_router(sink: Arc<dyn MetricsSink>) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(health_handler))
            .route("/health", get(health_handler))
            .with_state(sink)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the listening socket. Failure here is fatal for the process.
    pub async fn bind(addr: &str) -> Result<TcpListener, ExporterError> {
        TcpListener::bind(addr)
            .await
            .map_err(|source| ExporterError::Bind {
                addr: addr.to_string(),
                source,
            })
    }

    /// Serve until `shutdown` fires, then drain for at most the grace period.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), ExporterError> {
        let Self { router, grace } = self;
        let addr = listener.local_addr().map_err(ExporterError::Server)?;
        tracing::info!(address = %addr, "Exposition server listening");

        let signal = shutdown.clone();
        let mut serving = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        tokio::select! {
            joined = &mut serving => return flatten(joined),
            _ = shutdown.cancelled() => {}
        }

        match time::timeout(grace, &mut serving).await {
            Ok(joined) => {
                tracing::info!("Exposition server stopped");
                flatten(joined)
            }
            Err(_) => {
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Exposition server grace period expired, closing connections"
                );
                serving.abort();
                Ok(())
            }
        }
    }
}

fn flatten(joined: Result<io::Result<()>, JoinError>) -> Result<(), ExporterError> {
    match joined {
        Ok(result) => result.map_err(ExporterError::Server),
        Err(error) => Err(ExporterError::Server(io::Error::other(error))),
    }
}

async fn metrics_handler(State(sink): State<Arc<dyn MetricsSink>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], sink.render())
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemorySink;

    type ServerTask = tokio::task::JoinHandle<Result<(), ExporterError>>;

    async fn start(grace: Duration) -> (String, CancellationToken, ServerTask) {
        let sink = Arc::new(MemorySink::new());
        sink.increment_counter("health_test_total", &[("name", "a".to_string())]);

        let listener = ExpositionServer::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let token = CancellationToken::new();
        let server = ExpositionServer::new(sink, grace);
        let handle = tokio::spawn(server.run(listener, token.clone()));
        (base, token, handle)
    }

    #[tokio::test]
    async fn test_serves_metrics_and_health() {
        let (base, token, handle) = start(Duration::from_secs(1)).await;

        let metrics = reqwest::get(format!("{}/metrics", base)).await.unwrap();
        assert_eq!(metrics.status(), 200);
        assert!(metrics
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        assert!(metrics.text().await.unwrap().contains("health_test_total{name=\"a\"} 1"));

        for path in ["/healthz", "/health"] {
            let resp = reqwest::get(format!("{}{}", base, path)).await.unwrap();
            assert_eq!(resp.status(), 200);
        }

        let missing = reqwest::get(format!("{}/nope", base)).await.unwrap();
        assert_eq!(missing.status(), 404);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let err = ExpositionServer::bind(&addr).await.unwrap_err();
        assert!(matches!(err, ExporterError::Bind { .. }));
        assert!(err.to_string().contains(&addr));
    }

    #[tokio::test]
    async fn test_stops_within_grace() {
        let (_base, token, handle) = start(Duration::from_millis(200)).await;
        token.cancel();

        let stopped = time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(stopped, Ok(Ok(Ok(())))));
    }
}
