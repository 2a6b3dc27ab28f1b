//! Outbound API call instrumentation.
//!
//! A tower layer placed under the Kubernetes client so every API request,
//! including retries and discovery, is counted by status code and timed by
//! request path.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tower::{Layer, Service};

use crate::observability::metrics::{K8S_API_DURATION_SECONDS, K8S_API_REQUESTS_TOTAL};
use crate::observability::MetricsSink;

/// Status label for calls that produced no response.
const NO_RESPONSE: &str = "<error>";

#[derive(Clone)]
pub struct ApiMetricsLayer {
    sink: Arc<dyn MetricsSink>,
}

impl ApiMetricsLayer {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for ApiMetricsLayer {
    type Service = ApiMetrics<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiMetrics {
            inner,
            sink: self.sink.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ApiMetrics<S> {
    inner: S,
    sink: Arc<dyn MetricsSink>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ApiMetrics<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let endpoint = request.uri().path().to_string();
        let sink = self.sink.clone();
        let start = Instant::now();
        let response = self.inner.call(request);

        Box::pin(async move {
            let result = response.await;

            let status_code = match &result {
                Ok(response) => response.status().as_u16().to_string(),
                Err(_) => NO_RESPONSE.to_string(),
            };
            sink.increment_counter(K8S_API_REQUESTS_TOTAL, &[("status_code", status_code)]);
            sink.observe_histogram(
                K8S_API_DURATION_SECONDS,
                &[("endpoint", endpoint)],
                start.elapsed().as_secs_f64(),
            );

            result
        })
    }
}
