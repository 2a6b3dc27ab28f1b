//! HTTP GET probe.
//!
//! # Responsibilities
//! - Issue one GET per attempt with the target's client settings
//! - Time the DNS resolution of each new connection separately
//! - Export status code, result and latency per attempt
//!
//! # Design Decisions
//! - One `reqwest::Client` per target so keep-alive pools are not shared
//! - DNS timing comes from a resolver hook scoped to the attempt's task
//! - A URL that cannot be used fails every attempt instead of the unit

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use url::Url;

use crate::config::HttpTarget;
use crate::observability::metrics::{
    HTTP_DNS_LOOKUP_SECONDS, HTTP_DURATION_SECONDS, HTTP_REQUESTS_TOTAL,
};
use crate::observability::MetricsSink;
use crate::probe::classify::{classify_http, HttpError};
use crate::probe::{Outcome, Probe, ProbeKind, TargetId};

tokio::task_local! {
    static LOOKUP: Arc<Mutex<LookupTrace>>;
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// DNS resolution observed while connecting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupTrace {
    pub elapsed: Duration,
    pub error: Option<String>,
}

/// Raw result of one GET.
#[derive(Debug, Clone)]
pub struct HttpOutput {
    /// Status code, or the transport failure.
    pub response: Result<u16, HttpError>,
    pub lookup: LookupTrace,
}

/// Resolver that reports lookup latency to the attempt that triggered it.
struct TracingResolver;

impl Resolve for TracingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let trace = LOOKUP.try_with(Arc::clone).ok();
        Box::pin(async move {
            let start = Instant::now();
            let result = tokio::net::lookup_host((name.as_str(), 0)).await;

            if let Some(trace) = trace {
                let mut trace = trace.lock().expect("lookup trace mutex poisoned");
                trace.elapsed = start.elapsed();
                trace.error = result.as_ref().err().map(ToString::to_string);
            }

            let addrs: Vec<SocketAddr> = result?.collect();
            Ok::<Addrs, BoxError>(Box::new(addrs.into_iter()))
        })
    }
}

struct Prepared {
    client: reqwest::Client,
    url: Url,
}

pub struct HttpProbe {
    id: TargetId,
    target: HttpTarget,
    prepared: Result<Prepared, HttpError>,
}

impl HttpProbe {
    pub fn new(target: HttpTarget) -> Self {
        let prepared = prepare(&target);
        if let Err(error) = &prepared {
            tracing::error!(
                name = %target.name,
                url = %target.url,
                ?error,
                "HTTP target unusable, every attempt will fail"
            );
        }

        Self {
            id: TargetId::new(ProbeKind::Http, target.name.clone()),
            target,
            prepared,
        }
    }
}

fn prepare(target: &HttpTarget) -> Result<Prepared, HttpError> {
    let url = Url::parse(&target.url).map_err(|_| HttpError::RequestBuild)?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(HttpError::Address);
    }

    let mut builder = reqwest::Client::builder()
        .timeout(target.timeout())
        .danger_accept_invalid_certs(target.tls_skip_verify)
        .dns_resolver(Arc::new(TracingResolver));
    if target.disable_keepalives {
        builder = builder.pool_max_idle_per_host(0);
    }
    if target.h2c_enabled {
        builder = builder.http2_prior_knowledge();
    }

    let client = builder.build().map_err(|_| HttpError::RequestBuild)?;
    Ok(Prepared { client, url })
}

fn request_error(error: &reqwest::Error, lookup: &LookupTrace) -> HttpError {
    if error.is_timeout() {
        HttpError::Timeout
    } else if lookup.error.is_some() {
        HttpError::Dns
    } else if error.is_builder() {
        HttpError::RequestBuild
    } else {
        HttpError::Connection
    }
}

#[async_trait]
impl Probe for HttpProbe {
    type Output = HttpOutput;

    fn id(&self) -> &TargetId {
        &self.id
    }

    fn rate(&self) -> f64 {
        self.target.rps
    }

    async fn attempt(&self) -> HttpOutput {
        let prepared = match &self.prepared {
            Ok(prepared) => prepared,
            Err(error) => {
                return HttpOutput {
                    response: Err(*error),
                    lookup: LookupTrace::default(),
                }
            }
        };

        let mut request = prepared.client.get(prepared.url.clone());
        if let Some(host) = &self.target.host {
            request = request.header(reqwest::header::HOST, host);
        }

        let trace = Arc::new(Mutex::new(LookupTrace::default()));
        let result = LOOKUP.scope(trace.clone(), request.send()).await;
        let lookup = trace.lock().expect("lookup trace mutex poisoned").clone();

        let response = match result {
            Ok(response) => Ok(response.status().as_u16()),
            Err(error) => {
                tracing::trace!(name = %self.id.name, %error, "HTTP request failed");
                Err(request_error(&error, &lookup))
            }
        };

        HttpOutput { response, lookup }
    }

    /// Transport errors and status codes >= 400 count against the breaker.
    fn succeeded(&self, output: &HttpOutput) -> bool {
        matches!(output.response, Ok(status) if status < 400)
    }

    fn rejected(&self) -> HttpOutput {
        HttpOutput {
            response: Err(HttpError::Connection),
            lookup: LookupTrace::default(),
        }
    }

    fn report(&self, outcome: &Outcome<HttpOutput>, sink: &dyn MetricsSink) -> &'static str {
        let output = &outcome.output;
        let result = classify_http(output.response).as_str();
        let status_code = output.response.unwrap_or(0).to_string();

        let labels = [
            ("name", self.target.name.clone()),
            ("url", self.target.url.clone()),
            ("status_code", status_code),
            ("result", result.to_string()),
        ];
        sink.increment_counter(HTTP_REQUESTS_TOTAL, &labels);
        sink.observe_histogram(HTTP_DURATION_SECONDS, &labels, outcome.elapsed.as_secs_f64());

        let [name, url, status_code, result_label] = labels;
        let lookup_labels = [
            name,
            url,
            status_code,
            result_label,
            ("dns_error", output.lookup.error.clone().unwrap_or_default()),
        ];
        sink.observe_histogram(
            HTTP_DNS_LOOKUP_SECONDS,
            &lookup_labels,
            output.lookup.elapsed.as_secs_f64(),
        );

        result
    }
}
