//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the exporter's metric families
//! - Accept observations from every probe unit through [`MetricsSink`]
//! - Render the aggregated state in the Prometheus text format
//!
//! # Metrics
//! - `health_{http,dns,icmp,k8s}_requests_total` (counter): attempts by result
//! - `health_{http,dns,icmp,k8s}_duration_seconds` (histogram): attempt latency
//! - `health_http_dns_lookup_time_seconds` (histogram): DNS share of HTTP attempts
//! - `health_k8s_resource_count` (gauge): objects listed per namespace
//! - `health_probe_circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `health_probe_skipped_ticks_total` (counter): ticks dropped by the in-flight cap
//! - `health_k8s_http_request_total` (counter): Kubernetes API calls by status code
//! - `health_k8s_http_request_duration_seconds` (histogram): Kubernetes API latency by path
//!
//! # Design Decisions
//! - The sink is an explicit instance handed to every unit, never a global
//! - Recording is synchronous and lock-light (atomic handles in the recorder)
//! - Histogram samples are compacted by a periodic upkeep task, scraped or not

use std::sync::Arc;
use std::time::Duration;

use metrics::{Key, Label, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ObservabilityConfig;

pub const HTTP_REQUESTS_TOTAL: &str = "health_http_requests_total";
pub const HTTP_DURATION_SECONDS: &str = "health_http_duration_seconds";
pub const HTTP_DNS_LOOKUP_SECONDS: &str = "health_http_dns_lookup_time_seconds";
pub const DNS_REQUESTS_TOTAL: &str = "health_dns_requests_total";
pub const DNS_DURATION_SECONDS: &str = "health_dns_duration_seconds";
pub const ICMP_REQUESTS_TOTAL: &str = "health_icmp_requests_total";
pub const ICMP_DURATION_SECONDS: &str = "health_icmp_duration_seconds";
pub const K8S_REQUESTS_TOTAL: &str = "health_k8s_requests_total";
pub const K8S_DURATION_SECONDS: &str = "health_k8s_duration_seconds";
pub const K8S_RESOURCE_COUNT: &str = "health_k8s_resource_count";
pub const BREAKER_STATE: &str = "health_probe_circuit_breaker_state";
pub const SKIPPED_TICKS_TOTAL: &str = "health_probe_skipped_ticks_total";
pub const K8S_API_REQUESTS_TOTAL: &str = "health_k8s_http_request_total";
pub const K8S_API_DURATION_SECONDS: &str = "health_k8s_http_request_duration_seconds";

/// Interval between recorder upkeep passes.
pub const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// A label set: static keys, owned values.
pub type Labels = [(&'static str, String)];

/// Destination for every observation the probes produce.
///
/// Implementations must be safe for concurrent use and must never block
/// for long; callers record from inside attempt completion paths.
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &'static str, labels: &Labels);

    fn observe_histogram(&self, name: &'static str, labels: &Labels, value: f64);

    fn set_gauge(&self, name: &'static str, labels: &Labels, value: f64);

    /// Scrape representation of everything recorded so far.
    fn render(&self) -> String;

    /// Fold buffered samples into their aggregates.
    fn upkeep(&self) {}
}

/// Run [`MetricsSink::upkeep`] every `period` until `cancel` fires.
pub fn spawn_upkeep(
    sink: Arc<dyn MetricsSink>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => sink.upkeep(),
            }
        }
        tracing::debug!("Metrics upkeep stopped");
    })
}

const METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

/// Sink backed by a locally owned Prometheus recorder.
pub struct PrometheusSink {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl PrometheusSink {
    /// Build a sink with the configured histogram buckets.
    pub fn new(config: &ObservabilityConfig) -> Result<Self, BuildError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(HTTP_DNS_LOOKUP_SECONDS.to_string()),
                &config.dns_lookup_buckets,
            )?
            .set_buckets_for_metric(
                Matcher::Suffix("_duration_seconds".to_string()),
                &config.duration_buckets,
            )?
            .build_recorder();
        let handle = recorder.handle();

        Ok(Self { recorder, handle })
    }

    fn key(name: &'static str, labels: &Labels) -> Key {
        let labels: Vec<Label> = labels
            .iter()
            .map(|(k, v)| Label::new(*k, v.clone()))
            .collect();
        Key::from_parts(name, labels)
    }
}

impl MetricsSink for PrometheusSink {
    fn increment_counter(&self, name: &'static str, labels: &Labels) {
        self.recorder
            .register_counter(&Self::key(name, labels), &METADATA)
            .increment(1);
    }

    fn observe_histogram(&self, name: &'static str, labels: &Labels, value: f64) {
        self.recorder
            .register_histogram(&Self::key(name, labels), &METADATA)
            .record(value);
    }

    fn set_gauge(&self, name: &'static str, labels: &Labels, value: f64) {
        self.recorder
            .register_gauge(&Self::key(name, labels), &METADATA)
            .set(value);
    }

    fn render(&self) -> String {
        self.handle.render()
    }

    fn upkeep(&self) {
        self.handle.run_upkeep();
    }
}
