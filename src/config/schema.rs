//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the exporter.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the health exporter.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ExporterConfig {
    /// Exposition server settings (bind address, shutdown grace).
    pub server: ServerConfig,

    /// Logging and metric bucket settings.
    pub observability: ObservabilityConfig,

    /// Circuit breaker settings shared by every probe unit.
    pub breaker: BreakerConfig,

    /// Per-unit scheduling limits.
    pub scheduler: SchedulerConfig,

    /// Probe targets grouped by protocol kind.
    pub targets: TargetsConfig,
}

/// Exposition server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:9876").
    pub listen: String,

    /// Time given to in-flight scrapes before the server is closed.
    pub shutdown_grace_ms: u64,
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:9876".to_string(),
            shutdown_grace_ms: 5_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Buckets for every `*_duration_seconds` histogram.
    pub duration_buckets: Vec<f64>,

    /// Buckets for the HTTP DNS lookup histogram.
    pub dns_lookup_buckets: Vec<f64>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.02, 0.03, 0.05, 0.075, 0.1, 0.2, 0.5, 0.75, 1.0, 1.5, 2.0,
                2.5, 3.0, 4.0, 5.0,
            ],
            dns_lookup_buckets: vec![
                0.0005, 0.001, 0.002, 0.003, 0.004, 0.005, 0.006, 0.008, 0.01, 0.015, 0.02, 0.03,
                0.05, 0.075, 0.1, 0.2, 0.5, 1.0,
            ],
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Requests needed in the current window before the breaker may trip.
    pub min_requests: u32,

    /// Failure ratio (0.0..=1.0) at or above which the breaker trips.
    pub failure_ratio: f64,

    /// Length of the closed-state counting window in milliseconds (0 = never reset).
    pub interval_ms: u64,

    /// Time spent open before trial requests are let through.
    pub cooldown_ms: u64,

    /// Trial requests allowed while half-open.
    pub half_open_max_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            min_requests: 5,
            failure_ratio: 0.6,
            interval_ms: 30_000,
            cooldown_ms: 60_000,
            half_open_max_requests: 5,
        }
    }
}

/// Scheduling limits applied to each probe unit.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Soft cap on concurrently running attempts per target.
    pub max_in_flight: usize,

    /// How long a stopping unit waits for its detached attempts.
    pub drain_timeout_ms: u64,
}

impl SchedulerConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            drain_timeout_ms: 2_000,
        }
    }
}

/// Probe targets by protocol.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TargetsConfig {
    pub http: Vec<HttpTarget>,
    pub dns: Vec<DnsTarget>,
    pub icmp: Vec<IcmpTarget>,
    pub k8s: K8sTargets,
}

impl TargetsConfig {
    /// Total number of probe units this configuration produces.
    pub fn count(&self) -> usize {
        let k8s = if self.k8s.enabled {
            self.k8s.simple_probe.len()
        } else {
            0
        };
        self.http.len() + self.dns.len() + self.icmp.len() + k8s
    }
}

/// HTTP GET target.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HttpTarget {
    pub name: String,
    pub url: String,
    /// Attempts per second.
    pub rps: f64,
    /// Whole-request timeout in milliseconds (0 = default).
    pub timeout_ms: u64,
    pub tls_skip_verify: bool,
    pub disable_keepalives: bool,
    /// Speak HTTP/2 over cleartext with prior knowledge.
    pub h2c_enabled: bool,
    /// Optional `Host` header override.
    pub host: Option<String>,
}

impl HttpTarget {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// DNS query target.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DnsTarget {
    pub name: String,
    pub domain: String,
    /// Record type mnemonic (A, AAAA, MX, ...).
    pub record_type: String,
    pub rps: f64,
    /// Resolver IP (empty = first system nameserver).
    pub server_ip: String,
    pub server_port: u16,
    pub timeout_ms: u64,
}

impl DnsTarget {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// ICMP echo target.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IcmpTarget {
    pub name: String,
    pub host: String,
    pub ttl: u32,
    pub rps: f64,
    pub timeout_ms: u64,
}

impl IcmpTarget {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Kubernetes probing section.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct K8sTargets {
    pub enabled: bool,
    #[serde(alias = "simple-probe")]
    pub simple_probe: Vec<K8sTarget>,
}

/// Namespace listing target.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct K8sTarget {
    /// Probe name (defaults to the namespace).
    pub name: String,
    pub namespace: String,
    pub rps: f64,
    pub timeout_ms: u64,
    /// Also list services.
    pub services: bool,
    /// Also list deployments.
    pub deployments: bool,
}

impl K8sTarget {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
