//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Probe units produce:
//!     → logging.rs (structured log events, throttled per target)
//!     → metrics.rs (counters, gauges, histograms through a MetricsSink)
//! Kubernetes client calls:
//!     → api_metrics.rs (tower layer, status and latency per API request)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape via http::server)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (kind, name, result)
//! - Metrics are cheap and never block a probe
//! - The sink is injected, so tests swap in `MemorySink`

pub mod api_metrics;
pub mod logging;
pub mod memory;
pub mod metrics;

pub use memory::MemorySink;
pub use metrics::{MetricsSink, PrometheusSink};
