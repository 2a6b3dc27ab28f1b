//! Synthetic-monitoring health exporter.
//!
//! Probes HTTP endpoints, DNS resolvers, ICMP hosts and Kubernetes
//! namespaces at configured rates and exposes the classified results for
//! Prometheus scraping.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod probe;
pub mod resilience;

pub use config::schema::ExporterConfig;
pub use error::ExporterError;
pub use http::ExpositionServer;
pub use lifecycle::{Shutdown, Supervisor};
pub use observability::{MemorySink, MetricsSink, PrometheusSink};
