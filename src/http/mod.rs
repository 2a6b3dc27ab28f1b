//! HTTP exposition subsystem.
//!
//! # Data Flow
//! ```text
//! Scraper GET /metrics
//!     → server.rs (axum router, trace layer)
//!     → MetricsSink::render
//!     → Prometheus text response
//! ```

pub mod server;

pub use server::ExpositionServer;
