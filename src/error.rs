//! Process-level errors.
//!
//! Only conditions that stop the exporter live here. Probe failures are
//! recorded as outcomes and never surface as an [`ExporterError`].

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind exposition server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("exposition server failed: {0}")]
    Server(#[source] io::Error),

    #[error("kubernetes client unavailable: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("metrics recorder setup failed: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}
