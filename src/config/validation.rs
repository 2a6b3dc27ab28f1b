//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates > 0, ratios in range, addresses parse)
//! - Detect duplicate probe names within a protocol kind
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ExporterConfig → Result<(), Vec<ValidationError>>
//! - Runs after defaults are applied, before any probe unit exists

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ExporterConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no probes configured")]
    NoProbes,

    #[error("{kind} target name is required")]
    MissingName { kind: &'static str },

    #[error("{kind} target {name:?}: {field} is required")]
    MissingField {
        kind: &'static str,
        name: String,
        field: &'static str,
    },

    #[error("{kind} target {name:?}: rps should be > 0 (got {rps})")]
    InvalidRate {
        kind: &'static str,
        name: String,
        rps: f64,
    },

    #[error("{kind} target {name:?} is defined more than once")]
    DuplicateName { kind: &'static str, name: String },

    #[error("invalid listen address {0:?}")]
    InvalidListen(String),

    #[error("breaker failure_ratio must be within 0..=1 (got {0})")]
    InvalidFailureRatio(f64),

    #[error("breaker half_open_max_requests must be > 0")]
    InvalidHalfOpenQuota,

    #[error("scheduler max_in_flight must be > 0")]
    InvalidInFlightCap,

    #[error("k8s probes enabled but no namespace configured")]
    NoNamespaces,
}

/// Validate a defaulted configuration, collecting every problem found.
pub fn validate_config(config: &ExporterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.targets.count() == 0 {
        errors.push(ValidationError::NoProbes);
    }

    if config.server.listen.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidListen(config.server.listen.clone()));
    }

    let ratio = config.breaker.failure_ratio;
    if !(0.0..=1.0).contains(&ratio) {
        errors.push(ValidationError::InvalidFailureRatio(ratio));
    }
    if config.breaker.half_open_max_requests == 0 {
        errors.push(ValidationError::InvalidHalfOpenQuota);
    }
    if config.scheduler.max_in_flight == 0 {
        errors.push(ValidationError::InvalidInFlightCap);
    }

    let targets = &config.targets;

    let mut names = NameCheck::new("http");
    for t in &targets.http {
        names.check(&t.name, t.rps, &mut errors);
        if t.url.is_empty() {
            errors.push(names.missing(&t.name, "url"));
        }
    }

    let mut names = NameCheck::new("dns");
    for t in &targets.dns {
        names.check(&t.name, t.rps, &mut errors);
        if t.domain.is_empty() {
            errors.push(names.missing(&t.name, "domain"));
        }
    }

    let mut names = NameCheck::new("icmp");
    for t in &targets.icmp {
        names.check(&t.name, t.rps, &mut errors);
        if t.host.is_empty() {
            errors.push(names.missing(&t.name, "host"));
        }
    }

    if targets.k8s.enabled {
        if targets.k8s.simple_probe.is_empty() {
            errors.push(ValidationError::NoNamespaces);
        }
        let mut names = NameCheck::new("k8s");
        for t in &targets.k8s.simple_probe {
            if t.namespace.is_empty() {
                errors.push(names.missing(&t.name, "namespace"));
                continue;
            }
            names.check(&t.name, t.rps, &mut errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Per-kind name bookkeeping.
struct NameCheck {
    kind: &'static str,
    seen: HashSet<String>,
}

impl NameCheck {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            seen: HashSet::new(),
        }
    }

    fn check(&mut self, name: &str, rps: f64, errors: &mut Vec<ValidationError>) {
        if name.is_empty() {
            errors.push(ValidationError::MissingName { kind: self.kind });
        } else if !self.seen.insert(name.to_string()) {
            errors.push(ValidationError::DuplicateName {
                kind: self.kind,
                name: name.to_string(),
            });
        }

        // NaN fails this comparison as well.
        if !(rps > 0.0 && rps.is_finite()) {
            errors.push(ValidationError::InvalidRate {
                kind: self.kind,
                name: name.to_string(),
                rps,
            });
        }
    }

    fn missing(&self, name: &str, field: &'static str) -> ValidationError {
        ValidationError::MissingField {
            kind: self.kind,
            name: name.to_string(),
            field,
        }
    }
}
