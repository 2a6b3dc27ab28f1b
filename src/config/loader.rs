//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ExporterConfig;
use crate::config::validation::{validate_config, ValidationError};

const DEFAULT_HTTP_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_DNS_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_ICMP_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_DNS_PORT: u16 = 53;
const DEFAULT_ICMP_TTL: u32 = 64;
const DEFAULT_K8S_RPS: f64 = 1.0;
const DEFAULT_RECORD_TYPE: &str = "A";
const FALLBACK_NAMESERVER: &str = "127.0.0.1";
const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, default and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ExporterConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse, default and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ExporterConfig, ConfigError> {
    let mut config: ExporterConfig = toml::from_str(content)?;
    apply_defaults(&mut config, &system_nameserver());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Fill every unset per-target field.
///
/// `nameserver` is used for DNS targets without an explicit `server_ip`.
pub fn apply_defaults(config: &mut ExporterConfig, nameserver: &str) {
    let targets = &mut config.targets;

    for t in &mut targets.http {
        if t.timeout_ms == 0 {
            t.timeout_ms = DEFAULT_HTTP_TIMEOUT_MS;
        }
        if t.host.as_deref() == Some("") {
            t.host = None;
        }
    }

    for t in &mut targets.dns {
        if t.timeout_ms == 0 {
            t.timeout_ms = DEFAULT_DNS_TIMEOUT_MS;
        }
        if t.record_type.is_empty() {
            t.record_type = DEFAULT_RECORD_TYPE.to_string();
        }
        if t.server_ip.is_empty() {
            t.server_ip = nameserver.to_string();
        }
        if t.server_port == 0 {
            t.server_port = DEFAULT_DNS_PORT;
        }
    }

    for t in &mut targets.icmp {
        if t.timeout_ms == 0 {
            t.timeout_ms = DEFAULT_ICMP_TIMEOUT_MS;
        }
        if t.ttl == 0 {
            t.ttl = DEFAULT_ICMP_TTL;
        }
    }

    for t in &mut targets.k8s.simple_probe {
        if t.rps <= 0.0 {
            t.rps = DEFAULT_K8S_RPS;
        }
        if t.timeout_ms == 0 {
            t.timeout_ms = DEFAULT_HTTP_TIMEOUT_MS;
        }
        if t.name.is_empty() {
            t.name = t.namespace.clone();
        }
    }
}

/// First `nameserver` entry of the system resolver configuration.
pub fn system_nameserver() -> String {
    match fs::read_to_string(RESOLV_CONF) {
        Ok(content) => first_nameserver(&content).unwrap_or_else(|| {
            tracing::warn!(path = RESOLV_CONF, "No nameserver entry found, using fallback");
            FALLBACK_NAMESERVER.to_string()
        }),
        Err(e) => {
            tracing::warn!(
                path = RESOLV_CONF,
                error = %e,
                "Cannot read resolver config, using fallback"
            );
            FALLBACK_NAMESERVER.to_string()
        }
    }
}

fn first_nameserver(resolv_conf: &str) -> Option<String> {
    resolv_conf
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && !line.starts_with(';'))
        .find_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some("nameserver"), Some(addr)) => Some(addr.to_string()),
                _ => None,
            }
        })
}
