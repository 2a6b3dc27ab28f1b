//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, fill defaults)
//!     → validation.rs (semantic checks)
//!     → ExporterConfig (validated, immutable)
//!     → one target per probe unit
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; targets never change at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BreakerConfig, DnsTarget, ExporterConfig, HttpTarget, IcmpTarget, K8sTarget, K8sTargets,
    ObservabilityConfig, SchedulerConfig, ServerConfig, TargetsConfig,
};
pub use validation::ValidationError;
