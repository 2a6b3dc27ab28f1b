//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Target rate:
//!     → interval.rs (rate → tick period, clamped)
//! Each attempt:
//!     → circuit_breaker.rs (reject while open, record result otherwise)
//! ```
//!
//! # Design Decisions
//! - Periods are never zero; timers are always constructible
//! - Breakers are per target, never pooled across targets
//! - Breaker state is only visible through its transition observer

pub mod circuit_breaker;
pub mod interval;

pub use circuit_breaker::{BreakerError, BreakerSettings, BreakerState, CircuitBreaker};
pub use interval::interval_from_rate;
