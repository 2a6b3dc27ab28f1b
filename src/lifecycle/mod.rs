//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (supervisor.rs):
//!     Config → Build probe units → Bind listener (fatal on failure) → Start loops
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Server grace period → Loops stop at tick boundary → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Only a bind failure is fatal; probe failures are absorbed
//! - Shutdown has a deadline: stragglers are aborted after it

pub mod shutdown;
pub mod signals;
pub mod supervisor;

pub use shutdown::Shutdown;
pub use supervisor::Supervisor;
