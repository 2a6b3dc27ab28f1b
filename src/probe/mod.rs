//! Probe subsystem.
//!
//! # Data Flow
//! ```text
//! ProbeUnit (unit.rs) timer tick
//!     → CircuitBreaker::execute(Probe::attempt)
//!     → Outcome { elapsed, output, verdict }
//!     → Probe::report (classify.rs labels → MetricsSink)
//! ```
//!
//! # Design Decisions
//! - One generic unit loop; protocols only supply the attempt and its labels
//! - Every target owns its breaker, timer and in-flight budget
//! - A failing attempt is recorded, never propagated

pub mod classify;
pub mod dns;
pub mod http;
pub mod icmp;
pub mod k8s;
pub mod unit;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::observability::MetricsSink;

pub use unit::ProbeUnit;

/// Protocol a target is probed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Http,
    Dns,
    Icmp,
    K8s,
}

impl ProbeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeKind::Http => "http",
            ProbeKind::Dns => "dns",
            ProbeKind::Icmp => "icmp",
            ProbeKind::K8s => "k8s",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target identity: unique per (kind, name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetId {
    pub kind: ProbeKind,
    pub name: String,
}

impl TargetId {
    pub fn new(kind: ProbeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// How an attempt ended from the breaker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
    /// The breaker refused the attempt; nothing was sent.
    Rejected,
}

/// Result of one tick.
#[derive(Debug)]
pub struct Outcome<O> {
    pub elapsed: Duration,
    pub output: O,
    pub verdict: Verdict,
}

/// One protocol's attempt and its classification.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    type Output: Send + 'static;

    fn id(&self) -> &TargetId;

    /// Attempts per second.
    fn rate(&self) -> f64;

    /// Perform one attempt. Must finish within the target's timeout.
    async fn attempt(&self) -> Self::Output;

    /// Whether `output` counts as a success for the circuit breaker.
    fn succeeded(&self, output: &Self::Output) -> bool;

    /// Output standing in for an attempt the breaker rejected.
    fn rejected(&self) -> Self::Output;

    /// Record `outcome` into `sink`, returning its result label.
    fn report(&self, outcome: &Outcome<Self::Output>, sink: &dyn MetricsSink) -> &'static str;
}

/// A long-running loop owned by the supervisor.
#[async_trait]
pub trait Runner: Send {
    fn id(&self) -> &TargetId;

    /// Run until `cancel` fires.
    async fn run(self: Box<Self>, cancel: CancellationToken);
}
