//! Circuit breaker for target protection.
//!
//! # States
//! - Closed: normal operation, attempts pass through
//! - Open: target assumed down, attempts fail fast
//! - Half-Open: testing if target recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: requests >= min_requests && failures/requests >= failure_ratio
//! Open → Half-Open: after cooldown
//! Half-Open → Closed: half_open_max_requests consecutive successes
//! Half-Open → Open: any trial fails
//! ```
//!
//! # Design Decisions
//! - Per-target circuit breaker (never shared between targets)
//! - Fail fast in Open state (operation not invoked)
//! - Closed-state counts roll over every `interval`
//! - Results from a previous generation (state epoch) are ignored

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::config::BreakerConfig;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    HalfOpen,
    Open,
}

impl BreakerState {
    /// Gauge encoding: 0=closed, 1=half-open, 2=open.
    pub fn gauge_value(self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::HalfOpen => 1.0,
            BreakerState::Open => 2.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::HalfOpen => "half-open",
            BreakerState::Open => "open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub min_requests: u32,
    pub failure_ratio: f64,
    /// Closed-state counting window; zero keeps counts until a transition.
    pub interval: Duration,
    pub cooldown: Duration,
    pub half_open_max_requests: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&BreakerConfig::default())
    }
}

impl From<&BreakerConfig> for BreakerSettings {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            min_requests: config.min_requests,
            failure_ratio: config.failure_ratio,
            interval: Duration::from_millis(config.interval_ms),
            cooldown: Duration::from_millis(config.cooldown_ms),
            half_open_max_requests: config.half_open_max_requests.max(1),
        }
    }
}

/// Why a call did not produce the operation's own success.
#[derive(Debug, Error, PartialEq)]
pub enum BreakerError<E> {
    /// The breaker is open; the operation was not invoked.
    #[error("circuit breaker is open")]
    Open,

    /// Half-open trial quota is in use; the operation was not invoked.
    #[error("too many trial requests while half-open")]
    TooManyRequests,

    /// The operation ran and failed.
    #[error("operation failed: {0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// True when the operation was never invoked.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, BreakerError::Operation(_))
    }
}

/// Request/result tallies for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.requests as f64
        }
    }
}

/// Callback fired on every transition as `(breaker name, from, to)`.
pub type StateObserver = Arc<dyn Fn(&str, BreakerState, BreakerState) + Send + Sync>;

struct Inner {
    state: BreakerState,
    generation: u64,
    counts: Counts,
    /// End of the closed window or of the open cooldown.
    expiry: Option<Instant>,
}

type Transition = (BreakerState, BreakerState);

/// Rolling-window circuit breaker around a fallible async operation.
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
    observer: Option<StateObserver>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        let expiry = closed_expiry(&settings, Instant::now());
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
            observer: None,
        }
    }

    /// Report every state transition to `observer`.
    pub fn with_observer(mut self, observer: StateObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, applying any time-based transition that is due.
    pub fn state(&self) -> BreakerState {
        let (state, transitions) = {
            let mut inner = self.lock();
            let mut transitions = Vec::new();
            self.current_state(&mut inner, Instant::now(), &mut transitions);
            (inner.state, transitions)
        };
        self.notify(transitions);
        state
    }

    /// Snapshot of the current generation's counts.
    pub fn counts(&self) -> Counts {
        self.lock().counts
    }

    /// Run `operation` unless the breaker rejects it, recording its result.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = self.before_request()?;
        // If this future is dropped (shutdown), the request stays counted with no result.
        let result = operation().await;
        self.after_request(generation, result.is_ok());
        result.map_err(BreakerError::Operation)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }

    fn before_request<E>(&self) -> Result<u64, BreakerError<E>> {
        let mut transitions = Vec::new();
        let result = {
            let mut inner = self.lock();
            let now = Instant::now();
            self.current_state(&mut inner, now, &mut transitions);

            match inner.state {
                BreakerState::Open => Err(BreakerError::Open),
                BreakerState::HalfOpen
                    if inner.counts.requests >= self.settings.half_open_max_requests =>
                {
                    Err(BreakerError::TooManyRequests)
                }
                _ => {
                    inner.counts.on_request();
                    Ok(inner.generation)
                }
            }
        };
        self.notify(transitions);
        result
    }

    fn after_request(&self, generation: u64, success: bool) {
        let mut transitions = Vec::new();
        {
            let mut inner = self.lock();
            let now = Instant::now();
            self.current_state(&mut inner, now, &mut transitions);
            if inner.generation != generation {
                return;
            }

            if success {
                inner.counts.on_success();
                if inner.state == BreakerState::HalfOpen
                    && inner.counts.consecutive_successes >= self.settings.half_open_max_requests
                {
                    self.set_state(&mut inner, BreakerState::Closed, now, &mut transitions);
                }
            } else {
                inner.counts.on_failure();
                match inner.state {
                    BreakerState::Closed if self.ready_to_trip(&inner.counts) => {
                        self.set_state(&mut inner, BreakerState::Open, now, &mut transitions);
                    }
                    BreakerState::HalfOpen => {
                        self.set_state(&mut inner, BreakerState::Open, now, &mut transitions);
                    }
                    _ => {}
                }
            }
        }
        self.notify(transitions);
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.settings.min_requests
            && counts.failure_ratio() >= self.settings.failure_ratio
    }

    fn current_state(&self, inner: &mut Inner, now: Instant, transitions: &mut Vec<Transition>) {
        match (inner.state, inner.expiry) {
            (BreakerState::Closed, Some(expiry)) if expiry <= now => {
                self.new_generation(inner, now);
            }
            (BreakerState::Open, Some(expiry)) if expiry <= now => {
                self.set_state(inner, BreakerState::HalfOpen, now, transitions);
            }
            _ => {}
        }
    }

    fn set_state(
        &self,
        inner: &mut Inner,
        to: BreakerState,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        self.new_generation(inner, now);
        transitions.push((from, to));
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            BreakerState::Closed => closed_expiry(&self.settings, now),
            BreakerState::Open => Some(now + self.settings.cooldown),
            BreakerState::HalfOpen => None,
        };
    }

    fn notify(&self, transitions: Vec<Transition>) {
        for (from, to) in transitions {
            tracing::info!(
                breaker = %self.name,
                from = %from,
                to = %to,
                "Circuit breaker state changed"
            );
            if let Some(observer) = &self.observer {
                observer(&self.name, from, to);
            }
        }
    }
}

fn closed_expiry(settings: &BreakerSettings, now: Instant) -> Option<Instant> {
    if settings.interval.is_zero() {
        None
    } else {
        Some(now + settings.interval)
    }
}
