//! Probe unit: the per-target timer loop.
//!
//! # Responsibilities
//! - Fire one attempt per period derived from the target's rate
//! - Route every attempt through the target's circuit breaker
//! - Hand outcomes to the probe for classification and recording
//! - Stop on cancellation and drain detached attempts within a bound
//!
//! # Design Decisions
//! - Attempts overlap: a tick never waits for the previous attempt
//! - A soft in-flight cap drops ticks instead of queueing them
//! - Attempts are tracked so shutdown can bound outstanding work
//! - Cancelled attempts record nothing

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::SchedulerConfig;
use crate::observability::logging::LogThrottle;
use crate::observability::metrics::{BREAKER_STATE, SKIPPED_TICKS_TOTAL};
use crate::observability::MetricsSink;
use crate::probe::{Outcome, Probe, Runner, TargetId, Verdict};
use crate::resilience::circuit_breaker::{
    BreakerError, BreakerSettings, BreakerState, CircuitBreaker,
};
use crate::resilience::interval::interval_from_rate;

/// Minimum spacing between failure warnings for one target.
const WARN_PERIOD: Duration = Duration::from_secs(10);

/// Runtime state for one target.
pub struct ProbeUnit<P: Probe> {
    shared: Arc<Shared<P>>,
    period: Duration,
    in_flight: Arc<Semaphore>,
    drain_timeout: Duration,
}

struct Shared<P: Probe> {
    probe: P,
    breaker: CircuitBreaker,
    sink: Arc<dyn MetricsSink>,
    throttle: LogThrottle,
}

impl<P: Probe> ProbeUnit<P> {
    pub fn new(
        probe: P,
        breaker: BreakerSettings,
        scheduler: &SchedulerConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let id = probe.id().clone();
        let period = interval_from_rate(probe.rate());

        let gauge_sink = sink.clone();
        let labels = vec![("kind", id.kind.as_str().to_string()), ("name", id.name.clone())];
        let breaker = CircuitBreaker::new(id.to_string(), breaker).with_observer(Arc::new(
            move |_: &str, _: BreakerState, to: BreakerState| {
                gauge_sink.set_gauge(BREAKER_STATE, &labels, to.gauge_value())
            },
        ));

        Self {
            shared: Arc::new(Shared {
                probe,
                breaker,
                sink,
                throttle: LogThrottle::new(WARN_PERIOD),
            }),
            period,
            in_flight: Arc::new(Semaphore::new(scheduler.max_in_flight.max(1))),
            drain_timeout: scheduler.drain_timeout(),
        }
    }

    /// Period between ticks.
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.shared.breaker
    }

    /// Run one attempt through the breaker and record it, outside the loop.
    pub async fn probe_once(&self) -> Outcome<P::Output> {
        let outcome = self.shared.execute().await;
        self.shared.record(&outcome);
        outcome
    }

    /// Tick until `cancel` fires, then wait (bounded) for detached attempts.
    pub async fn run_loop(self, cancel: CancellationToken) {
        let id = self.shared.probe.id().clone();
        tracing::info!(
            target_id = %id,
            period_ms = self.period.as_secs_f64() * 1000.0,
            "Probe unit starting"
        );

        let tracker = TaskTracker::new();
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.fire(&tracker, &cancel),
            }
        }

        tracker.close();
        if time::timeout(self.drain_timeout, tracker.wait()).await.is_err() {
            tracing::warn!(
                target_id = %id,
                outstanding = tracker.len(),
                "Probe unit stopped with attempts still running"
            );
        }
        tracing::info!(target_id = %id, "Probe unit stopped");
    }

    fn fire(&self, tracker: &TaskTracker, cancel: &CancellationToken) {
        let permit = match self.in_flight.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let id = self.shared.probe.id();
                self.shared.sink.increment_counter(
                    SKIPPED_TICKS_TOTAL,
                    &[("kind", id.kind.as_str().to_string()), ("name", id.name.clone())],
                );
                tracing::debug!(target_id = %id, "In-flight cap reached, tick skipped");
                return;
            }
        };

        let shared = self.shared.clone();
        let cancel = cancel.clone();
        tracker.spawn(async move {
            let _permit = permit;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                outcome = shared.execute() => shared.record(&outcome),
            }
        });
    }
}

impl<P: Probe> Shared<P> {
    async fn execute(&self) -> Outcome<P::Output> {
        let start = Instant::now();
        let result = self
            .breaker
            .execute(|| async {
                let output = self.probe.attempt().await;
                if self.probe.succeeded(&output) {
                    Ok(output)
                } else {
                    Err(output)
                }
            })
            .await;

        let (output, verdict) = match result {
            Ok(output) => (output, Verdict::Passed),
            Err(BreakerError::Operation(output)) => (output, Verdict::Failed),
            Err(BreakerError::Open) | Err(BreakerError::TooManyRequests) => {
                (self.probe.rejected(), Verdict::Rejected)
            }
        };

        Outcome {
            elapsed: start.elapsed(),
            output,
            verdict,
        }
    }

    fn record(&self, outcome: &Outcome<P::Output>) {
        let result = self.probe.report(outcome, self.sink.as_ref());
        if outcome.verdict == Verdict::Passed {
            return;
        }

        let id = self.probe.id();
        let rejected = outcome.verdict == Verdict::Rejected;
        tracing::debug!(
            target_id = %id,
            result,
            rejected,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Probe attempt failed"
        );
        if let Some(suppressed) = self.throttle.allow() {
            tracing::warn!(target_id = %id, result, rejected, suppressed, "Probe target failing");
        }
    }
}

#[async_trait]
impl<P: Probe> Runner for ProbeUnit<P> {
    fn id(&self) -> &TargetId {
        self.shared.probe.id()
    }

    async fn run(self: Box<Self>, cancel: CancellationToken) {
        (*self).run_loop(cancel).await
    }
}
