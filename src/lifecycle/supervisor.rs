//! Supervisor: owns every probe unit and the exposition server.
//!
//! # Responsibilities
//! - Build one probe unit per configured target
//! - Bind the exposition listener before anything starts
//! - Start all units concurrently, each with its own cancellation token
//! - Keep the metrics recorder compacted while running
//! - On shutdown, wait for the server and every loop within a deadline
//!
//! # Design Decisions
//! - Units are type-erased behind [`Runner`] so protocols share one loop
//! - A unit that panics is logged; the others keep running
//! - Stragglers past the deadline are aborted, never awaited forever

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tokio::time;

use crate::config::{ExporterConfig, SchedulerConfig};
use crate::error::ExporterError;
use crate::http::ExpositionServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics::{spawn_upkeep, UPKEEP_INTERVAL};
use crate::observability::MetricsSink;
use crate::probe::dns::DnsProbe;
use crate::probe::http::HttpProbe;
use crate::probe::icmp::IcmpProbe;
use crate::probe::k8s::{ClusterApi, K8sProbe, KubeCluster};
use crate::probe::{Probe, ProbeUnit, Runner, TargetId};
use crate::resilience::circuit_breaker::BreakerSettings;

pub struct Supervisor {
    listen: String,
    grace: Duration,
    breaker: BreakerSettings,
    scheduler: SchedulerConfig,
    sink: Arc<dyn MetricsSink>,
    runners: Vec<Box<dyn Runner>>,
}

impl Supervisor {
    /// Empty supervisor using the server, breaker and scheduler settings of `config`.
    pub fn new(config: &ExporterConfig, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            listen: config.server.listen.clone(),
            grace: config.server.shutdown_grace(),
            breaker: BreakerSettings::from(&config.breaker),
            scheduler: config.scheduler.clone(),
            sink,
            runners: Vec::new(),
        }
    }

    /// Supervisor with one unit per configured target.
    ///
    /// The Kubernetes client is only built when Kubernetes probing is enabled.
    pub async fn from_config(
        config: &ExporterConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self, ExporterError> {
        let mut supervisor = Self::new(config, sink);
        let targets = &config.targets;

        for target in &targets.http {
            tracing::info!(
                name = %target.name,
                url = %target.url,
                rps = target.rps,
                "Configuring HTTP probe"
            );
            supervisor.add_probe(HttpProbe::new(target.clone()));
        }

        for target in &targets.dns {
            tracing::info!(
                name = %target.name,
                domain = %target.domain,
                server = %format!("{}:{}", target.server_ip, target.server_port),
                rps = target.rps,
                "Configuring DNS probe"
            );
            supervisor.add_probe(DnsProbe::new(target.clone()));
        }

        for target in &targets.icmp {
            tracing::info!(
                name = %target.name,
                host = %target.host,
                ttl = target.ttl,
                rps = target.rps,
                "Configuring ICMP probe"
            );
            supervisor.add_probe(IcmpProbe::new(target.clone()));
        }

        if targets.k8s.enabled && !targets.k8s.simple_probe.is_empty() {
            tracing::info!("Kubernetes probing enabled");
            let cluster: Arc<dyn ClusterApi> =
                Arc::new(KubeCluster::connect(supervisor.sink.clone()).await?);
            for target in &targets.k8s.simple_probe {
                tracing::info!(
                    namespace = %target.namespace,
                    rps = target.rps,
                    "Configuring Kubernetes probe"
                );
                supervisor.add_probe(K8sProbe::new(target.clone(), cluster.clone()));
            }
        }

        Ok(supervisor)
    }

    /// Wrap `probe` in a unit with this supervisor's breaker and scheduler settings.
    pub fn add_probe<P: Probe>(&mut self, probe: P) {
        let unit = ProbeUnit::new(
            probe,
            self.breaker.clone(),
            &self.scheduler,
            self.sink.clone(),
        );
        self.add_runner(Box::new(unit));
    }

    pub fn add_runner(&mut self, runner: Box<dyn Runner>) {
        self.runners.push(runner);
    }

    pub fn targets(&self) -> Vec<TargetId> {
        self.runners.iter().map(|r| r.id().clone()).collect()
    }

    /// Bind the configured address and run until `shutdown` fires.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ExporterError> {
        let listener = ExpositionServer::bind(&self.listen).await?;
        self.run_with_listener(listener, shutdown).await
    }

    /// Run on an already bound listener until `shutdown` fires.
    ///
    /// Returns an error only if the exposition server fails.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: Shutdown,
    ) -> Result<(), ExporterError> {
        let Self {
            grace,
            scheduler,
            sink,
            runners,
            ..
        } = self;

        let mut upkeep = spawn_upkeep(sink.clone(), UPKEEP_INTERVAL, shutdown.subscribe());
        let server = ExpositionServer::new(sink, grace);
        let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

        let mut loops = JoinSet::new();
        let units = runners.len();
        for runner in runners {
            loops.spawn(runner.run(shutdown.subscribe()));
        }
        tracing::info!(units, "Supervisor started");

        let mut failure = None;
        let server_done = tokio::select! {
            _ = shutdown.wait() => false,
            joined = &mut server_task => {
                failure = server_failure(joined);
                true
            }
        };
        if !shutdown.is_triggered() {
            tracing::error!("Exposition server exited, stopping probes");
            shutdown.trigger();
        }

        let deadline = grace + scheduler.drain_timeout();
        let drain = async {
            let server = if server_done {
                None
            } else {
                Some((&mut server_task).await)
            };
            while let Some(joined) = loops.join_next().await {
                if let Err(error) = joined {
                    log_unit_failure(&error);
                }
            }
            let _ = (&mut upkeep).await;
            server
        };
        let drained = time::timeout(deadline, drain).await;

        match drained {
            Ok(Some(joined)) => {
                if failure.is_none() {
                    failure = server_failure(joined);
                }
            }
            Ok(None) => {}
            Err(_) => {
                tracing::warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    remaining_units = loops.len(),
                    "Shutdown deadline reached, aborting remaining tasks"
                );
                loops.abort_all();
                server_task.abort();
                upkeep.abort();
            }
        }

        tracing::info!("Supervisor stopped");
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn server_failure(joined: Result<Result<(), ExporterError>, JoinError>) -> Option<ExporterError> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(error),
        Err(error) => Some(ExporterError::Server(std::io::Error::other(error))),
    }
}

fn log_unit_failure(error: &JoinError) {
    if error.is_panic() {
        tracing::error!(%error, "Probe unit panicked");
    } else {
        tracing::debug!(%error, "Probe unit cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpTarget;
    use crate::observability::MemorySink;
    use crate::probe::ProbeKind;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    /// Runner that ignores cancellation entirely.
    struct Stubborn(TargetId);

    #[async_trait]
    impl Runner for Stubborn {
        fn id(&self) -> &TargetId {
            &self.0
        }

        async fn run(self: Box<Self>, _cancel: CancellationToken) {
            std::future::pending::<()>().await;
        }
    }

    /// Runner that panics immediately.
    struct Panicking(TargetId);

    #[async_trait]
    impl Runner for Panicking {
        fn id(&self) -> &TargetId {
            &self.0
        }

        async fn run(self: Box<Self>, _cancel: CancellationToken) {
            panic!("unit failure");
        }
    }

    fn config() -> ExporterConfig {
        let mut config = ExporterConfig::default();
        config.server.listen = "127.0.0.1:0".to_string();
        config.server.shutdown_grace_ms = 100;
        config.scheduler.drain_timeout_ms = 100;
        config
    }

    #[tokio::test]
    async fn test_from_config_builds_one_unit_per_target() {
        let mut config = config();
        for name in ["a", "b"] {
            config.targets.http.push(HttpTarget {
                name: name.to_string(),
                url: "http://127.0.0.1:1/".to_string(),
                rps: 1.0,
                timeout_ms: 100,
                ..Default::default()
            });
        }

        let supervisor = Supervisor::from_config(&config, Arc::new(MemorySink::new()))
            .await
            .unwrap();
        let names: Vec<_> = supervisor.targets().into_iter().map(|id| id.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_stubborn_unit_is_aborted_after_deadline() {
        let mut supervisor = Supervisor::new(&config(), Arc::new(MemorySink::new()));
        supervisor.add_runner(Box::new(Stubborn(TargetId::new(ProbeKind::Http, "stuck"))));

        let shutdown = Shutdown::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let handle = tokio::spawn(supervisor.run_with_listener(listener, shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();

        let result = time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[tokio::test]
    async fn test_panicking_unit_is_absorbed() {
        let mut supervisor = Supervisor::new(&config(), Arc::new(MemorySink::new()));
        supervisor.add_runner(Box::new(Panicking(TargetId::new(ProbeKind::Dns, "bad"))));

        let shutdown = Shutdown::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let handle = tokio::spawn(supervisor.run_with_listener(listener, shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        shutdown.trigger();

        let result = time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = config();
        config.server.listen = taken.local_addr().unwrap().to_string();

        let supervisor = Supervisor::new(&config, Arc::new(MemorySink::new()));
        let result = supervisor.run(Shutdown::new()).await;
        assert!(matches!(result, Err(ExporterError::Bind { .. })));
    }
}
