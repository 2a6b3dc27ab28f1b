//! Kubernetes namespace probe.
//!
//! # Responsibilities
//! - List pods (and optionally services/deployments) in one namespace
//! - Export list latency, result and per-resource object counts
//!
//! # Design Decisions
//! - Cluster access sits behind [`ClusterApi`] so the probe is testable
//! - Any failed list call fails the whole attempt

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, ListParams};
use kube::client::ClientBuilder;
use thiserror::Error;

use crate::config::K8sTarget;
use crate::observability::api_metrics::ApiMetricsLayer;
use crate::observability::metrics::{K8S_DURATION_SECONDS, K8S_REQUESTS_TOTAL, K8S_RESOURCE_COUNT};
use crate::observability::MetricsSink;
use crate::probe::classify::classify_k8s;
use crate::probe::{Outcome, Probe, ProbeKind, TargetId};

/// Object kinds the probe can list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Pods,
    Services,
    Deployments,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Pods => "pods",
            ResourceType::Services => "services",
            ResourceType::Deployments => "deployments",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ListError {
    #[error("listing {resource} failed: {message}")]
    Api {
        resource: ResourceType,
        message: String,
    },

    #[error("listing timed out")]
    Timeout,

    #[error("circuit breaker open")]
    Rejected,
}

/// Capability to count objects in a namespace.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn count(&self, namespace: &str, resource: ResourceType) -> Result<usize, ListError>;
}

/// [`ClusterApi`] backed by a `kube` client.
#[derive(Clone)]
pub struct KubeCluster {
    client: kube::Client,
}

impl KubeCluster {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    /// Build a client from in-cluster config or the local kubeconfig.
    ///
    /// Every API request the client makes is recorded into `sink`.
    pub async fn connect(sink: Arc<dyn MetricsSink>) -> Result<Self, kube::Error> {
        let config = kube::Config::infer().await.map_err(kube::Error::InferConfig)?;
        let client = ClientBuilder::try_from(config)?
            .with_layer(&ApiMetricsLayer::new(sink))
            .build();
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn count(&self, namespace: &str, resource: ResourceType) -> Result<usize, ListError> {
        let params = ListParams::default();
        let client = self.client.clone();
        let listed = match resource {
            ResourceType::Pods => Api::<Pod>::namespaced(client, namespace)
                .list(&params)
                .await
                .map(|list| list.items.len()),
            ResourceType::Services => Api::<Service>::namespaced(client, namespace)
                .list(&params)
                .await
                .map(|list| list.items.len()),
            ResourceType::Deployments => Api::<Deployment>::namespaced(client, namespace)
                .list(&params)
                .await
                .map(|list| list.items.len()),
        };

        listed.map_err(|e| ListError::Api {
            resource,
            message: e.to_string(),
        })
    }
}

/// Object counts per listed resource, or the first failure.
pub type K8sOutput = Result<Vec<(ResourceType, usize)>, ListError>;

pub struct K8sProbe {
    id: TargetId,
    target: K8sTarget,
    cluster: Arc<dyn ClusterApi>,
    resources: Vec<ResourceType>,
}

impl K8sProbe {
    pub fn new(target: K8sTarget, cluster: Arc<dyn ClusterApi>) -> Self {
        let mut resources = vec![ResourceType::Pods];
        if target.services {
            resources.push(ResourceType::Services);
        }
        if target.deployments {
            resources.push(ResourceType::Deployments);
        }

        Self {
            id: TargetId::new(ProbeKind::K8s, target.name.clone()),
            target,
            cluster,
            resources,
        }
    }

    async fn list_all(&self) -> K8sOutput {
        let mut counts = Vec::with_capacity(self.resources.len());
        for &resource in &self.resources {
            let count = self.cluster.count(&self.target.namespace, resource).await?;
            counts.push((resource, count));
        }
        Ok(counts)
    }
}

#[async_trait]
impl Probe for K8sProbe {
    type Output = K8sOutput;

    fn id(&self) -> &TargetId {
        &self.id
    }

    fn rate(&self) -> f64 {
        self.target.rps
    }

    async fn attempt(&self) -> K8sOutput {
        match tokio::time::timeout(self.target.timeout(), self.list_all()).await {
            Ok(output) => output,
            Err(_) => Err(ListError::Timeout),
        }
    }

    fn succeeded(&self, output: &K8sOutput) -> bool {
        output.is_ok()
    }

    fn rejected(&self) -> K8sOutput {
        Err(ListError::Rejected)
    }

    fn report(&self, outcome: &Outcome<K8sOutput>, sink: &dyn MetricsSink) -> &'static str {
        let result = classify_k8s(&outcome.output).as_str();
        let labels = [
            ("name", self.target.name.clone()),
            ("namespace", self.target.namespace.clone()),
            ("result", result.to_string()),
        ];
        sink.increment_counter(K8S_REQUESTS_TOTAL, &labels);
        sink.observe_histogram(K8S_DURATION_SECONDS, &labels, outcome.elapsed.as_secs_f64());

        if let Ok(counts) = &outcome.output {
            for (resource, count) in counts {
                sink.set_gauge(
                    K8S_RESOURCE_COUNT,
                    &[
                        ("name", self.target.name.clone()),
                        ("namespace", self.target.namespace.clone()),
                        ("resource_type", resource.as_str().to_string()),
                    ],
                    *count as f64,
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemorySink;
    use crate::probe::Verdict;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fixed counts; listing `fail` errors.
    struct FakeCluster {
        fail: Option<ResourceType>,
        calls: Mutex<Vec<ResourceType>>,
    }

    #[async_trait]
    impl ClusterApi for FakeCluster {
        async fn count(
            &self,
            _namespace: &str,
            resource: ResourceType,
        ) -> Result<usize, ListError> {
            self.calls.lock().unwrap().push(resource);
            if self.fail == Some(resource) {
                return Err(ListError::Api {
                    resource,
                    message: "forbidden".to_string(),
                });
            }
            Ok(match resource {
                ResourceType::Pods => 7,
                ResourceType::Services => 2,
                ResourceType::Deployments => 3,
            })
        }
    }

    fn target(services: bool, deployments: bool) -> K8sTarget {
        K8sTarget {
            name: "prod".to_string(),
            namespace: "prod".to_string(),
            rps: 1.0,
            timeout_ms: 500,
            services,
            deployments,
        }
    }

    fn cluster(fail: Option<ResourceType>) -> Arc<FakeCluster> {
        Arc::new(FakeCluster {
            fail,
            calls: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_lists_pods_only_by_default() {
        let fake = cluster(None);
        let probe = K8sProbe::new(target(false, false), fake.clone());

        assert_eq!(probe.attempt().await, Ok(vec![(ResourceType::Pods, 7)]));
        assert_eq!(*fake.calls.lock().unwrap(), vec![ResourceType::Pods]);
    }

    #[tokio::test]
    async fn test_counts_reported_as_gauges() {
        let probe = K8sProbe::new(target(true, true), cluster(None));
        let sink = MemorySink::new();
        let outcome = Outcome {
            elapsed: Duration::from_millis(12),
            output: probe.attempt().await,
            verdict: Verdict::Passed,
        };

        assert_eq!(probe.report(&outcome, &sink), "success");
        assert_eq!(sink.gauge(K8S_RESOURCE_COUNT, &[("resource_type", "pods")]), Some(7.0));
        assert_eq!(sink.gauge(K8S_RESOURCE_COUNT, &[("resource_type", "services")]), Some(2.0));
        assert_eq!(sink.gauge(K8S_RESOURCE_COUNT, &[("resource_type", "deployments")]), Some(3.0));
        assert_eq!(
            sink.counter(K8S_REQUESTS_TOTAL, &[("namespace", "prod"), ("result", "success")]),
            1
        );
    }

    #[tokio::test]
    async fn test_any_failed_list_fails_attempt() {
        let probe = K8sProbe::new(target(true, true), cluster(Some(ResourceType::Services)));
        let sink = MemorySink::new();
        let output = probe.attempt().await;
        assert!(matches!(output, Err(ListError::Api { resource: ResourceType::Services, .. })));
        assert!(!probe.succeeded(&output));

        let outcome = Outcome {
            elapsed: Duration::ZERO,
            output,
            verdict: Verdict::Failed,
        };
        assert_eq!(probe.report(&outcome, &sink), "error");
        assert_eq!(sink.gauge(K8S_RESOURCE_COUNT, &[]), None);
    }
}
