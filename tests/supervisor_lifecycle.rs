//! Supervisor lifecycle tests: startup, exposition and shutdown.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use health_exporter::config::{load_config, ExporterConfig, HttpTarget};
use health_exporter::{MemorySink, MetricsSink, PrometheusSink, Shutdown, Supervisor};
use tokio::net::TcpListener;

mod common;

fn config_with_http(url: String) -> ExporterConfig {
    let mut config = ExporterConfig::default();
    config.server.listen = "127.0.0.1:0".to_string();
    config.server.shutdown_grace_ms = 500;
    config.scheduler.drain_timeout_ms = 500;
    config.targets.http.push(HttpTarget {
        name: "web".to_string(),
        url,
        rps: 20.0,
        timeout_ms: 1_000,
        ..Default::default()
    });
    config
}

#[tokio::test]
async fn test_immediate_cancellation_records_nothing() {
    let (addr, hits) = common::start_mock_backend(200).await;
    let config = config_with_http(format!("http://{}/", addr));
    let sink = Arc::new(MemorySink::new());
    let supervisor = Supervisor::from_config(&config, sink.clone()).await.unwrap();

    let shutdown = Shutdown::new();
    shutdown.trigger();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        supervisor.run_with_listener(listener, shutdown),
    )
    .await
    .expect("supervisor did not stop");

    assert!(result.is_ok());
    assert_eq!(sink.total_observations(), 0);
    assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_scrape_and_bounded_shutdown() {
    let (addr, _hits) = common::start_mock_backend(200).await;
    let config = config_with_http(format!("http://{}/", addr));
    let sink = Arc::new(PrometheusSink::new(&config.observability).unwrap());
    let supervisor = Supervisor::from_config(&config, sink).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(supervisor.run_with_listener(listener, shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(400)).await;

    let health = reqwest::get(format!("{}/healthz", base)).await.unwrap();
    assert_eq!(health.status(), 200);

    let body = reqwest::get(format!("{}/metrics", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let line = body
        .lines()
        .find(|l| {
            l.starts_with("health_http_requests_total{") && l.contains("result=\"http_success\"")
        })
        .unwrap_or_else(|| panic!("no success series in:\n{}", body));
    assert!(line.contains("name=\"web\""));
    assert!(line.contains("status_code=\"200\""));
    assert!(body.contains("health_http_duration_seconds_bucket"));

    let started = Instant::now();
    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .expect("supervisor did not stop")
        .unwrap();
    assert!(result.is_ok());
    // Grace (500ms) plus drain slack (500ms).
    assert!(started.elapsed() < Duration::from_millis(1_500));
}

#[tokio::test]
async fn test_failing_target_does_not_affect_others() {
    let (good, _) = common::start_mock_backend(200).await;
    let refused = common::refused_addr().await;

    let mut config = config_with_http(format!("http://{}/", good));
    config.targets.http.push(HttpTarget {
        name: "down".to_string(),
        url: format!("http://{}/", refused),
        rps: 20.0,
        timeout_ms: 200,
        ..Default::default()
    });
    let sink = Arc::new(MemorySink::new());
    let supervisor = Supervisor::from_config(&config, sink.clone()).await.unwrap();

    let shutdown = Shutdown::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let handle = tokio::spawn(supervisor.run_with_listener(listener, shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(520)).await;
    shutdown.trigger();
    handle.await.unwrap().unwrap();

    let name = health_exporter::observability::metrics::HTTP_REQUESTS_TOTAL;
    let good_ok = sink.counter(name, &[("name", "web"), ("result", "http_success")]);
    let down_failed = sink.counter(name, &[("name", "down"), ("result", "connection_failed")]);
    assert!(good_ok >= 8, "healthy target recorded {}", good_ok);
    assert!(down_failed >= 8, "failing target recorded {}", down_failed);
    assert_eq!(sink.counter(name, &[("name", "web"), ("result", "connection_failed")]), 0);
    assert!(sink.render().contains("down"));
}

#[tokio::test]
async fn test_config_file_end_to_end() {
    let (addr, _) = common::start_mock_backend(200).await;
    let dns = common::start_dns_responder(hickory_proto::op::ResponseCode::NoError).await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[server]
listen = "127.0.0.1:0"
shutdown_grace_ms = 200

[[targets.http]]
name = "web"
url = "http://{http}/"
rps = 10

[[targets.dns]]
name = "resolver"
domain = "example.com"
server_ip = "127.0.0.1"
server_port = {dns_port}
rps = 10
"#,
        http = addr,
        dns_port = dns.port()
    )
    .unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.targets.dns[0].record_type, "A");
    assert_eq!(config.targets.http[0].timeout_ms, 3_000);

    let sink = Arc::new(MemorySink::new());
    let supervisor = Supervisor::from_config(&config, sink.clone()).await.unwrap();
    assert_eq!(supervisor.targets().len(), 2);

    let shutdown = Shutdown::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let handle = tokio::spawn(supervisor.run_with_listener(listener, shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(350)).await;
    shutdown.trigger();
    handle.await.unwrap().unwrap();

    let metrics = health_exporter::observability::metrics::DNS_REQUESTS_TOTAL;
    assert!(sink.counter(metrics, &[("name", "resolver"), ("result", "success")]) >= 2);
    assert!(
        sink.counter(
            health_exporter::observability::metrics::HTTP_REQUESTS_TOTAL,
            &[("name", "web"), ("result", "http_success")]
        ) >= 2
    );
}
