use kube_metrics_collector::{
    load_config_with_env, parse_vector_response, CollectorLoop, Component, Config, CycleOutcome,
    LoopState, MemorySink, MetricSample, MockEnvironment, PlacementSource, PodPlacement,
    PrometheusSource, Snapshot, SourceError, NODE_CPU, NODE_QUERIES, POD_QUERIES,
};

use chrono::DateTime;
use std::time::Duration;

fn placement(pod: &str, ns: &str, node: Option<&str>) -> PodPlacement {
    PodPlacement {
        pod_name: pod.to_string(),
        namespace: ns.to_string(),
        node_name: node.map(|n| n.to_string()),
    }
}

struct StaticPlacements(Vec<PodPlacement>);

impl PlacementSource for StaticPlacements {
    async fn list_placements(&self) -> Result<Vec<PodPlacement>, SourceError> {
        Ok(self.0.clone())
    }
}

fn test_config(backend_url: &str) -> Config {
    Config {
        metrics_backend_url: backend_url.to_string(),
        poll_interval: Duration::from_secs(1),
        query_timeout: Duration::from_secs(2),
        cycle_deadline: Duration::from_secs(10),
        cluster_config_path: None,
        history_limit: 4,
        max_failed_cycles: 3,
    }
}

fn vector_body(key: &str, label: &str, value: f64) -> String {
    format!(
        r#"{{"status":"success","data":{{"resultType":"vector","result":[{{"metric":{{"{}":"{}"}},"value":[1700000000,"{}"]}}]}}}}"#,
        label, key, value
    )
}

async fn mock_query(server: &mut mockito::Server, expression: &str, body: &str) -> mockito::Mock {
    server
        .mock("GET", "/api/v1/query")
        .match_query(mockito::Matcher::UrlEncoded(
            "query".into(),
            expression.into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

#[tokio::test]
async fn test_full_cycle_against_mock_backend() {
    let mut server = mockito::Server::new_async().await;
    for q in NODE_QUERIES {
        mock_query(&mut server, q.expression, &vector_body("n1", "instance", 0.42)).await;
    }
    for q in POD_QUERIES {
        mock_query(&mut server, q.expression, &vector_body("a", "pod", 128.0)).await;
    }

    let config = test_config(&server.url());
    let metrics = PrometheusSource::new(&server.url(), config.query_timeout);
    let placements = StaticPlacements(vec![placement("a", "default", Some("n1"))]);
    let mut collector = CollectorLoop::new(config, placements, metrics, MemorySink::new(4));

    let outcome = collector.poll_once().await;
    match outcome {
        CycleOutcome::Published { missing, .. } => assert!(missing.is_empty()),
        other => panic!("expected full snapshot, got {:?}", other),
    }

    // worked example: placement a->n1, node cpu sample n1=0.42
    let snapshot = collector.latest().unwrap();
    assert_eq!(snapshot.node_for_pod("a"), Some("n1"));
    let node_cpu = &snapshot.node_metrics["node_cpu"];
    assert_eq!(node_cpu.len(), 1);
    assert_eq!(node_cpu[0].entity_key, "n1");
    assert!((node_cpu[0].value - 0.42).abs() < f64::EPSILON);
    let pod_mem = &snapshot.pod_metrics["pod_memory"];
    assert_eq!(pod_mem[0].entity_key, "a");
}

#[tokio::test]
async fn test_dead_backend_degrades_not_crashes() {
    let config = test_config("http://192.0.2.1:9");
    let metrics = PrometheusSource::new(&config.metrics_backend_url, Duration::from_millis(200));
    let placements = StaticPlacements(vec![placement("a", "default", Some("n1"))]);
    let mut collector = CollectorLoop::new(config, placements, metrics, MemorySink::new(4));

    let outcome = collector.poll_once().await;
    let missing = match outcome {
        CycleOutcome::Published { missing, .. } => missing,
        other => panic!("expected partial snapshot, got {:?}", other),
    };
    assert_eq!(missing.len(), 4);
    assert_eq!(collector.state(), LoopState::Idle);

    let snapshot = collector.latest().unwrap();
    assert_eq!(snapshot.placements.len(), 1);
    assert!(snapshot.is_degraded());
    assert_eq!(snapshot.missing.len(), 4);
    assert!(!snapshot.missing.contains(&Component::Placements));
}

#[tokio::test]
async fn test_empty_query_results_build_full_snapshot() {
    let mut server = mockito::Server::new_async().await;
    let empty = r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
    for q in NODE_QUERIES.iter().chain(POD_QUERIES.iter()) {
        mock_query(&mut server, q.expression, empty).await;
    }

    let config = test_config(&server.url());
    let metrics = PrometheusSource::new(&server.url(), config.query_timeout);
    let placements = StaticPlacements(vec![]);
    let mut collector = CollectorLoop::new(config, placements, metrics, MemorySink::new(4));

    // nothing matched anywhere, yet the cycle is a full success
    match collector.poll_once().await {
        CycleOutcome::Published { missing, .. } => assert!(missing.is_empty()),
        other => panic!("expected full snapshot, got {:?}", other),
    }
    let snapshot = collector.latest().unwrap();
    assert!(!snapshot.is_degraded());
    assert!(snapshot.node_metrics["node_cpu"].is_empty());
}

#[test]
fn test_snapshot_determinism_across_builds() {
    let taken_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let samples = || {
        vec![(
            "node_cpu".to_string(),
            vec![MetricSample {
                entity_key: "n1".to_string(),
                value: 0.42,
                timestamp: taken_at,
            }],
        )]
    };
    let placements = || vec![placement("a", "default", Some("n1"))];

    let first = Snapshot::build(taken_at, placements(), samples(), vec![], vec![]);
    let second = Snapshot::build(taken_at, placements(), samples(), vec![], vec![]);
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_parse_vector_response_public_surface() {
    let body = r#"{"status":"success","data":{"resultType":"vector","result":[
        {"metric":{"instance":"n1:9100"},"value":[1700000000,"0.5"]},
        {"metric":{"instance":"n2:9100"},"value":[1700000000,"0.7"]}
    ]}}"#;

    let samples = parse_vector_response(body, NODE_CPU.expression).unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[1].entity_key, "n2:9100");
}

#[test]
fn test_config_environment_isolation() {
    let config = load_config_with_env(&MockEnvironment::new()).unwrap();
    assert_eq!(config.metrics_backend_url, "http://prometheus:9090");
    assert_eq!(config.poll_interval, Duration::from_secs(60));
    assert_eq!(config.query_timeout, Duration::from_secs(10));
    assert_eq!(config.cluster_config_path, None);

    let env = MockEnvironment::new()
        .with_var("METRICS_BACKEND_URL", "http://victoria:8428")
        .with_var("POLL_INTERVAL_SECONDS", "15");
    let config = load_config_with_env(&env).unwrap();
    assert_eq!(config.metrics_backend_url, "http://victoria:8428");
    assert_eq!(config.poll_interval, Duration::from_secs(15));
}

#[test]
fn test_snapshots_total_order_by_taken_at() {
    let earlier = Snapshot::build(
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        vec![],
        vec![],
        vec![],
        vec![],
    );
    let later = Snapshot::build(
        DateTime::from_timestamp(1_700_000_060, 0).unwrap(),
        vec![],
        vec![],
        vec![],
        vec![],
    );
    assert!(earlier.taken_at < later.taken_at);
}
