//! Telemetry from live traffic down to the sink.

use std::time::Duration;

use lb_router::config::{SinkConfig, SinkFormat, SinkKind};
use lb_router::telemetry::MemorySink;

mod common;

#[tokio::test]
async fn csv_file_sink_receives_every_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("latency.csv");

    let backend = common::start_mock_backend("ok").await;
    let mut config = common::router_config(&[(backend, 1)]);
    config.telemetry.sink = SinkConfig {
        kind: SinkKind::File,
        path: path.to_string_lossy().into_owned(),
        format: SinkFormat::Csv,
        buffer_bytes: 4096,
    };
    let router = common::start_router(config, None).await;
    let client = common::client();

    for _ in 0..20 {
        let res = client.get(router.url("/")).send().await.unwrap();
        assert_eq!(res.text().await.unwrap(), "ok");
    }
    let report = router.stop().await;
    assert_eq!(report.telemetry.flushed, 20);
    assert_eq!(report.telemetry.buffered, 0);

    let contents = std::fs::read_to_string(&path).unwrap();
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some("timestamp,backend,latency_ms,status"));
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 20);
    for row in rows {
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), 4, "{}", row);
        assert_eq!(fields[1], backend.to_string());
        assert!(fields[2].parse::<f64>().unwrap() >= 0.0);
        assert_eq!(fields[3], "200");
    }
}

#[tokio::test]
async fn records_are_batched_in_the_background() {
    let backend = common::start_mock_backend("ok").await;
    let sink = MemorySink::new();
    let router = common::start_router(common::router_config(&[(backend, 1)]), Some(Box::new(sink.clone()))).await;
    let client = common::client();

    for _ in 0..5 {
        client.get(router.url("/")).send().await.unwrap().text().await.unwrap();
    }

    // The short timer writes partial batches without waiting for shutdown.
    let mut waited = Duration::ZERO;
    while sink.records().len() < 5 && waited < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert_eq!(sink.records().len(), 5);

    let report = router.stop().await;
    assert_eq!(report.telemetry.accepted, 5);
    assert_eq!(report.telemetry.dropped, 0);
    assert!(sink.flushes() >= 1);
}

#[tokio::test]
async fn disabled_telemetry_records_nothing() {
    let backend = common::start_mock_backend("ok").await;
    let sink = MemorySink::new();
    let mut config = common::router_config(&[(backend, 1)]);
    config.telemetry.enabled = false;
    let router = common::start_router(config, Some(Box::new(sink.clone()))).await;

    let res = common::client().get(router.url("/")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "ok");

    let report = router.stop().await;
    assert_eq!(report.telemetry.accepted, 0);
    assert!(sink.records().is_empty());
}
