//! Graceful shutdown with requests in flight.

use std::time::Duration;

use futures_util::future::join_all;
use lb_router::lifecycle::LifecycleState;
use reqwest::StatusCode;

mod common;

const IN_FLIGHT: usize = 50;

async fn wait_for_in_flight(router: &common::RunningRouter, n: u64) {
    while router.context.inflight.active() < n {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn in_flight_requests_finish_within_grace() {
    let backend = common::start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        (200, "done".to_string())
    })
    .await;
    let router = common::start_router(common::router_config(&[(backend, 1)]), None).await;
    let client = common::client();

    let requests: Vec<_> = (0..IN_FLIGHT)
        .map(|_| {
            let client = client.clone();
            let url = router.url("/");
            tokio::spawn(async move {
                let res = client.get(url).send().await.unwrap();
                (res.status(), res.text().await.unwrap())
            })
        })
        .collect();
    wait_for_in_flight(&router, IN_FLIGHT as u64).await;

    let context = router.context.clone();
    let report = router.stop().await;

    for joined in join_all(requests).await {
        let (status, body) = joined.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "done");
    }
    assert_eq!(report.cancelled_requests, 0);
    assert_eq!(report.telemetry.accepted, IN_FLIGHT as u64);
    assert_eq!(report.telemetry.buffered, 0);
    assert_eq!(context.inflight.active(), 0);
    assert_eq!(context.registry.get(0).unwrap().active_connections(), 0);
}

#[tokio::test]
async fn stuck_requests_are_cancelled_after_grace() {
    let backend = common::start_silent_backend().await;
    let mut config = common::router_config(&[(backend, 1)]);
    config.timeouts.shutdown_grace_ms = 200;
    config.timeouts.request_ms = 30_000;
    config.timeouts.response_header_ms = 30_000;
    let router = common::start_router(config, None).await;
    let client = common::client();

    let requests: Vec<_> = (0..IN_FLIGHT)
        .map(|_| {
            let client = client.clone();
            let url = router.url("/");
            tokio::spawn(async move { client.get(url).send().await.map(|res| res.status()) })
        })
        .collect();
    wait_for_in_flight(&router, IN_FLIGHT as u64).await;

    let context = router.context.clone();
    let report = tokio::time::timeout(Duration::from_secs(5), router.stop())
        .await
        .expect("shutdown did not finish");

    assert_eq!(report.cancelled_requests, IN_FLIGHT as u64);
    assert_eq!(report.telemetry.accepted, IN_FLIGHT as u64);
    assert_eq!(report.telemetry.buffered, 0);
    assert_eq!(context.inflight.active(), 0);
    assert_eq!(context.registry.get(0).unwrap().active_connections(), 0);

    for joined in join_all(requests).await {
        // Cancelled requests answer 503 before the connection closes.
        if let Ok(status) = joined.unwrap() {
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        }
    }
}

#[tokio::test]
async fn shutdown_trigger_is_idempotent() {
    let router = common::start_router(common::router_config(&[]), None).await;
    assert!(router.shutdown.trigger());
    assert!(!router.shutdown.trigger());
    let report = router.handle.await.unwrap().unwrap();
    assert_eq!(report.cancelled_requests, 0);
}

#[tokio::test]
async fn controller_reports_stopped() {
    let controller = lb_router::LifecycleController::start(common::router_config(&[]), None)
        .await
        .unwrap();
    let state = controller.state_cell();
    let shutdown = controller.shutdown_handle();
    let addr = controller.local_addr();
    let run = tokio::spawn(controller.run());

    while state.get() != LifecycleState::Running {
        tokio::task::yield_now().await;
    }
    shutdown.trigger();
    run.await.unwrap().unwrap();
    assert_eq!(state.get(), LifecycleState::Stopped);

    // The listener is gone.
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
