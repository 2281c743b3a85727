//! Concurrent load against a single client instance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use resilient_http::{CircuitState, ResilientHttpClient};

mod common;

#[tokio::test]
async fn test_concurrent_requests_share_one_client() {
    let backend = common::start_mock_backend(200, "Hello from backend").await;

    let mut config = common::test_config(&backend.url("/"));
    config.pool.max_idle_per_host = 32;
    let client = Arc::new(ResilientHttpClient::new(config).unwrap());

    let concurrency = 20;
    let requests_per_task = 10;
    let total_requests = concurrency * requests_per_task;

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let mut ok = 0;
            for _ in 0..requests_per_task {
                if let Ok(response) = client.get("/").await {
                    if response.status == 200 {
                        ok += 1;
                    }
                }
            }
            ok
        }));
    }

    let mut successes = 0;
    for handle in handles {
        successes += handle.await.unwrap();
    }
    let elapsed = start.elapsed();

    println!(
        "Completed {} requests in {:?} ({:.0} req/s)",
        total_requests,
        elapsed,
        total_requests as f64 / elapsed.as_secs_f64()
    );

    assert_eq!(successes, total_requests);
    let metrics = client.metrics();
    assert_eq!(metrics.total_requests, total_requests as u64);
    assert_eq!(metrics.successful_requests, total_requests as u64);

    let stats = client.circuit_stats().unwrap();
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.request_count, total_requests as u64);
    assert_eq!(stats.failure_rate, 0.0);
}

#[tokio::test]
async fn test_rate_limiter_bounds_throughput() {
    let backend = common::start_mock_backend(200, "ok").await;

    let mut config = common::test_config(&backend.url("/"));
    config.rate_limit.enabled = true;
    config.rate_limit.requests_per_second = 20.0;
    config.rate_limit.burst = 5;
    let client = ResilientHttpClient::new(config).unwrap();

    let start = Instant::now();
    let mut admitted = 0;
    for _ in 0..10 {
        if client.get("/").await.is_ok() {
            admitted += 1;
        }
    }

    // Burst of five, then roughly one token per 50ms.
    assert_eq!(admitted, 10);
    assert!(start.elapsed() >= Duration::from_millis(200), "took {:?}", start.elapsed());
    assert_eq!(client.metrics().rate_limit_rejections, 0);
}
