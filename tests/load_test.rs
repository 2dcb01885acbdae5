//! Load testing for the gateway's admission control.

use std::time::Instant;

use reqwest::StatusCode;
use serde_json::json;

mod common;

#[tokio::test]
async fn test_concurrent_burst_admits_exactly_capacity() {
    let upstream = common::start_mock_upstream(200, json!({"teams": []})).await;
    let mut config = common::gateway_config(&upstream.url());
    config.rate_limit.requests_per_minute = 10;
    let gateway = common::start_gateway(config).await;

    let client = common::client();
    let url = gateway.url("/api/proxy/scoreboard");
    let concurrency = 50;
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            client
                .get(url)
                .header("x-forwarded-for", "203.0.113.7")
                .send()
                .await
                .unwrap()
                .status()
        }));
    }

    let mut admitted = 0;
    let mut denied = 0;
    for task in tasks {
        match task.await.unwrap() {
            StatusCode::OK => admitted += 1,
            StatusCode::TOO_MANY_REQUESTS => denied += 1,
            other => panic!("unexpected status {}", other),
        }
    }

    println!("\n--- Burst Results ---");
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", start.elapsed());
    println!("Admitted:       {}", admitted);
    println!("Denied:         {}", denied);
    println!("---------------------\n");

    assert_eq!(admitted, 10);
    assert_eq!(denied, 40);
    assert_eq!(upstream.hits(), 10);

    gateway.shutdown.trigger();
}
