use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn status_endpoint_returns_status_json() {
    let server = TestServer::new("http://127.0.0.1:9", None).await;

    let resp = server.get("/status").await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["environment"], "test");
    assert_eq!(body["enabled"], true);
    assert!(body["uptime_secs"].as_u64().is_some());
    assert_eq!(body["in_flight_deliveries"], 0);
    assert_eq!(body["pending_batch"], 0);
    assert_eq!(body["metrics"]["received"], 0);

    server.cleanup().await;
}

#[tokio::test]
async fn status_reflects_batched_incident() {
    let server = TestServer::new("http://127.0.0.1:9", None).await;

    let resp = server
        .post("/incidents")
        .json(&json!({
            "category": "slow_request",
            "severity": "warning",
            "source": { "location": "/reports", "kind": "GET" },
            "title": "Slow request GET /reports"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let body: serde_json::Value = server.get("/status").await.json().await.unwrap();
    assert_eq!(body["pending_batch"], 1);
    assert_eq!(body["metrics"]["received"], 1);
    assert_eq!(body["metrics"]["batched"], 1);

    server.cleanup().await;
}
