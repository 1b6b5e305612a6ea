use serde_json::json;

use crate::helpers::*;

fn critical_error() -> serde_json::Value {
    json!({
        "category": "error",
        "severity": "critical",
        "source": { "location": "/api/orders", "kind": "KeyError" },
        "title": "KeyError",
        "message": "'customer_id'"
    })
}

#[tokio::test]
async fn submit_requires_bearer_token_when_configured() {
    let server = TestServer::new("http://127.0.0.1:9", Some(API_KEY)).await;

    let missing = server.post("/incidents").json(&critical_error()).send().await.unwrap();
    assert_eq!(missing.status(), 401);

    let wrong = server
        .post("/incidents")
        .bearer_auth("wrong-key")
        .json(&critical_error())
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);

    assert_eq!(server.app_metrics.pipeline.snapshot().received, 0);
    server.cleanup().await;
}

#[tokio::test]
async fn submit_dispatches_then_deduplicates() {
    let mut telegram = mockito::Server::new_async().await;
    let mock = telegram
        .mock("POST", "/botTEST_TOKEN/sendMessage")
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .expect(1)
        .create_async()
        .await;
    let server = TestServer::new(&telegram.url(), Some(API_KEY)).await;

    let first = server
        .post("/incidents")
        .bearer_auth(API_KEY)
        .json(&critical_error())
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 202);
    let body: serde_json::Value = first.json().await.unwrap();
    assert_eq!(body["outcome"], "dispatched");
    assert!(body["fingerprint"].as_str().unwrap().starts_with("error:"));

    let second = server
        .post("/incidents")
        .bearer_auth(API_KEY)
        .json(&critical_error())
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["outcome"], "duplicate");

    mock.assert_async().await;
    server.cleanup().await;
}

#[tokio::test]
async fn submit_reports_filter_rule() {
    let server = TestServer::new("http://127.0.0.1:9", None).await;

    let resp = server
        .post("/incidents")
        .json(&json!({
            "category": "error",
            "source": { "location": "/health", "kind": "RuntimeError" },
            "title": "RuntimeError"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 202);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["outcome"], "ignored");
    assert_eq!(body["detail"], "/health");

    server.cleanup().await;
}

#[tokio::test]
async fn submit_rejects_malformed_incident() {
    let server = TestServer::new("http://127.0.0.1:9", None).await;

    let resp = server
        .post("/incidents")
        .json(&json!({ "category": "nonsense", "title": "x" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 422);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());

    server.cleanup().await;
}

#[tokio::test]
async fn submit_to_disabled_pipeline_is_unavailable() {
    let server = TestServer::disabled().await;

    let resp = server.post("/incidents").json(&critical_error()).send().await.unwrap();
    assert_eq!(resp.status(), 503);

    server.cleanup().await;
}
