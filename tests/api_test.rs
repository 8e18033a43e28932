//! HTTP API Integration Tests

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use callbot::interface::api::build_router;
use common::{app_state, prometheus_handle, FakeControl};
use serde_json::Value;
use tower::ServiceExt; // For `oneshot`

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn outbound_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/calls/outbound")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = build_router(app_state(FakeControl::new()), prometheus_handle());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"], "OK");
}

#[tokio::test]
async fn test_originate_outbound_call() {
    let control = FakeControl::new();
    let app = build_router(app_state(control.clone()), prometheus_handle());

    let response = app
        .oneshot(outbound_request(
            r#"{"phone_number":"+79133888778","transfer_to":"+15550001111"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["dispatch_id"], "AD_test");
    assert_eq!(json["data"]["agent_name"], "elaina-outbound-caller");

    let room_name = json["data"]["room_name"].as_str().unwrap();
    assert!(room_name.starts_with("outbound_79133888778_"));

    let dispatches = control.dispatches.lock().await;
    assert_eq!(dispatches.len(), 1);
    let (agent_name, dispatched_room, metadata) = &dispatches[0];
    assert_eq!(agent_name, "elaina-outbound-caller");
    assert_eq!(dispatched_room, room_name);

    let metadata: Value = serde_json::from_str(metadata).unwrap();
    assert_eq!(metadata["phone_number"], "+79133888778");
    assert_eq!(metadata["transfer_to"], "+15550001111");
}

#[tokio::test]
async fn test_originate_rejects_invalid_number() {
    let control = FakeControl::new();
    let app = build_router(app_state(control.clone()), prometheus_handle());

    let response = app
        .oneshot(outbound_request(r#"{"phone_number":"call me maybe"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].is_string());
    assert!(control.dispatches.lock().await.is_empty());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = build_router(app_state(FakeControl::new()), prometheus_handle());

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
