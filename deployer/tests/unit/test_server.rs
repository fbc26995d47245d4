//! HTTP API tests

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use iis_deployer::server::serve::router;
use iis_deployer::server::state::ServerState;

use crate::support::Harness;

fn app(harness: &Harness) -> Router {
    router(Arc::new(ServerState::new(harness.orchestrator.clone())))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_health_and_version() {
    let harness = Harness::new();

    let (status, body) = send(app(&harness), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "iis-deployer");

    let (status, body) = send(app(&harness), get("/version")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_deploy_is_404() {
    let harness = Harness::new();
    let uri = format!("/deploys/{}", uuid::Uuid::new_v4());

    let (status, body) = send(app(&harness), get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().starts_with("Not found"));
}

#[tokio::test]
async fn test_invalid_request_is_400() {
    let harness = Harness::new();
    let body = r#"{"repoUrl": "", "branch": "main", "iisSiteName": "app"}"#;

    let (status, body) = send(app(&harness), post_json("/deploys", body, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("repoUrl"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_deploy_then_inspect() {
    let harness = Harness::new();
    let body = r#"{
        "repoUrl": "https://example.com/app.git",
        "branch": "main",
        "buildCommands": [
            {"text": "test -f package.json", "order": 1, "terminalId": "1"},
            {"text": "sh build.sh", "order": 2, "terminalId": "1"}
        ],
        "buildOutputRelPath": "dist",
        "iisSiteName": "app"
    }"#;

    let (status, outcome) = send(app(&harness), post_json("/deploys", body, Some("bob"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["finalStatus"], "success");
    assert_eq!(outcome["commands"].as_array().unwrap().len(), 2);

    let id = outcome["deployId"].as_str().unwrap().to_string();
    let (status, snapshot) = send(app(&harness), get(&format!("/deploys/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["deploy"]["user_id"], "bob");
    assert_eq!(snapshot["deploy"]["status"], "success");

    let (status, list) = send(app(&harness), get("/deploys")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["deploys"][0]["id"], id.as_str());
}
