// tests/api_http.rs
//
// HTTP-level tests for the dashboard Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Registries point at a wiremock server that must never be called: every
// refresh here runs in sample mode.

use axum::{
    body::{self, Body},
    Router,
};
use http::{Request, StatusCode};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _;
use wiremock::{Mock, MockServer, ResponseTemplate};

use wapyrus::{AppConfig, AppState};

const BODY_LIMIT: usize = 1024 * 1024;

struct TestApp {
    router: Router,
    _server: MockServer,
    dir: tempfile::TempDir,
}

async fn test_app() -> TestApp {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = AppConfig {
        ctgov_base_url: server.uri(),
        euctr_search_url: format!("{}/search", server.uri()),
        snapshot_path: dir.path().join("kb.json"),
        ..AppConfig::default()
    };
    let state = AppState::from_config(cfg).expect("state");
    let router = wapyrus::app_with_state(state).expect("app");
    TestApp {
        router,
        _server: server,
        dir,
    }
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

#[tokio::test]
async fn health_returns_ok() {
    let app = test_app().await;
    let resp = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).expect("req"))
        .await
        .expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await.trim(), "ok");
}

#[tokio::test]
async fn dashboard_renders_before_any_refresh() {
    let app = test_app().await;
    let resp = app
        .router
        .oneshot(Request::get("/").body(Body::empty()).expect("req"))
        .await
        .expect("oneshot /");
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_string(resp).await;
    assert!(html.contains("No data yet"));
    assert!(html.contains("Refresh clinical trials"));
}

#[tokio::test]
async fn sample_refresh_flows_into_trials_diagnostics_and_snapshot() {
    let app = test_app().await;

    let payload = json!({
        "keyword": "medtech",
        "max_records": 5,
        "sample": { "ctgov": true, "euctr": true }
    });
    let resp = app
        .router
        .clone()
        .oneshot(
            Request::post("/api/refresh")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .expect("req"),
        )
        .await
        .expect("oneshot /api/refresh");
    assert_eq!(resp.status(), StatusCode::OK);
    let report: Json = serde_json::from_str(&body_string(resp).await).expect("json");
    assert_eq!(report["diagnostics"]["state"], "sample_only");
    assert_eq!(report["diagnostics"]["real_count"], 0);

    let resp = app
        .router
        .clone()
        .oneshot(Request::get("/api/trials").body(Body::empty()).expect("req"))
        .await
        .expect("oneshot /api/trials");
    let v: Json = serde_json::from_str(&body_string(resp).await).expect("json");
    let trials = v["trials"].as_array().expect("trials array");
    assert!(!trials.is_empty());
    assert_eq!(v["count"].as_u64(), Some(trials.len() as u64));
    assert!(trials
        .iter()
        .all(|t| t["source"].as_str().is_some_and(|s| s.ends_with("(sample)"))));

    let resp = app
        .router
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).expect("req"))
        .await
        .expect("oneshot /");
    let html = body_string(resp).await;
    assert!(html.contains("Sample mode"));
    assert!(html.contains("SAMPLE</span>"));
    assert!(
        html.contains(&format!("{} records</p>", trials.len())),
        "snapshot info should count the saved records"
    );

    assert!(app.dir.path().join("kb.json").exists(), "snapshot written");
}

#[tokio::test]
async fn form_refresh_redirects_home() {
    let app = test_app().await;
    let resp = app
        .router
        .clone()
        .oneshot(
            Request::post("/refresh")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from("keyword=stent&max_records=3&sample_ctgov=on&sample_euctr=on"))
                .expect("req"),
        )
        .await
        .expect("oneshot /refresh");
    assert!(resp.status().is_redirection());
    assert_eq!(
        resp.headers().get("location").and_then(|v| v.to_str().ok()),
        Some("/")
    );

    let resp = app
        .router
        .oneshot(Request::get("/api/diagnostics").body(Body::empty()).expect("req"))
        .await
        .expect("oneshot /api/diagnostics");
    let v: Json = serde_json::from_str(&body_string(resp).await).expect("json");
    assert_eq!(v["keyword"], "stent");
}

#[tokio::test]
async fn diagnostics_is_null_before_refresh_and_metrics_are_exposed() {
    let app = test_app().await;
    let resp = app
        .router
        .clone()
        .oneshot(Request::get("/api/diagnostics").body(Body::empty()).expect("req"))
        .await
        .expect("oneshot");
    assert_eq!(body_string(resp).await.trim(), "null");

    let resp = app
        .router
        .oneshot(Request::get("/metrics").body(Body::empty()).expect("req"))
        .await
        .expect("oneshot /metrics");
    assert_eq!(resp.status(), StatusCode::OK);
}
