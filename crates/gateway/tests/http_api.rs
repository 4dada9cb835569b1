use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use pt_domain::config::Config;
use pt_gateway::api;
use pt_gateway::bootstrap;
use pt_gateway::state::AppState;
use pt_providers::scripted::ScriptedProvider;
use pt_providers::{LlmProvider, ProviderRegistry};

const PROFILE_JSON: &str = r#"{"name":"Anna","age":34,"gender":"female","profession":"accountant",
    "problem":"I panic before reports","symptoms":["insomnia"],"motivation":"my sister",
    "openness":"doubtful","history":"h","triggers":[],"coping":[],"defenses":[],
    "speech":"fast","resistance":"jokes","background":"b"}"#;

struct Harness {
    app: Router,
    llm: Arc<ScriptedProvider>,
    state: AppState,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.state_path = dir.path().to_path_buf();

    let llm = Arc::new(ScriptedProvider::new("scripted"));
    let registry = ProviderRegistry::from_parts(vec![llm.clone() as Arc<dyn LlmProvider>], &[]);
    let state = bootstrap::assemble(Arc::new(config), registry, None)
        .await
        .unwrap();
    let app = api::router().with_state(state.clone());
    Harness {
        app,
        llm,
        state,
        _dir: dir,
    }
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_reports_providers_and_voice() {
    let h = harness().await;
    let (status, body) = call(&h.app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["providers"], serde_json::json!(["scripted"]));
    assert_eq!(body["voice"], false);
}

#[tokio::test]
async fn turn_without_session_is_a_conflict() {
    let h = harness().await;
    let (status, body) = call(
        &h.app,
        Method::POST,
        "/v1/users/u1/turns",
        Some(serde_json::json!({"text": "Hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"]["failure"], "precondition");
    assert_eq!(h.llm.requests().len(), 0);
}

#[tokio::test]
async fn session_start_then_turn() {
    let h = harness().await;
    h.llm.push_reply(PROFILE_JSON);
    let (status, body) = call(&h.app, Method::POST, "/v1/users/u1/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "notice");
    assert!(body["text"].as_str().unwrap().contains("Anna"));

    h.llm.push_reply("I don't know where to start.");
    let (status, body) = call(
        &h.app,
        Method::POST,
        "/v1/users/u1/turns",
        Some(serde_json::json!({"text": "Hello, what brings you here?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "patient");
    assert_eq!(body["text"], "I don't know where to start.");
    // 28 chars at 30 ms each.
    assert_eq!(body["typing_ms"], 840);

    let (status, profile) = call(&h.app, Method::GET, "/v1/users/u1/profile", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["name"], "Anna");
}

#[tokio::test]
async fn replacing_a_session_needs_confirm() {
    let h = harness().await;
    h.llm.push_reply(PROFILE_JSON);
    call(&h.app, Method::POST, "/v1/users/u1/sessions", None).await;

    let (status, body) = call(&h.app, Method::POST, "/v1/users/u1/sessions", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "confirmation_required");

    h.llm.push_reply(PROFILE_JSON);
    let (status, body) = call(
        &h.app,
        Method::POST,
        "/v1/users/u1/sessions",
        Some(serde_json::json!({"confirm": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["text"].as_str().unwrap().contains("discarded"));
}

#[tokio::test]
async fn end_then_stats() {
    let h = harness().await;
    h.llm.push_reply(PROFILE_JSON);
    call(&h.app, Method::POST, "/v1/users/u1/sessions", None).await;
    h.llm.push_reply("Hi.");
    call(
        &h.app,
        Method::POST,
        "/v1/users/u1/turns",
        Some(serde_json::json!({"text": "Hello"})),
    )
    .await;

    let (status, body) = call(&h.app, Method::DELETE, "/v1/users/u1/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "notice");

    let (status, stats) = call(&h.app, Method::GET, "/v1/users/u1/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_sessions"], 1);
    assert_eq!(stats["total_exchanges"], 1);
    assert_eq!(stats["level"], "novice");
    assert!(h.state.sessions.last_session_time("u1").is_some());
}

#[tokio::test]
async fn invalid_custom_complexity_is_rejected_by_the_body() {
    let h = harness().await;
    let (status, _) = call(
        &h.app,
        Method::POST,
        "/v1/users/u1/sessions",
        Some(serde_json::json!({"complexity": 9})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(h.llm.requests().len(), 0);
}

#[tokio::test]
async fn feedback_rating_out_of_range() {
    let h = harness().await;
    let (status, body) = call(
        &h.app,
        Method::POST,
        "/v1/users/u1/feedback",
        Some(serde_json::json!({"rating": 7, "comment": "great"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"]["failure"], "invalid");

    let (status, _) = call(
        &h.app,
        Method::POST,
        "/v1/users/u1/feedback",
        Some(serde_json::json!({"rating": 5, "comment": "great"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn voice_without_transcriber_is_unavailable() {
    let h = harness().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/users/u1/voice?filename=note.ogg")
        .body(Body::from(vec![0u8; 16]))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn cache_stats_count_requests() {
    let h = harness().await;
    h.llm.push_reply(PROFILE_JSON);
    call(&h.app, Method::POST, "/v1/users/u1/sessions", None).await;

    let (status, body) = call(&h.app, Method::GET, "/v1/cache/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_requests"], 1);
    assert_eq!(body["savings_ratio"], 0.9);
}
