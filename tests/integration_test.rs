//! Black-box HTTP tests for the recommendation engine. Each test builds a
//! fresh in-memory `AppState` (the default `Config::from_env()` backend),
//! so none of these require model files or a database.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::{get, post},
    Router,
};
use reco_engine::handlers::{
    ab_dashboard_handler, ab_end_handler, ab_start_handler, health_handler, interact_handler,
    ready_handler, recommend_handler, train_handler,
};
use reco_engine::encoder::StubEncoder;
use reco_engine::store::{MemoryStore, Store};
use reco_engine::{AppState, Config};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/recommend", post(recommend_handler))
        .route("/interact", post(interact_handler))
        .route("/train", post(train_handler))
        .route("/ab/start", post(ab_start_handler))
        .route("/ab/dashboard", get(ab_dashboard_handler))
        .route("/ab/end/:test_id", post(ab_end_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

async fn build_state() -> Arc<AppState> {
    let config = Config::from_env().expect("default config should load from environment");
    Arc::new(AppState::new(config).await.expect("in-memory state should always build"))
}

/// Builds state around a `MemoryStore` the caller still holds, so tests can
/// seed profiles/items directly instead of through the HTTP surface.
fn build_state_with_store() -> (Arc<AppState>, Arc<MemoryStore>) {
    let mem = Arc::new(MemoryStore::new());
    let config = Config::from_env().expect("default config should load from environment");
    let state = Arc::new(AppState::from_parts(mem.clone(), Arc::new(StubEncoder), config));
    (state, mem)
}

async fn json_request(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = match method {
        "GET" => Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap(),
        "POST" => Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.unwrap_or(json!({})).to_string()))
            .unwrap(),
        _ => panic!("unsupported method"),
    };

    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));
    (status, body)
}

#[tokio::test]
async fn health_endpoint_returns_200() {
    let state = build_state().await;
    let app = test_app(state);
    let (status, body) = json_request(app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn ready_endpoint_returns_200() {
    let state = build_state().await;
    let app = test_app(state);
    let (status, body) = json_request(app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn recommend_for_unknown_user_returns_empty_list() {
    let state = build_state().await;
    let app = test_app(state);
    let body = json!({"user_id": Uuid::new_v4(), "k": 5});
    let (status, response) = json_request(app, "POST", "/recommend", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn recommend_rejects_k_of_zero() {
    let state = build_state().await;
    let app = test_app(state);
    let body = json!({"user_id": Uuid::new_v4(), "k": 0});
    let (status, _) = json_request(app, "POST", "/recommend", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn recommend_returns_similarity_ranked_items_for_a_seeded_user() {
    let (state, mem) = build_state_with_store();
    let user_id = Uuid::new_v4();
    mem.put_profile(reco_engine::domain::UserProfile {
        user_id,
        interests: vec!["rust".into()],
        languages: vec![],
        frameworks: vec![],
        learning_goals: None,
        skill_level: None,
    });
    for i in 0..5 {
        mem.put_item(reco_engine::domain::Item {
            item_id: Uuid::new_v4(),
            title: format!("project {i}"),
            description: "a rust project".into(),
            domain_tag: "web".into(),
            complexity_level: reco_engine::domain::SkillLevel::Beginner,
            embedding: reco_engine::domain::Embedding::new(vec![
                1.0;
                reco_engine::domain::EMBEDDING_DIM
            ]),
        });
    }

    let app = test_app(state);
    let body = json!({"user_id": user_id, "k": 3});
    let (status, response) = json_request(app, "POST", "/recommend", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["results"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn interact_click_returns_positive_reward() {
    let state = build_state().await;
    let app = test_app(state);
    let body = json!({
        "user_id": Uuid::new_v4(),
        "item_id": Uuid::new_v4(),
        "kind": "click",
        "position": 1,
    });
    let (status, response) = json_request(app, "POST", "/interact", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response["reward"].as_f64().unwrap() > 0.0);
    assert_eq!(response["updated"], true);
}

#[tokio::test]
async fn train_does_not_double_count_a_real_time_absorbed_interaction() {
    let (state, mem) = build_state_with_store();
    let app = test_app(state);
    let item_id = Uuid::new_v4();

    let interact_body = json!({
        "user_id": Uuid::new_v4(),
        "item_id": item_id,
        "kind": "click",
        "position": 1,
    });
    let (status, response) = json_request(app.clone(), "POST", "/interact", Some(interact_body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["updated"], true);

    let stat_after_interact = mem.get_bandit(item_id).await.unwrap();
    assert!(stat_after_interact.alpha > 2.0);

    let train_body = json!({"days": 7});
    let (status, train_response) = json_request(app, "POST", "/train", Some(train_body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        train_response["interactions_processed"], 0,
        "the interaction was already absorbed in real time and must not be replayed"
    );

    let stat_after_train = mem.get_bandit(item_id).await.unwrap();
    assert_eq!(stat_after_interact.alpha, stat_after_train.alpha);
    assert_eq!(stat_after_interact.beta, stat_after_train.beta);
}

#[tokio::test]
async fn interact_rejects_negative_duration() {
    let state = build_state().await;
    let app = test_app(state);
    let body = json!({
        "user_id": Uuid::new_v4(),
        "item_id": Uuid::new_v4(),
        "kind": "click",
        "position": 1,
        "duration_s": -5.0,
    });
    let (status, _) = json_request(app, "POST", "/interact", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn train_with_no_interactions_is_a_no_op() {
    let state = build_state().await;
    let app = test_app(state);
    let body = json!({"days": 7});
    let (status, response) = json_request(app, "POST", "/train", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["interactions_processed"], 0);
    assert_eq!(response["items_updated"], 0);
}

#[tokio::test]
async fn ab_dashboard_without_an_active_test_returns_404() {
    let state = build_state().await;
    let app = test_app(state);
    let (status, _) = json_request(app, "GET", "/ab/dashboard", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ab_start_then_second_start_conflicts() {
    let state = build_state().await;
    let app = test_app(state.clone());
    let body = json!({"test_name": "rl-vs-similarity", "control_pct": 50});
    let (status, response) = json_request(app, "POST", "/ab/start", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response["test_id"].is_string());

    let app = test_app(state);
    let (status, _) = json_request(app, "POST", "/ab/start", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn ab_start_rejects_out_of_range_control_pct() {
    let state = build_state().await;
    let app = test_app(state);
    let body = json!({"test_name": "bad-pct", "control_pct": 150});
    let (status, _) = json_request(app, "POST", "/ab/start", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ab_end_without_an_active_test_returns_404() {
    let state = build_state().await;
    let app = test_app(state);
    let uri = format!("/ab/end/{}", Uuid::new_v4());
    let (status, _) = json_request(app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
