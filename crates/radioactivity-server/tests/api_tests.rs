//! Integration tests for the HTTP API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. This validates handler logic and routing
//! without needing a live network connection.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use radioactivity_core::aggregator::Aggregator;
use radioactivity_core::decay::DecayProfile;
use radioactivity_core::emitter::{Emitter, EmitterSettings};
use radioactivity_core::ingest::IngestionEndpoint;
use radioactivity_core::signing::IncidentSigner;
use radioactivity_core::store::{MemoryScoreStore, ScoreStore, ScoreUpdate, StoreError};
use radioactivity_server::router::build_router;
use radioactivity_server::state::AppState;
use radioactivity_server::{ServerConfig, spawn_server};
use radioactivity_types::{EntityId, Score};
use serde_json::{Value, json};
use tower::ServiceExt;

fn make_state_with(store: Arc<dyn ScoreStore>, signer: Option<IncidentSigner>) -> AppState {
    let aggregator = Arc::new(Aggregator::new(
        store,
        DecayProfile::count(),
        Duration::from_secs(3600),
        Duration::from_millis(500),
    ));
    let ingest = IngestionEndpoint::new(aggregator, signer.clone(), Duration::from_secs(300));
    let settings = EmitterSettings {
        display: true,
        ..EmitterSettings::default()
    };
    let emitter = Emitter::new(settings, signer).unwrap();
    AppState::new(ingest, emitter)
}

fn make_test_state() -> Arc<AppState> {
    Arc::new(make_state_with(Arc::new(MemoryScoreStore::new(8)), None))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// A store whose backend is permanently down.
struct DownStore;

#[async_trait]
impl ScoreStore for DownStore {
    async fn get(&self, _: &EntityId) -> Result<Option<Score>, StoreError> {
        Err(down())
    }

    async fn upsert(&self, _: Score) -> Result<(), StoreError> {
        Err(down())
    }

    async fn update(
        &self,
        _: &EntityId,
        _: ScoreUpdate<'_>,
    ) -> Result<Option<Score>, StoreError> {
        Err(down())
    }

    async fn remove(&self, _: &EntityId) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn scan(&self) -> Result<Vec<Score>, StoreError> {
        Err(down())
    }

    fn backend_name(&self) -> &'static str {
        "down"
    }
}

fn down() -> StoreError {
    StoreError::Unavailable {
        message: "connection refused".to_owned(),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_index_returns_html() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.contains("text/html"));
}

#[tokio::test]
async fn test_health() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["store"], "memory");
}

#[tokio::test]
async fn test_batch_with_one_invalid_item() {
    let state = make_test_state();
    let router = build_router(Arc::clone(&state));

    let batch = json!([
        {"entity_id": "E1", "energy": 100},
        {"entity_id": "E2", "energy": -5},
        {"entity_id": "E1", "energy": 50},
    ]);
    let response = router
        .clone()
        .oneshot(post_json("/api/incidents", &batch))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["accepted"], 2);
    assert_eq!(json["rejected"], 1);
    assert_eq!(json["failed"], 0);
    assert_eq!(json["items"][1]["index"], 1);
    assert_eq!(json["items"][1]["entity_id"], "E2");
    assert_eq!(json["items"][1]["outcome"]["status"], "rejected");
    assert_eq!(json["items"][1]["outcome"]["reason"]["code"], "negative_energy");

    let response = router
        .clone()
        .oneshot(Request::get("/api/scores/E1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["entity_id"], "E1");
    assert!((json["value"].as_f64().unwrap() - 150.0).abs() < 1e-9);
    assert_eq!(json["state"], "active");

    let response = router
        .oneshot(Request::get("/api/scores/E2").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_wrapped_batch_is_accepted() {
    let router = build_router(make_test_state());

    let body = json!({"incidents": [{"entity_id": "node:1", "energy": 1.5}]});
    let response = router
        .oneshot(post_json("/api/incidents", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["accepted"], 1);
}

#[tokio::test]
async fn test_empty_batch() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(post_json("/api/incidents", &json!([])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["accepted"], 0);
    assert_eq!(json["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_non_batch_body_is_bad_request() {
    let router = build_router(make_test_state());

    let response = router
        .clone()
        .oneshot(post_json("/api/incidents", &json!("E1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 400);

    let response = router
        .oneshot(
            Request::post("/api/incidents")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_batch_is_refused() {
    let state = Arc::new(
        make_state_with(Arc::new(MemoryScoreStore::new(2)), None).with_max_batch_size(2),
    );
    let router = build_router(Arc::clone(&state));

    let batch = json!([
        {"entity_id": "E1", "energy": 1},
        {"entity_id": "E1", "energy": 1},
        {"entity_id": "E1", "energy": 1},
    ]);
    let response = router
        .oneshot(post_json("/api/incidents", &batch))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 413);

    // Nothing from the refused batch was applied.
    let score = state
        .aggregator()
        .score_at(&EntityId::parse("E1").unwrap(), chrono::Utc::now())
        .await
        .unwrap();
    assert!(score.is_none());
}

#[tokio::test]
async fn test_invalid_entity_id_in_path() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(
            Request::get("/api/scores/%20padded")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_scores_orders_and_limits() {
    let router = build_router(make_test_state());

    let batch = json!([
        {"entity_id": "low", "energy": 1},
        {"entity_id": "high", "energy": 30},
        {"entity_id": "mid", "energy": 20},
    ]);
    router
        .clone()
        .oneshot(post_json("/api/incidents", &batch))
        .await
        .unwrap();

    let response = router
        .oneshot(
            Request::get("/api/scores?limit=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["count"], 2);
    assert_eq!(json["scores"][0]["entity_id"], "high");
    assert_eq!(json["scores"][1]["entity_id"], "mid");
}

#[tokio::test]
async fn test_store_down_reports_each_item() {
    let state = Arc::new(make_state_with(Arc::new(DownStore), None));
    let router = build_router(state);

    let batch = json!([
        {"entity_id": "E1", "energy": 1},
        {"entity_id": "E2", "energy": -1},
    ]);
    let response = router
        .clone()
        .oneshot(post_json("/api/incidents", &batch))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["failed"], 1);
    assert_eq!(json["rejected"], 1);
    assert_eq!(json["items"][0]["outcome"]["status"], "store_unavailable");

    let response = router
        .oneshot(Request::get("/api/scores/E1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_emit_returns_signed_incident() {
    let signer = IncidentSigner::new("s3cret").unwrap();
    let state = Arc::new(make_state_with(
        Arc::new(MemoryScoreStore::new(2)),
        Some(signer.clone()),
    ));
    let router = build_router(state);

    let response = router
        .clone()
        .oneshot(Request::get("/api/emit/node:9").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    let element = &json[0];
    assert!(element["key"].as_str().unwrap().starts_with("ra_emit_"));
    assert_eq!(element["display"], "0");
    let hash = element["payload"]["hash"].as_str().unwrap();
    assert!(signer.verify("node:9", 10.0, hash));

    // Posting the emitted payload back is accepted.
    let batch = json!([element["payload"].clone()]);
    let response = router
        .oneshot(post_json("/api/incidents", &batch))
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["accepted"], 1);
}

#[tokio::test]
async fn test_signed_state_rejects_unsigned_items() {
    let signer = IncidentSigner::new("s3cret").unwrap();
    let state = Arc::new(make_state_with(Arc::new(MemoryScoreStore::new(2)), Some(signer)));
    let router = build_router(state);

    let response = router
        .oneshot(post_json(
            "/api/incidents",
            &json!([{"entity_id": "E1", "energy": 1000}]),
        ))
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["rejected"], 1);
    assert_eq!(json["items"][0]["outcome"]["reason"]["code"], "missing_signature");
}

#[tokio::test]
async fn test_spawned_server_stops_on_shutdown() {
    let config = ServerConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
    };
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = spawn_server(&config, make_test_state(), shutdown_rx)
        .await
        .unwrap();
    assert!(!handle.is_finished());

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_spawn_server_rejects_bad_address() {
    let config = ServerConfig {
        host: "not an address".to_owned(),
        port: 8080,
    };
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let result = spawn_server(&config, make_test_state(), shutdown_rx).await;
    assert!(result.is_err());
}
