//! Axum router construction for the HTTP API.
//!
//! Assembles all routes into a single [`Router`] with CORS enabled, since
//! incidents are posted by scripts running on the pages that embed them.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /api/health` -- liveness check
/// - `POST /api/incidents` -- ingest a batch of incidents
/// - `GET /api/scores` -- most radioactive entities
/// - `GET /api/scores/{entity_id}` -- one entity's current score
/// - `GET /api/emit/{entity_id}` -- incidents to embed for one entity
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // REST API
        .route("/api/health", get(handlers::health))
        .route("/api/incidents", post(handlers::post_incidents))
        .route("/api/scores", get(handlers::list_scores))
        .route("/api/scores/{entity_id}", get(handlers::get_score))
        .route("/api/emit/{entity_id}", get(handlers::emit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
