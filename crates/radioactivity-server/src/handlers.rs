//! REST API endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/health` | Liveness check |
//! | `POST` | `/api/incidents` | Ingest a batch of incidents |
//! | `GET` | `/api/scores` | Most radioactive entities |
//! | `GET` | `/api/scores/{entity_id}` | Current score of one entity |
//! | `GET` | `/api/emit/{entity_id}` | Incidents to embed when rendering an entity |

use std::fmt::Write as _;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse};
use chrono::Utc;
use radioactivity_core::emitter::{EmittedIncident, format_energy};
use radioactivity_types::{BatchReport, EntityId, Score, ScoreView};
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;

/// Default number of entries returned by `GET /api/scores`.
const DEFAULT_TOP_LIMIT: usize = 10;

/// Largest number of entries `GET /api/scores` returns.
const MAX_TOP_LIMIT: usize = 1000;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for the `GET /api/scores` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct ScoresQuery {
    /// Maximum number of entries to return (default 10, capped at 1000).
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page with the hottest entities and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    let aggregator = state.aggregator();
    let top = aggregator.top(Utc::now(), DEFAULT_TOP_LIMIT).await?;
    let decimals = state.emitter.settings().decimals;

    let mut rows = String::new();
    for score in &top {
        let _ = writeln!(
            rows,
            "        <tr><td>{}</td><td class=\"value\">{}</td></tr>",
            escape_html(score.entity_id().as_str()),
            format_energy(score.value(), decimals),
        );
    }
    if rows.is_empty() {
        rows.push_str("        <tr><td colspan=\"2\">No active scores</td></tr>\n");
    }

    let emitter_summary = state
        .emitter
        .settings()
        .summary()
        .iter()
        .map(|line| format!("<li>{}</li>", escape_html(line)))
        .collect::<String>();

    let backend = aggregator.store().backend_name();
    let started = state.started_at.to_rfc3339();
    let signed = if state.ingest.requires_signature() {
        "required"
    } else {
        "off"
    };

    Ok(Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Radioactivity</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #7ee787; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        table {{ border-collapse: collapse; width: 100%; }}
        td {{ border-bottom: 1px solid #30363d; padding: 0.3rem 0.5rem; }}
        td.value {{ text-align: right; color: #7ee787; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.2rem 0; }}
        .status {{ color: #3fb950; font-weight: bold; }}
        hr {{ border: none; border-top: 1px solid #30363d; margin: 1.5rem 0; }}
    </style>
</head>
<body>
    <h1>Radioactivity</h1>
    <p class="subtitle">Incident accumulation and decay engine</p>

    <p>Status: <span class="status">RUNNING</span> since {started}</p>
    <p>Store: {backend} &middot; Signatures: {signed}</p>

    <h2>Most radioactive</h2>
    <table>
{rows}    </table>

    <h2>Emitter</h2>
    <ul>{emitter_summary}</ul>

    <hr>

    <h2>API Endpoints</h2>
    <ul>
        <li>GET <a href="/api/health">/api/health</a> -- Liveness check</li>
        <li>POST /api/incidents -- Ingest a batch of incidents</li>
        <li>GET <a href="/api/scores">/api/scores</a> -- Most radioactive entities (?limit=N)</li>
        <li>GET /api/scores/{{entity_id}} -- Current score of one entity</li>
        <li>GET /api/emit/{{entity_id}} -- Incidents to embed for one entity</li>
    </ul>
</body>
</html>"#
    )))
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

/// Liveness check. Does not touch the store.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "store": state.aggregator().store().backend_name(),
    }))
}

// ---------------------------------------------------------------------------
// POST /api/incidents
// ---------------------------------------------------------------------------

/// Ingest a batch of incidents.
///
/// The body is either a JSON array of incident payloads or an object
/// `{"incidents": [...]}`. Each item is validated on its own; the response
/// reports every item's outcome. Only a body that is not a batch at all,
/// or a batch over the size limit, fails the whole request.
pub async fn post_incidents(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<BatchReport>, ApiError> {
    let parsed: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidBody(format!("not valid JSON: {e}")))?;
    let items = batch_items(parsed)?;

    if items.len() > state.max_batch_size {
        return Err(ApiError::BatchTooLarge {
            size: items.len(),
            max: state.max_batch_size,
        });
    }

    let report = state.ingest.ingest(&items, Utc::now()).await;
    Ok(Json(report))
}

fn batch_items(body: Value) -> Result<Vec<Value>, ApiError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut object) => match object.remove("incidents") {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(ApiError::InvalidBody(
                "\"incidents\" must be an array".to_owned(),
            )),
            None => Err(ApiError::InvalidBody(
                "expected an array or an object with an \"incidents\" array".to_owned(),
            )),
        },
        _ => Err(ApiError::InvalidBody(
            "expected an array or an object with an \"incidents\" array".to_owned(),
        )),
    }
}

// ---------------------------------------------------------------------------
// GET /api/scores
// ---------------------------------------------------------------------------

/// List the most radioactive entities, highest first.
///
/// # Query Parameters
///
/// - `limit` -- Number of entries (default 10, capped at 1000).
pub async fn list_scores(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScoresQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_TOP_LIMIT)
        .min(MAX_TOP_LIMIT);
    let scores: Vec<ScoreView> = state
        .aggregator()
        .top(Utc::now(), limit)
        .await?
        .iter()
        .map(ScoreView::from)
        .collect();

    Ok(Json(serde_json::json!({
        "count": scores.len(),
        "scores": scores,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/scores/{entity_id}
// ---------------------------------------------------------------------------

/// Return one entity's score, decayed to the time of the request.
pub async fn get_score(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<ScoreView>, ApiError> {
    let entity_id = parse_entity_id(&raw_id)?;
    let score = state
        .aggregator()
        .score_at(&entity_id, Utc::now())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no score for {entity_id}")))?;
    Ok(Json(ScoreView::from(&score)))
}

// ---------------------------------------------------------------------------
// GET /api/emit/{entity_id}
// ---------------------------------------------------------------------------

/// Produce the incident a page should embed when it renders an entity.
///
/// The display value, when enabled, is the entity's current score (zero
/// for entities without one).
pub async fn emit(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<Vec<EmittedIncident>>, ApiError> {
    let entity_id = parse_entity_id(&raw_id)?;
    let current = state
        .aggregator()
        .score_at(&entity_id, Utc::now())
        .await?
        .as_ref()
        .map_or(0.0, Score::value);
    Ok(Json(state.emitter.emit(&entity_id, &[current])))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_entity_id(raw: &str) -> Result<EntityId, ApiError> {
    EntityId::parse(raw).map_err(|e| ApiError::InvalidQuery(format!("invalid entity id: {e}")))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
