//! HTTP API for the radioactivity engine.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **Ingestion** (`POST /api/incidents`) for batches of incidents posted
//!   by the client-side trigger script
//! - **Score queries** (`GET /api/scores`, `GET /api/scores/{entity_id}`)
//!   with decay evaluated at request time
//! - **Emission** (`GET /api/emit/{entity_id}`) for presentation layers
//!   that render entities server-side
//! - **Minimal HTML status page** (`GET /`)
//!
//! Requests are handled concurrently; serialization of score updates is
//! left entirely to the score store.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError};
pub use startup::{StartupError, spawn_server};
pub use state::AppState;
