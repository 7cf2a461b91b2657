//! `PostgreSQL` score store for the radioactivity engine.
//!
//! Scores live in a single `radioactivity_scores` table keyed by entity id.
//! [`PgScoreStore`] implements the engine's [`ScoreStore`] trait on top of
//! it, serializing updates per entity with advisory locks.
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`score_store`] -- The [`ScoreStore`] implementation
//! - [`error`] -- Shared error types
//!
//! [`ScoreStore`]: radioactivity_core::store::ScoreStore

pub mod error;
pub mod postgres;
pub mod score_store;

// Re-export primary types for convenience.
pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use score_store::{PgScoreStore, ScoreRow};
