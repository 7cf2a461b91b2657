//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] errors. [`DbError`] converts into the engine's
//! [`StoreError`] at the [`ScoreStore`] boundary.
//!
//! [`ScoreStore`]: radioactivity_core::store::ScoreStore

use radioactivity_core::store::StoreError;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row does not hold a valid score.
    #[error("Corrupt score row for {entity_id:?}: {reason}")]
    CorruptRow {
        /// Raw entity id as stored.
        entity_id: String,
        /// What is wrong with the row.
        reason: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::Unavailable {
            message: err.to_string(),
        }
    }
}
