//! `PostgreSQL`-backed [`ScoreStore`].
//!
//! Every write (update, upsert or remove) runs in its own transaction that
//! first takes a transaction-scoped advisory lock keyed on the entity id.
//! Writes to one entity therefore queue behind each other, including the
//! very first insert, while different entities proceed in parallel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use radioactivity_core::store::{ScoreStore, ScoreUpdate, StoreError};
use radioactivity_types::{EntityId, Score};
use sqlx::{PgExecutor, PgPool};

use crate::error::DbError;

/// Row type for the `radioactivity_scores` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoreRow {
    /// Entity id as stored.
    pub entity_id: String,
    /// Energy as of `last_update`.
    pub value: f64,
    /// Time the value was last recomputed.
    pub last_update: DateTime<Utc>,
}

impl ScoreRow {
    /// Convert into a [`Score`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::CorruptRow`] if the stored id is not a valid
    /// entity id.
    pub fn into_score(self) -> Result<Score, DbError> {
        let entity_id = EntityId::parse(&self.entity_id).map_err(|e| DbError::CorruptRow {
            reason: e.to_string(),
            entity_id: self.entity_id.clone(),
        })?;
        Ok(Score::new(entity_id, self.value, self.last_update))
    }
}

const SELECT_ONE: &str =
    "SELECT entity_id, value, last_update FROM radioactivity_scores WHERE entity_id = $1";

const SELECT_ONE_FOR_UPDATE: &str = "SELECT entity_id, value, last_update \
     FROM radioactivity_scores WHERE entity_id = $1 FOR UPDATE";

const SELECT_LEADERS: &str = "SELECT entity_id, value, last_update FROM radioactivity_scores \
     ORDER BY value DESC, entity_id LIMIT $1";

const LOCK_ENTITY: &str = "SELECT pg_advisory_xact_lock(hashtext($1))";

const UPSERT: &str = "INSERT INTO radioactivity_scores (entity_id, value, last_update) \
     VALUES ($1, $2, $3) \
     ON CONFLICT (entity_id) DO UPDATE \
     SET value = EXCLUDED.value, last_update = EXCLUDED.last_update";

const DELETE_ONE: &str = "DELETE FROM radioactivity_scores WHERE entity_id = $1";

/// Score store over the `radioactivity_scores` table.
#[derive(Clone)]
pub struct PgScoreStore {
    pool: PgPool,
}

impl PgScoreStore {
    /// Create a store over `pool`. Migrations must already have run.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch<'e>(
        executor: impl PgExecutor<'e>,
        query: &'static str,
        entity_id: &EntityId,
    ) -> Result<Option<Score>, DbError> {
        let row: Option<ScoreRow> = sqlx::query_as(query)
            .bind(entity_id.as_str())
            .fetch_optional(executor)
            .await?;
        row.map(ScoreRow::into_score).transpose()
    }

    async fn lock<'e>(executor: impl PgExecutor<'e>, entity_id: &EntityId) -> Result<(), DbError> {
        sqlx::query(LOCK_ENTITY)
            .bind(entity_id.as_str())
            .execute(executor)
            .await?;
        Ok(())
    }

    async fn write<'e>(executor: impl PgExecutor<'e>, score: &Score) -> Result<(), DbError> {
        sqlx::query(UPSERT)
            .bind(score.entity_id().as_str())
            .bind(score.value())
            .bind(score.last_update())
            .execute(executor)
            .await?;
        Ok(())
    }

    async fn delete<'e>(
        executor: impl PgExecutor<'e>,
        entity_id: &EntityId,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(DELETE_ONE)
            .bind(entity_id.as_str())
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn locked_update(
        &self,
        entity_id: &EntityId,
        step: ScoreUpdate<'_>,
    ) -> Result<Option<Score>, DbError> {
        let mut tx = self.pool.begin().await?;
        Self::lock(&mut *tx, entity_id).await?;

        let current = Self::fetch(&mut *tx, SELECT_ONE_FOR_UPDATE, entity_id).await?;
        let next = step(current.as_ref());

        match (&current, &next) {
            (_, Some(next)) if current.as_ref() != Some(next) => {
                Self::write(&mut *tx, next).await?;
            }
            (Some(_), None) => {
                Self::delete(&mut *tx, entity_id).await?;
            }
            _ => {}
        }

        tx.commit().await?;
        Ok(next)
    }

    async fn locked_upsert(&self, score: &Score) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        Self::lock(&mut *tx, score.entity_id()).await?;
        Self::write(&mut *tx, score).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn locked_remove(&self, entity_id: &EntityId) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;
        Self::lock(&mut *tx, entity_id).await?;
        let existed = Self::delete(&mut *tx, entity_id).await?;
        tx.commit().await?;
        Ok(existed)
    }
}

fn into_scores(rows: Vec<ScoreRow>) -> Vec<Score> {
    let mut scores = Vec::with_capacity(rows.len());
    for row in rows {
        match row.into_score() {
            Ok(score) => scores.push(score),
            Err(e) => tracing::warn!(error = %e, "Skipping corrupt score row"),
        }
    }
    scores
}

#[async_trait]
impl ScoreStore for PgScoreStore {
    async fn get(&self, entity_id: &EntityId) -> Result<Option<Score>, StoreError> {
        Ok(Self::fetch(&self.pool, SELECT_ONE, entity_id).await?)
    }

    async fn upsert(&self, score: Score) -> Result<(), StoreError> {
        Ok(self.locked_upsert(&score).await?)
    }

    async fn update(
        &self,
        entity_id: &EntityId,
        step: ScoreUpdate<'_>,
    ) -> Result<Option<Score>, StoreError> {
        Ok(self.locked_update(entity_id, step).await?)
    }

    async fn remove(&self, entity_id: &EntityId) -> Result<bool, StoreError> {
        Ok(self.locked_remove(entity_id).await?)
    }

    async fn scan(&self) -> Result<Vec<Score>, StoreError> {
        let rows: Vec<ScoreRow> =
            sqlx::query_as("SELECT entity_id, value, last_update FROM radioactivity_scores")
                .fetch_all(&self.pool)
                .await
                .map_err(DbError::from)?;
        Ok(into_scores(rows))
    }

    async fn candidates(&self, limit: usize) -> Result<Vec<Score>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<ScoreRow> = sqlx::query_as(SELECT_LEADERS)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(into_scores(rows))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
