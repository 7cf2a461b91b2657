//! Merging incidents into scores, lazy reads, and the decay sweep.
//!
//! The aggregator holds no score state of its own. Every mutation is a
//! read-modify-write step handed to [`ScoreStore::update`], so the store
//! alone decides how concurrent merges on one entity are serialized.
//!
//! Merge rule, evaluated at the incident's timestamp `t`:
//!
//! ```text
//! value'       = decay(value, t - last_update) + energy
//! last_update' = max(last_update, t)
//! ```
//!
//! An incident older than `last_update` is merged with zero elapsed time.
//! Every store call is bounded by the configured timeout; expiry or a
//! backend failure surfaces as [`AggregateError::StoreUnavailable`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use radioactivity_types::{EntityId, Incident, Score, ScoreState};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::decay::DecayProfile;
use crate::store::{ScoreStore, StoreError};

/// How many stored leaders [`Aggregator::top`] ranks per requested entry.
pub const TOP_CANDIDATE_FACTOR: usize = 4;

/// Errors surfaced by the aggregator.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// The score store failed or timed out; nothing was applied.
    #[error("{source}")]
    StoreUnavailable {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },
}

/// Counters from one decay sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records looked at.
    pub visited: usize,
    /// Records still carrying energy after the sweep.
    pub active: usize,
    /// Records that decayed to zero during this sweep.
    pub decayed: usize,
    /// Records deleted because their retention window elapsed.
    pub reclaimed: usize,
    /// Records whose update failed.
    pub failed: usize,
}

/// Merges incidents into the score store and evaluates decay.
pub struct Aggregator {
    store: Arc<dyn ScoreStore>,
    decay: DecayProfile,
    retention: Duration,
    timeout: Duration,
}

impl Aggregator {
    /// Create an aggregator over `store`.
    ///
    /// `retention` is how long a score may sit at zero before the sweep
    /// deletes it; `timeout` bounds every store operation.
    pub fn new(
        store: Arc<dyn ScoreStore>,
        decay: DecayProfile,
        retention: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            decay,
            retention,
            timeout,
        }
    }

    /// Create an aggregator from the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for out-of-range decay parameters.
    pub fn from_config(
        store: Arc<dyn ScoreStore>,
        config: &EngineConfig,
    ) -> Result<Self, ConfigError> {
        let decay = DecayProfile::from_config(&config.decay)?;
        Ok(Self::new(
            store,
            decay,
            config.retention.retention(),
            config.store.timeout(),
        ))
    }

    /// The decay profile in use.
    pub const fn decay(&self) -> &DecayProfile {
        &self.decay
    }

    /// The underlying store.
    pub const fn store(&self) -> &Arc<dyn ScoreStore> {
        &self.store
    }

    /// Merge one incident into its entity's score.
    ///
    /// Returns the score as stored after the merge.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::StoreUnavailable`] if the store fails or
    /// times out. The incident is then not applied.
    pub async fn merge(&self, incident: &Incident) -> Result<Score, AggregateError> {
        let decay = self.decay;
        let step = |current: Option<&Score>| Some(merge_step(&decay, current, incident));

        let stored = self
            .bounded(self.store.update(incident.entity_id(), &step))
            .await?;

        // The merge step always returns a record.
        let score = stored.unwrap_or_else(|| merge_step(&decay, None, incident));

        debug!(
            entity_id = %incident.entity_id(),
            energy = incident.energy(),
            value = score.value(),
            "Merged incident"
        );
        Ok(score)
    }

    /// Read the score of `entity_id` decayed to `now` without writing.
    ///
    /// The returned record keeps the stored `last_update`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::StoreUnavailable`] if the store fails.
    pub async fn score_at(
        &self,
        entity_id: &EntityId,
        now: DateTime<Utc>,
    ) -> Result<Option<Score>, AggregateError> {
        let stored = self.bounded(self.store.get(entity_id)).await?;
        Ok(stored.map(|score| self.decayed_view(&score, now)))
    }

    /// The `limit` most radioactive entities at `now`.
    ///
    /// Ranks the [`TOP_CANDIDATE_FACTOR`] times `limit` records with the
    /// highest stored values by their decayed value. Scores that have
    /// decayed to zero are left out. Ties are broken by entity id.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::StoreUnavailable`] if the store fails.
    pub async fn top(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Score>, AggregateError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let wanted = limit.saturating_mul(TOP_CANDIDATE_FACTOR);
        let mut scores: Vec<Score> = self
            .bounded(self.store.candidates(wanted))
            .await?
            .iter()
            .map(|score| self.decayed_view(score, now))
            .filter(|score| score.state() == ScoreState::Active)
            .collect();

        scores.sort_by(|a, b| {
            b.value()
                .total_cmp(&a.value())
                .then_with(|| a.entity_id().cmp(b.entity_id()))
        });
        scores.truncate(limit);
        Ok(scores)
    }

    /// Apply decay to every stored score and reclaim expired zeros.
    ///
    /// Each record is updated through the store's per-entity
    /// read-modify-write, so the sweep only contends with foreground
    /// merges on the same entity. A failing record is counted and
    /// skipped; only a failing scan aborts the sweep.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::StoreUnavailable`] if the initial scan fails.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, AggregateError> {
        let snapshot = self.bounded(self.store.scan()).await?;
        let mut report = SweepReport::default();

        for seen in &snapshot {
            report.visited = report.visited.saturating_add(1);

            let needs_write = match seen.state() {
                ScoreState::Active => self.decay.decays(),
                ScoreState::Decayed => self.retention_elapsed(seen, now),
            };
            if !needs_write {
                match seen.state() {
                    ScoreState::Active => report.active = report.active.saturating_add(1),
                    ScoreState::Decayed => {}
                }
                continue;
            }

            let reclaimed = AtomicBool::new(false);
            let step = |current: Option<&Score>| {
                let current = current?;
                let next = self.sweep_step(current, now);
                if next.is_none() {
                    reclaimed.store(true, Ordering::Relaxed);
                }
                next
            };

            match self.bounded(self.store.update(seen.entity_id(), &step)).await {
                Ok(Some(after)) => match after.state() {
                    ScoreState::Active => report.active = report.active.saturating_add(1),
                    ScoreState::Decayed => {
                        if seen.state() == ScoreState::Active {
                            report.decayed = report.decayed.saturating_add(1);
                        }
                    }
                },
                Ok(None) => {
                    if reclaimed.load(Ordering::Relaxed) {
                        report.reclaimed = report.reclaimed.saturating_add(1);
                    }
                }
                Err(e) => {
                    warn!(entity_id = %seen.entity_id(), error = %e, "Sweep update failed");
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }

        info!(
            visited = report.visited,
            active = report.active,
            decayed = report.decayed,
            reclaimed = report.reclaimed,
            failed = report.failed,
            backend = self.store.backend_name(),
            "Decay sweep complete"
        );
        Ok(report)
    }

    /// Decay `score` to `now` for display; never moves time backwards.
    fn decayed_view(&self, score: &Score, now: DateTime<Utc>) -> Score {
        let value = self
            .decay
            .apply_between(score.value(), score.last_update(), now);
        score.with_value(value, score.last_update())
    }

    fn sweep_step(&self, current: &Score, now: DateTime<Utc>) -> Option<Score> {
        match current.state() {
            ScoreState::Active => {
                if now <= current.last_update() {
                    return Some(current.clone());
                }
                let value = self
                    .decay
                    .apply_between(current.value(), current.last_update(), now);
                Some(current.with_value(value, now))
            }
            ScoreState::Decayed => {
                if self.retention_elapsed(current, now) {
                    None
                } else {
                    Some(current.clone())
                }
            }
        }
    }

    fn retention_elapsed(&self, score: &Score, now: DateTime<Utc>) -> bool {
        let Ok(retention) = chrono::Duration::from_std(self.retention) else {
            return false;
        };
        now.signed_duration_since(score.last_update()) >= retention
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_elapsed| StoreError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }
}

/// Apply one incident to the current record.
///
/// Pure function shared by every store backend: decay to the incident's
/// timestamp first, then add the energy.
pub fn merge_step(decay: &DecayProfile, current: Option<&Score>, incident: &Incident) -> Score {
    match current {
        None => Score::new(
            incident.entity_id().clone(),
            incident.energy(),
            incident.timestamp(),
        ),
        Some(score) => {
            let decayed =
                decay.apply_between(score.value(), score.last_update(), incident.timestamp());
            let last_update = score.last_update().max(incident.timestamp());
            score.with_value(decayed + incident.energy(), last_update)
        }
    }
}
