//! Per-entity radioactivity scores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::EntityId;

/// Lifecycle state of a stored score.
///
/// `Absent` is not represented: an absent score simply has no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ScoreState {
    /// The score still carries energy.
    Active,
    /// Decay drove the score to zero; it waits for reclamation.
    Decayed,
}

/// Accumulated, decayed energy of one entity.
///
/// `value` is never negative and never NaN: [`Score::new`] clamps it.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Score {
    entity_id: EntityId,
    value: f64,
    last_update: DateTime<Utc>,
}

impl Score {
    /// Build a score, clamping `value` to `>= 0` (NaN becomes zero).
    pub fn new(entity_id: EntityId, value: f64, last_update: DateTime<Utc>) -> Self {
        Self {
            entity_id,
            value: clamp_value(value),
            last_update,
        }
    }

    /// The entity this score belongs to.
    pub const fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Current stored value.
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Timestamp of the last applied incident or decay recomputation.
    pub const fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// Derived lifecycle state.
    pub fn state(&self) -> ScoreState {
        if self.value > 0.0 {
            ScoreState::Active
        } else {
            ScoreState::Decayed
        }
    }

    /// Return a copy with a new value and timestamp.
    #[must_use]
    pub fn with_value(&self, value: f64, last_update: DateTime<Utc>) -> Self {
        Self::new(self.entity_id.clone(), value, last_update)
    }
}

/// JSON view of a score returned by the query API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ScoreView {
    /// The entity.
    pub entity_id: EntityId,
    /// Decayed value at the time of the query.
    pub value: f64,
    /// Last stored update.
    pub last_update: DateTime<Utc>,
    /// Lifecycle state at the time of the query.
    pub state: ScoreState,
}

impl From<&Score> for ScoreView {
    fn from(score: &Score) -> Self {
        Self {
            entity_id: score.entity_id.clone(),
            value: score.value,
            last_update: score.last_update,
            state: score.state(),
        }
    }
}

fn clamp_value(value: f64) -> f64 {
    if value.is_nan() || value <= 0.0 {
        0.0
    } else {
        value
    }
}
