//! Per-incident ingestion outcomes.
//!
//! Every item of an ingested batch gets exactly one [`IncidentOutcome`];
//! nothing is dropped without being reported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::EntityId;

/// Why an incident was refused (`InvalidIncident`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, thiserror::Error)]
#[serde(tag = "code", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RejectionReason {
    /// The item is not a JSON object of the expected shape.
    #[error("malformed incident: {detail}")]
    Malformed {
        /// Decoder message.
        detail: String,
    },

    /// No `entity_id` was given.
    #[error("missing entity id")]
    MissingEntityId,

    /// The `entity_id` is not a valid identifier.
    #[error("malformed entity id: {detail}")]
    MalformedEntityId {
        /// Which rule the id breaks.
        detail: String,
    },

    /// No `energy` was given.
    #[error("missing energy")]
    MissingEnergy,

    /// The energy is below zero.
    #[error("negative energy {energy}")]
    NegativeEnergy {
        /// The offending value.
        energy: f64,
    },

    /// The energy is NaN or infinite.
    #[error("energy is not a finite number")]
    NonFiniteEnergy,

    /// The timestamp could not be understood.
    #[error("invalid timestamp: {detail}")]
    InvalidTimestamp {
        /// Parser message.
        detail: String,
    },

    /// The timestamp lies further in the future than the allowed skew.
    #[error("timestamp {timestamp} is in the future")]
    FutureTimestamp {
        /// The offending timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Signing is enabled and the item carries no hash.
    #[error("missing signature")]
    MissingSignature,

    /// The hash does not match the entity id and energy.
    #[error("bad signature")]
    BadSignature,
}

/// Result of ingesting one incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "status", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum IncidentOutcome {
    /// Merged into the entity's score.
    Accepted {
        /// Score value right after the merge.
        value: f64,
        /// Score timestamp right after the merge.
        last_update: DateTime<Utc>,
    },
    /// Refused during validation (`InvalidIncident`); the store was not touched.
    Rejected {
        /// Why it was refused.
        reason: RejectionReason,
    },
    /// The score store could not be reached in time; nothing was applied.
    StoreUnavailable {
        /// Store error message.
        message: String,
    },
}

/// Outcome of one batch item, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BatchItemReport {
    /// Position of the item in the submitted batch.
    pub index: usize,
    /// Entity id, when it could be read.
    pub entity_id: Option<EntityId>,
    /// What happened to the item.
    pub outcome: IncidentOutcome,
}

/// Report for a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BatchReport {
    /// Number of merged incidents.
    pub accepted: usize,
    /// Number of `InvalidIncident` items.
    pub rejected: usize,
    /// Number of `StoreUnavailable` items.
    pub failed: usize,
    /// One entry per submitted item, in order.
    pub items: Vec<BatchItemReport>,
}

impl BatchReport {
    /// Create an empty report with room for `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Record the outcome of the next item.
    pub fn push(&mut self, entity_id: Option<EntityId>, outcome: IncidentOutcome) {
        match outcome {
            IncidentOutcome::Accepted { .. } => self.accepted = self.accepted.saturating_add(1),
            IncidentOutcome::Rejected { .. } => self.rejected = self.rejected.saturating_add(1),
            IncidentOutcome::StoreUnavailable { .. } => {
                self.failed = self.failed.saturating_add(1);
            }
        }
        let index = self.items.len();
        self.items.push(BatchItemReport {
            index,
            entity_id,
            outcome,
        });
    }

    /// Total number of reported items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch was empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn push_counts_and_indexes() {
        let mut report = BatchReport::with_capacity(3);
        report.push(
            EntityId::parse("E1").ok(),
            IncidentOutcome::Accepted {
                value: 1.0,
                last_update: Utc::now(),
            },
        );
        report.push(
            None,
            IncidentOutcome::Rejected {
                reason: RejectionReason::MissingEntityId,
            },
        );
        report.push(
            EntityId::parse("E2").ok(),
            IncidentOutcome::StoreUnavailable {
                message: "timeout".to_owned(),
            },
        );

        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.len(), 3);
        assert_eq!(report.items[2].index, 2);
    }

    #[test]
    fn outcome_json_is_tagged() {
        let outcome = IncidentOutcome::Rejected {
            reason: RejectionReason::NegativeEnergy { energy: -5.0 },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reason"]["code"], "negative_energy");
        assert_eq!(json["reason"]["energy"], -5.0);
    }
}
