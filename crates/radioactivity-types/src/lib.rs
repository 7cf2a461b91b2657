//! Shared type definitions for the radioactivity engine.
//!
//! This crate is the single source of truth for the records exchanged
//! between the emitter, the ingestion endpoint, the aggregator and the
//! score query API. Wire types flow to `TypeScript` via `ts-rs` for the
//! client-side trigger script.
//!
//! # Modules
//!
//! - [`ids`] -- Validated opaque entity identifiers
//! - [`incident`] -- Wire payloads and validated incidents
//! - [`score`] -- Per-entity scores and their lifecycle state
//! - [`outcome`] -- Per-incident ingestion outcomes and batch reports

pub mod ids;
pub mod incident;
pub mod outcome;
pub mod score;

// Re-export all public types at crate root for convenience.
pub use ids::{EntityId, EntityIdError, MAX_ENTITY_ID_LEN};
pub use incident::{Incident, IncidentPayload, WireTimestamp};
pub use outcome::{BatchItemReport, BatchReport, IncidentOutcome, RejectionReason};
pub use score::{Score, ScoreState, ScoreView};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the wire types.

    #[test]
    fn export_bindings() {
        // Files are written to `bindings/` relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::EntityId::export_all();
        let _ = crate::incident::WireTimestamp::export_all();
        let _ = crate::incident::IncidentPayload::export_all();
        let _ = crate::score::ScoreState::export_all();
        let _ = crate::score::Score::export_all();
        let _ = crate::score::ScoreView::export_all();
        let _ = crate::outcome::RejectionReason::export_all();
        let _ = crate::outcome::IncidentOutcome::export_all();
        let _ = crate::outcome::BatchItemReport::export_all();
        let _ = crate::outcome::BatchReport::export_all();
    }
}
