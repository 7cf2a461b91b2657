//! The ingestion endpoint: batch validation and forwarding.
//!
//! A batch holds zero or more serialized incidents, typically every emitter
//! on one rendered page. Each item is decoded, validated and merged on its
//! own, strictly in arrival order, so two incidents for the same entity in
//! one batch are applied one after the other. An invalid item or a store
//! failure is recorded in the [`BatchReport`] and processing moves on to
//! the next item. The endpoint keeps no state between calls.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use radioactivity_types::{
    BatchReport, EntityId, Incident, IncidentOutcome, IncidentPayload, RejectionReason,
};
use serde::Deserialize as _;
use tracing::{info, warn};

use crate::aggregator::{AggregateError, Aggregator};
use crate::config::{ConfigError, IngestConfig};
use crate::signing::IncidentSigner;

/// Validates incident batches and forwards them to the [`Aggregator`].
pub struct IngestionEndpoint {
    aggregator: Arc<Aggregator>,
    signer: Option<IncidentSigner>,
    max_future_skew: chrono::Duration,
}

impl IngestionEndpoint {
    /// Create an endpoint.
    ///
    /// With a `signer`, every item must carry a valid `hash`.
    pub fn new(
        aggregator: Arc<Aggregator>,
        signer: Option<IncidentSigner>,
        max_future_skew: Duration,
    ) -> Self {
        Self {
            aggregator,
            signer,
            max_future_skew: chrono::Duration::from_std(max_future_skew)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Create an endpoint from the `ingest` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the configured secret is unusable.
    pub fn from_config(
        aggregator: Arc<Aggregator>,
        config: &IngestConfig,
    ) -> Result<Self, ConfigError> {
        let signer = config
            .secret
            .as_deref()
            .map(IncidentSigner::new)
            .transpose()?;
        Ok(Self::new(aggregator, signer, config.max_future_skew()))
    }

    /// The aggregator incidents are forwarded to.
    pub const fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    /// Whether items must be signed.
    pub const fn requires_signature(&self) -> bool {
        self.signer.is_some()
    }

    /// Ingest a batch of raw JSON items received at `now`.
    pub async fn ingest(&self, batch: &[serde_json::Value], now: DateTime<Utc>) -> BatchReport {
        let mut report = BatchReport::with_capacity(batch.len());
        for item in batch {
            let (entity_id, outcome) = match decode(item) {
                Ok(payload) => self.process(&payload, now).await,
                Err(reason) => (None, rejected_for(None, &reason)),
            };
            report.push(entity_id, outcome);
        }
        log_report(&report);
        report
    }

    /// Turn a payload into an [`Incident`], or say why it is invalid.
    ///
    /// Returns the entity id alongside the result whenever it could be
    /// read, so rejections can still be attributed.
    pub fn validate(
        &self,
        payload: &IncidentPayload,
        now: DateTime<Utc>,
    ) -> (Option<EntityId>, Result<Incident, RejectionReason>) {
        let raw_id = match payload.entity_id.as_deref() {
            Some(raw) => raw,
            None => return (None, Err(RejectionReason::MissingEntityId)),
        };
        let entity_id = match EntityId::parse(raw_id) {
            Ok(id) => id,
            Err(e) => {
                return (
                    None,
                    Err(RejectionReason::MalformedEntityId {
                        detail: e.to_string(),
                    }),
                );
            }
        };
        let result = self.validate_fields(&entity_id, payload, now);
        (Some(entity_id), result)
    }

    fn validate_fields(
        &self,
        entity_id: &EntityId,
        payload: &IncidentPayload,
        now: DateTime<Utc>,
    ) -> Result<Incident, RejectionReason> {
        let energy = payload.energy.ok_or(RejectionReason::MissingEnergy)?;

        if let Some(signer) = &self.signer {
            let hash = payload
                .hash
                .as_deref()
                .ok_or(RejectionReason::MissingSignature)?;
            if !signer.verify(entity_id.as_str(), energy, hash) {
                return Err(RejectionReason::BadSignature);
            }
        }

        let timestamp = match &payload.timestamp {
            Some(wire) => wire.resolve()?,
            None => now,
        };
        if timestamp.signed_duration_since(now) > self.max_future_skew {
            return Err(RejectionReason::FutureTimestamp { timestamp });
        }

        Incident::new(entity_id.clone(), energy, timestamp)
    }

    async fn process(
        &self,
        payload: &IncidentPayload,
        now: DateTime<Utc>,
    ) -> (Option<EntityId>, IncidentOutcome) {
        let (entity_id, validated) = self.validate(payload, now);
        let incident = match validated {
            Ok(incident) => incident,
            Err(reason) => {
                let outcome = rejected_for(entity_id.as_ref(), &reason);
                return (entity_id, outcome);
            }
        };

        let outcome = match self.aggregator.merge(&incident).await {
            Ok(score) => IncidentOutcome::Accepted {
                value: score.value(),
                last_update: score.last_update(),
            },
            Err(AggregateError::StoreUnavailable { source }) => {
                warn!(
                    entity_id = %incident.entity_id(),
                    error = %source,
                    "Incident not applied, store unavailable"
                );
                IncidentOutcome::StoreUnavailable {
                    message: source.to_string(),
                }
            }
        };
        (entity_id, outcome)
    }
}

fn decode(item: &serde_json::Value) -> Result<IncidentPayload, RejectionReason> {
    IncidentPayload::deserialize(item).map_err(|e| RejectionReason::Malformed {
        detail: e.to_string(),
    })
}

fn rejected_for(entity_id: Option<&EntityId>, reason: &RejectionReason) -> IncidentOutcome {
    warn!(
        entity_id = entity_id.map_or("<unknown>", EntityId::as_str),
        reason = %reason,
        "Rejected incident"
    );
    IncidentOutcome::Rejected {
        reason: reason.clone(),
    }
}

fn log_report(report: &BatchReport) {
    info!(
        items = report.len(),
        accepted = report.accepted,
        rejected = report.rejected,
        failed = report.failed,
        "Ingested incident batch"
    );
}
