//! Incidents: single energy emissions for an entity.
//!
//! [`IncidentPayload`] is the loosely-typed wire record emitted by the
//! presentation layer and posted to the ingestion endpoint. Every field is
//! optional on the wire so that a malformed item can be reported precisely
//! instead of failing the whole batch. [`Incident`] is the validated,
//! immutable value the aggregator merges.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

use crate::ids::EntityId;
use crate::outcome::RejectionReason;

/// ISO-8601 with a numeric offset and no colon, e.g. `+0000`.
const ISO8601_BASIC_OFFSET: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// ISO-8601 without a zone, read as UTC.
const ISO8601_NO_ZONE: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A timestamp as sent by clients: ISO-8601 text or epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(untagged)]
#[ts(export, export_to = "bindings/")]
pub enum WireTimestamp {
    /// ISO-8601 text, e.g. `2026-01-01T12:00:00Z`,
    /// `2026-01-01T12:00:00+0000` or `2026-01-01T12:00:00` (UTC).
    Text(String),
    /// Seconds since the Unix epoch, fractional part allowed.
    Epoch(f64),
}

impl WireTimestamp {
    /// Convert into a UTC timestamp.
    ///
    /// Epoch values are rounded to millisecond precision.
    ///
    /// # Errors
    ///
    /// Returns [`RejectionReason::InvalidTimestamp`] when the text does not
    /// parse or the epoch value is not finite or out of range.
    pub fn resolve(&self) -> Result<DateTime<Utc>, RejectionReason> {
        match self {
            Self::Text(text) => parse_text(text),
            Self::Epoch(secs) => {
                if !secs.is_finite() {
                    return Err(RejectionReason::InvalidTimestamp {
                        detail: format!("{secs} is not a finite epoch value"),
                    });
                }
                #[allow(clippy::cast_possible_truncation)]
                let millis = (secs * 1000.0).round() as i64;
                DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                    RejectionReason::InvalidTimestamp {
                        detail: format!("{secs} is out of range"),
                    }
                })
            }
        }
    }
}

fn parse_text(text: &str) -> Result<DateTime<Utc>, RejectionReason> {
    let rfc3339 = match DateTime::parse_from_rfc3339(text) {
        Ok(ts) => return Ok(ts.with_timezone(&Utc)),
        Err(e) => e,
    };
    if let Ok(ts) = DateTime::parse_from_str(text, ISO8601_BASIC_OFFSET) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, ISO8601_NO_ZONE) {
        return Ok(naive.and_utc());
    }
    Err(RejectionReason::InvalidTimestamp {
        detail: format!("{text}: {rfc3339}"),
    })
}

impl From<DateTime<Utc>> for WireTimestamp {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Text(ts.to_rfc3339())
    }
}

/// Incident record as it travels over the wire.
///
/// This is what the emitter attaches to a rendered page and what the
/// client-side trigger script posts back in batches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct IncidentPayload {
    /// Target entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub entity_id: Option<String>,

    /// Energy to add to the entity's score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub energy: Option<f64>,

    /// When the incident happened. Absent means "on receipt".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub timestamp: Option<WireTimestamp>,

    /// Display hint for the client; the engine ignores it. A value that is
    /// not a small non-negative integer decodes as `None`.
    #[serde(
        default,
        deserialize_with = "lenient_decimals",
        skip_serializing_if = "Option::is_none"
    )]
    #[ts(optional)]
    pub decimals: Option<u32>,

    /// Hex HMAC over the entity id and energy, present when signing is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub hash: Option<String>,
}

fn lenient_decimals<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_u64)
        .and_then(|n| u32::try_from(n).ok()))
}

/// A validated energy emission.
///
/// Immutable once built: the fields are private and [`Incident::new`]
/// refuses negative or non-finite energy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    entity_id: EntityId,
    energy: f64,
    timestamp: DateTime<Utc>,
}

impl Incident {
    /// Build an incident.
    ///
    /// # Errors
    ///
    /// Returns [`RejectionReason::NonFiniteEnergy`] for NaN or infinite
    /// energy and [`RejectionReason::NegativeEnergy`] for energy below zero.
    pub fn new(
        entity_id: EntityId,
        energy: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, RejectionReason> {
        if !energy.is_finite() {
            return Err(RejectionReason::NonFiniteEnergy);
        }
        if energy < 0.0 {
            return Err(RejectionReason::NegativeEnergy { energy });
        }
        Ok(Self {
            entity_id,
            // Normalizes -0.0.
            energy: energy.max(0.0),
            timestamp,
        })
    }

    /// The target entity.
    pub const fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Emitted energy, always finite and `>= 0`.
    pub const fn energy(&self) -> f64 {
        self.energy
    }

    /// When the incident happened.
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn id(raw: &str) -> EntityId {
        EntityId::parse(raw).unwrap()
    }

    #[test]
    fn incident_rejects_negative_energy() {
        let result = Incident::new(id("E1"), -5.0, Utc::now());
        assert!(matches!(result, Err(RejectionReason::NegativeEnergy { .. })));
    }

    #[test]
    fn incident_rejects_nan_and_infinity() {
        assert_eq!(
            Incident::new(id("E1"), f64::NAN, Utc::now()),
            Err(RejectionReason::NonFiniteEnergy)
        );
        assert_eq!(
            Incident::new(id("E1"), f64::INFINITY, Utc::now()),
            Err(RejectionReason::NonFiniteEnergy)
        );
    }

    #[test]
    fn incident_accepts_zero_energy() {
        let incident = Incident::new(id("E1"), 0.0, Utc::now()).unwrap();
        assert!(incident.energy().abs() < f64::EPSILON);
        assert!(incident.energy().is_sign_positive());
    }

    #[test]
    fn payload_decodes_epoch_and_text_timestamps() {
        let epoch: IncidentPayload =
            serde_json::from_str(r#"{"entity_id":"E1","energy":1,"timestamp":10}"#).unwrap();
        let ts = epoch.timestamp.unwrap().resolve().unwrap();
        assert_eq!(ts.timestamp(), 10);

        let text: IncidentPayload = serde_json::from_str(
            r#"{"entity_id":"E1","energy":1,"timestamp":"1970-01-01T00:00:30Z"}"#,
        )
        .unwrap();
        let ts = text.timestamp.unwrap().resolve().unwrap();
        assert_eq!(ts.timestamp(), 30);
    }

    #[test]
    fn iso8601_basic_offset_is_accepted() {
        let ts = WireTimestamp::Text("1970-01-01T01:00:00+0100".to_owned());
        assert_eq!(ts.resolve().unwrap().timestamp(), 0);

        let ts = WireTimestamp::Text("2026-01-01T00:00:00+0000".to_owned());
        assert_eq!(
            ts.resolve().unwrap(),
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap()
        );
    }

    #[test]
    fn zoneless_text_is_read_as_utc() {
        let ts = WireTimestamp::Text("1970-01-01T00:00:45".to_owned());
        assert_eq!(ts.resolve().unwrap().timestamp(), 45);

        let ts = WireTimestamp::Text("1970-01-01T00:00:45.250".to_owned());
        assert_eq!(ts.resolve().unwrap().timestamp_millis(), 45_250);
    }

    #[test]
    fn unusable_decimals_hint_decodes_as_none() {
        for hint in [r#""2""#, "-1", "2.0", "1e20", "null"] {
            let raw = format!(r#"{{"entity_id":"E1","energy":1,"decimals":{hint}}}"#);
            let payload: IncidentPayload = serde_json::from_str(&raw).unwrap();
            assert_eq!(payload.decimals, None, "hint {hint}");
            assert_eq!(payload.energy, Some(1.0));
        }

        let payload: IncidentPayload =
            serde_json::from_str(r#"{"entity_id":"E1","energy":1,"decimals":2}"#).unwrap();
        assert_eq!(payload.decimals, Some(2));
    }

    #[test]
    fn bad_text_timestamp_is_rejected() {
        let ts = WireTimestamp::Text("yesterday".to_owned());
        assert!(matches!(
            ts.resolve(),
            Err(RejectionReason::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn payload_omits_absent_fields() {
        let payload = IncidentPayload {
            entity_id: Some("E1".to_owned()),
            energy: Some(10.0),
            ..IncidentPayload::default()
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"entity_id": "E1", "energy": 10.0}));
    }
}
