//! The emitter: attaches incidents to rendered entities.
//!
//! Whenever a page shows an entity, the presentation layer asks the
//! [`Emitter`] for the incidents to embed. Each one is keyed under a unique
//! `ra_emit_<n>` name so several emitters on one page never collide, and
//! the client-side trigger script posts them back to the ingestion
//! endpoint in a single batch. Unpublished entities emit nothing, but
//! their energy is still displayed when the settings ask for it.

use std::sync::atomic::{AtomicU64, Ordering};

use radioactivity_types::{EntityId, IncidentPayload};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::signing::IncidentSigner;

/// Prefix of every emit key.
pub const EMIT_KEY_PREFIX: &str = "ra_emit_";

/// Largest accepted `decimals` setting.
pub const MAX_DECIMALS: u32 = 12;

/// Capability for entities that can be unpublished.
///
/// Implementors without a notion of publication keep the default and
/// always emit.
pub trait Publishable {
    /// The entity's identifier.
    fn entity_id(&self) -> &EntityId;

    /// Whether the entity is currently visible to the public.
    fn is_published(&self) -> bool {
        true
    }
}

impl Publishable for EntityId {
    fn entity_id(&self) -> &EntityId {
        self
    }
}

/// Emitter settings, validated once when loaded.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmitterSettings {
    /// Energy carried by every emitted incident.
    #[serde(default = "default_energy")]
    pub energy: f64,

    /// Render the current energy next to the entity.
    #[serde(default)]
    pub display: bool,

    /// Decimals used when displaying energy.
    #[serde(default)]
    pub decimals: u32,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            energy: default_energy(),
            display: false,
            decimals: 0,
        }
    }
}

const fn default_energy() -> f64 {
    10.0
}

impl EmitterSettings {
    /// Check the settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a negative or non-finite
    /// energy, or more than [`MAX_DECIMALS`] decimals.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.energy.is_finite() || self.energy < 0.0 {
            return Err(ConfigError::Invalid {
                field: "emitter.energy",
                reason: "must be a finite number >= 0".to_owned(),
            });
        }
        if self.decimals > MAX_DECIMALS {
            return Err(ConfigError::Invalid {
                field: "emitter.decimals",
                reason: format!("must be at most {MAX_DECIMALS}"),
            });
        }
        Ok(())
    }

    /// Human-readable summary, one line per setting.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![format!("Emit: {}", self.energy)];
        if self.display {
            lines.push("Display energy value".to_owned());
            lines.push(format!("Decimals: {}", self.decimals));
        } else {
            lines.push("Only emit".to_owned());
        }
        lines
    }
}

/// One rendered element produced by [`Emitter::emit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmittedIncident {
    /// Unique key the payload is attached under. `None` when the entity
    /// did not emit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// The payload to post back. `None` when the entity did not emit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<IncidentPayload>,

    /// Formatted current energy, when display is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Produces incidents for rendered entities.
#[derive(Debug)]
pub struct Emitter {
    settings: EmitterSettings,
    signer: Option<IncidentSigner>,
    next_key: AtomicU64,
}

impl Emitter {
    /// Create an emitter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `settings` do not validate.
    pub fn new(
        settings: EmitterSettings,
        signer: Option<IncidentSigner>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            settings,
            signer,
            next_key: AtomicU64::new(0),
        })
    }

    /// The validated settings.
    pub const fn settings(&self) -> &EmitterSettings {
        &self.settings
    }

    /// Render `entity` with one element per current field value.
    pub fn emit<P: Publishable + ?Sized>(
        &self,
        entity: &P,
        current_values: &[f64],
    ) -> Vec<EmittedIncident> {
        let published = entity.is_published();
        current_values
            .iter()
            .map(|&current| {
                let (key, payload) = if published {
                    (Some(self.next_key()), Some(self.payload(entity.entity_id())))
                } else {
                    (None, None)
                };
                let display = self
                    .settings
                    .display
                    .then(|| format_energy(current, self.settings.decimals));
                EmittedIncident {
                    key,
                    payload,
                    display,
                }
            })
            .collect()
    }

    /// Build the (signed, when a secret is configured) payload for one
    /// incident against `entity_id`.
    ///
    /// The timestamp is left out; the ingestion endpoint stamps receipt
    /// time.
    pub fn payload(&self, entity_id: &EntityId) -> IncidentPayload {
        let energy = self.settings.energy;
        IncidentPayload {
            entity_id: Some(entity_id.as_str().to_owned()),
            energy: Some(energy),
            hash: self
                .signer
                .as_ref()
                .map(|signer| signer.sign(entity_id.as_str(), energy)),
            ..IncidentPayload::default()
        }
    }

    fn next_key(&self) -> String {
        let n = self.next_key.fetch_add(1, Ordering::Relaxed);
        format!("{EMIT_KEY_PREFIX}{n}")
    }
}

/// Format `value` with `decimals` fixed decimals, `,` as thousands
/// separator and `.` as decimal point.
pub fn format_energy(value: f64, decimals: u32) -> String {
    let precision = usize::try_from(decimals.min(MAX_DECIMALS)).unwrap_or(0);
    let fixed = format!("{:.*}", precision, value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));

    let mut grouped = String::with_capacity(fixed.len().saturating_add(int_part.len() / 3));
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len().saturating_sub(i)) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let negative = value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}
