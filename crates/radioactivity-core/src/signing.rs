//! Incident signatures.
//!
//! When a shared secret is configured, the emitter attaches
//! `hex(HMAC-SHA256(secret, "<entity_id>##<energy>"))` to every payload and
//! the ingestion endpoint refuses items whose hash does not match. This
//! stops clients from inflating scores with hand-crafted incidents.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::ConfigError;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies incident payloads with a shared secret.
#[derive(Clone)]
pub struct IncidentSigner {
    mac: HmacSha256,
}

impl core::fmt::Debug for IncidentSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IncidentSigner").finish_non_exhaustive()
    }
}

impl IncidentSigner {
    /// Create a signer keyed with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty secret.
    pub fn new(secret: &str) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::Invalid {
                field: "ingest.secret",
                reason: "must not be empty".to_owned(),
            });
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
            ConfigError::Invalid {
                field: "ingest.secret",
                reason: e.to_string(),
            }
        })?;
        Ok(Self { mac })
    }

    /// Hex signature for an entity id and energy.
    pub fn sign(&self, entity_id: &str, energy: f64) -> String {
        let mut mac = self.mac.clone();
        mac.update(signed_message(entity_id, energy).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Check `hash` against the expected signature in constant time.
    pub fn verify(&self, entity_id: &str, energy: f64, hash: &str) -> bool {
        let Ok(raw) = hex::decode(hash) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(signed_message(entity_id, energy).as_bytes());
        mac.verify_slice(&raw).is_ok()
    }
}

fn signed_message(entity_id: &str, energy: f64) -> String {
    // `Display` for f64 is the shortest round-trip form, so a value that
    // went through JSON formats identically on both sides.
    format!("{entity_id}##{energy}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let signer = IncidentSigner::new("s3cret").unwrap();
        let hash = signer.sign("node:1", 10.0);
        assert_eq!(hash.len(), 64);
        assert!(signer.verify("node:1", 10.0, &hash));
    }

    #[test]
    fn tampered_energy_or_entity_fails() {
        let signer = IncidentSigner::new("s3cret").unwrap();
        let hash = signer.sign("node:1", 10.0);
        assert!(!signer.verify("node:1", 1000.0, &hash));
        assert!(!signer.verify("node:2", 10.0, &hash));
    }

    #[test]
    fn other_secret_fails() {
        let a = IncidentSigner::new("a").unwrap();
        let b = IncidentSigner::new("b").unwrap();
        assert!(!b.verify("node:1", 1.0, &a.sign("node:1", 1.0)));
    }

    #[test]
    fn non_hex_hash_fails() {
        let signer = IncidentSigner::new("s3cret").unwrap();
        assert!(!signer.verify("node:1", 1.0, "not hex"));
    }

    #[test]
    fn signature_survives_json_round_trip() {
        let signer = IncidentSigner::new("s3cret").unwrap();
        let energy = 0.1 + 0.2;
        let hash = signer.sign("node:1", energy);
        let decoded: f64 = serde_json::from_str(&serde_json::to_string(&energy).unwrap()).unwrap();
        assert!(signer.verify("node:1", decoded, &hash));
    }

    #[test]
    fn empty_secret_is_invalid() {
        assert!(IncidentSigner::new("").is_err());
    }
}
