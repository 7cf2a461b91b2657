//! Decay profiles.
//!
//! A [`DecayProfile`] maps a stored value and the time elapsed since its
//! last update to the value it has now. Every profile is monotonically
//! non-increasing in elapsed time and is the identity for zero elapsed
//! time, so recomputing twice at the same instant changes nothing.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{ConfigError, DecayConfig, DecayProfileKind};

/// Decay curve plus the cutoff below which values snap to zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayProfile {
    curve: Curve,
    cutoff: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Curve {
    Exponential { half_life_secs: f64 },
    Linear { rate_per_sec: f64 },
    Count,
}

impl DecayProfile {
    /// Exponential decay with the given half-life.
    pub fn exponential(half_life: Duration) -> Self {
        Self {
            curve: Curve::Exponential {
                half_life_secs: half_life.as_secs_f64(),
            },
            cutoff: 0.0,
        }
    }

    /// Linear decay losing `rate_per_sec` energy every second.
    pub const fn linear(rate_per_sec: f64) -> Self {
        Self {
            curve: Curve::Linear { rate_per_sec },
            cutoff: 0.0,
        }
    }

    /// No decay at all.
    pub const fn count() -> Self {
        Self {
            curve: Curve::Count,
            cutoff: 0.0,
        }
    }

    /// Snap decayed values strictly below `cutoff` to zero.
    #[must_use]
    pub const fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Build a profile from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the parameters are out of range.
    pub fn from_config(config: &DecayConfig) -> Result<Self, ConfigError> {
        let profile = match config.profile {
            DecayProfileKind::Exponential => {
                if config.half_life_secs == 0 {
                    return Err(ConfigError::Invalid {
                        field: "decay.half_life_secs",
                        reason: "must be at least 1".to_owned(),
                    });
                }
                Self::exponential(config.half_life())
            }
            DecayProfileKind::Linear => {
                if !config.linear_rate.is_finite() || config.linear_rate <= 0.0 {
                    return Err(ConfigError::Invalid {
                        field: "decay.linear_rate",
                        reason: "must be a positive finite number".to_owned(),
                    });
                }
                Self::linear(config.linear_rate)
            }
            DecayProfileKind::Count => Self::count(),
        };
        if !config.cutoff.is_finite() || config.cutoff < 0.0 {
            return Err(ConfigError::Invalid {
                field: "decay.cutoff",
                reason: "must be a finite number >= 0".to_owned(),
            });
        }
        Ok(profile.with_cutoff(config.cutoff))
    }

    /// Value of `value` after `elapsed_secs` seconds of decay.
    ///
    /// Negative or NaN elapsed time counts as zero. The result is never
    /// negative.
    pub fn apply(&self, value: f64, elapsed_secs: f64) -> f64 {
        let value = if value.is_nan() { 0.0 } else { value.max(0.0) };
        let elapsed = if elapsed_secs.is_nan() {
            0.0
        } else {
            elapsed_secs.max(0.0)
        };
        if elapsed <= 0.0 {
            return value;
        }

        let decayed = match self.curve {
            Curve::Exponential { half_life_secs } => {
                value * 0.5_f64.powf(elapsed / half_life_secs)
            }
            Curve::Linear { rate_per_sec } => rate_per_sec.mul_add(-elapsed, value),
            Curve::Count => value,
        };

        if decayed.is_nan() || decayed < self.cutoff || decayed <= 0.0 {
            0.0
        } else {
            decayed
        }
    }

    /// Decay `value` from `since` to `now`.
    pub fn apply_between(&self, value: f64, since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        self.apply(value, elapsed_secs(since, now))
    }

    /// Whether this profile ever reduces a value.
    pub const fn decays(&self) -> bool {
        !matches!(self.curve, Curve::Count)
    }
}

/// Seconds from `since` to `now`, clamped at zero.
#[allow(clippy::cast_precision_loss)]
pub fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = now.signed_duration_since(since).num_milliseconds();
    if millis <= 0 {
        0.0
    } else {
        millis as f64 / 1000.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn exponential_halves_per_half_life() {
        let profile = DecayProfile::exponential(Duration::from_secs(10));
        assert!(close(profile.apply(100.0, 10.0), 50.0));
        assert!(close(profile.apply(100.0, 20.0), 25.0));
        assert!(close(profile.apply(100.0, 5.0), 100.0 * 0.5_f64.sqrt()));
    }

    #[test]
    fn zero_elapsed_is_identity_and_idempotent() {
        for profile in [
            DecayProfile::exponential(Duration::from_secs(10)),
            DecayProfile::linear(2.0),
            DecayProfile::count(),
        ] {
            let once = profile.apply(42.0, 0.0);
            let twice = profile.apply(once, 0.0);
            assert!(close(once, 42.0));
            assert!(close(once, twice));
        }
    }

    #[test]
    fn decay_is_monotone_non_increasing() {
        let profile = DecayProfile::exponential(Duration::from_secs(7)).with_cutoff(0.01);
        let mut previous = f64::INFINITY;
        for step in 0..200 {
            let value = profile.apply(1000.0, f64::from(step));
            assert!(value <= previous);
            assert!(value >= 0.0);
            previous = value;
        }
    }

    #[test]
    fn linear_floors_at_zero() {
        let profile = DecayProfile::linear(2.0);
        assert!(close(profile.apply(10.0, 3.0), 4.0));
        assert!(close(profile.apply(10.0, 100.0), 0.0));
    }

    #[test]
    fn count_never_decays() {
        let profile = DecayProfile::count();
        assert!(close(profile.apply(10.0, 1e9), 10.0));
        assert!(!profile.decays());
    }

    #[test]
    fn cutoff_snaps_to_zero() {
        let profile = DecayProfile::exponential(Duration::from_secs(1)).with_cutoff(1.0);
        // 100 * 2^-7 = 0.78 < 1.0
        assert!(close(profile.apply(100.0, 7.0), 0.0));
        assert!(profile.apply(100.0, 6.0) > 1.0);
    }

    #[test]
    fn negative_elapsed_counts_as_zero() {
        let profile = DecayProfile::exponential(Duration::from_secs(10));
        assert!(close(profile.apply(80.0, -5.0), 80.0));
        let later = DateTime::from_timestamp(100, 0).unwrap();
        let earlier = DateTime::from_timestamp(50, 0).unwrap();
        assert!(close(elapsed_secs(later, earlier), 0.0));
        assert!(close(elapsed_secs(earlier, later), 50.0));
    }

    #[test]
    fn from_config_rejects_bad_parameters() {
        let mut config = DecayConfig {
            half_life_secs: 0,
            ..DecayConfig::default()
        };
        assert!(DecayProfile::from_config(&config).is_err());

        config.profile = DecayProfileKind::Count;
        assert!(DecayProfile::from_config(&config).is_ok());

        config.cutoff = f64::NAN;
        assert!(DecayProfile::from_config(&config).is_err());
    }
}
