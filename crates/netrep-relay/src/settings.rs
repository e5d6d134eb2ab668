//! Replication tuning knobs.
//!
//! Settings are a plain value: the dispatcher holds one snapshot and callers
//! replace it wholesale. A replacement that fails [`ReplicationSettings::validate`]
//! leaves the previous snapshot in place.

use netrep_config::ReplicationConfig;
use serde::{Deserialize, Serialize};

/// Why a settings value was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    /// The replication interval must be a positive, finite number of seconds.
    #[error("replication interval must be positive, got {0}")]
    Interval(f32),

    /// The frequency cap must be at least 1 Hz.
    #[error("max replication frequency must be at least 1")]
    Frequency,

    /// A field that must be finite and non-negative was not.
    #[error("{field} must be finite and non-negative, got {value}")]
    Negative {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: f32,
    },
}

/// Tuning for the relay. Defaults come from [`ReplicationConfig::default`],
/// so the persisted section and the runtime value cannot disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationSettings {
    /// Seconds between replication passes.
    pub replication_interval: f32,
    /// Relevancy cull distance in world units.
    pub max_replication_distance: f32,
    /// Compress messages on the wire.
    pub enable_compression: bool,
    /// Observers may predict locally.
    pub enable_client_prediction: bool,
    /// Use the interest set.
    pub enable_interest_management: bool,
    /// Allowed prediction error before correction.
    pub prediction_tolerance: f32,
    /// Cap on replication passes per second.
    pub max_replication_frequency: u32,
    /// Cull by distance in [`is_relevant`](crate::relevancy::is_relevant).
    pub enable_relevancy: bool,
    /// Soft bandwidth budget in KB/s.
    pub bandwidth_limit_kb: f32,
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self::from_config(&ReplicationConfig::default())
    }
}

impl ReplicationSettings {
    /// Builds settings from the persisted configuration section.
    pub fn from_config(config: &ReplicationConfig) -> Self {
        Self {
            replication_interval: config.replication_interval,
            max_replication_distance: config.max_replication_distance,
            enable_compression: config.enable_compression,
            enable_client_prediction: config.enable_client_prediction,
            enable_interest_management: config.enable_interest_management,
            prediction_tolerance: config.prediction_tolerance,
            max_replication_frequency: config.max_replication_frequency,
            enable_relevancy: config.enable_relevancy,
            bandwidth_limit_kb: config.bandwidth_limit_kb,
        }
    }

    /// Checks internal consistency.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.replication_interval.is_finite() && self.replication_interval > 0.0) {
            return Err(SettingsError::Interval(self.replication_interval));
        }
        if self.max_replication_frequency == 0 {
            return Err(SettingsError::Frequency);
        }
        for (field, value) in [
            ("max_replication_distance", self.max_replication_distance),
            ("prediction_tolerance", self.prediction_tolerance),
            ("bandwidth_limit_kb", self.bandwidth_limit_kb),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SettingsError::Negative { field, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let s = ReplicationSettings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.replication_interval, 0.05);
        assert_eq!(s.max_replication_distance, 15_000.0);
        assert_eq!(s.max_replication_frequency, 60);
        assert!(s.enable_relevancy);
    }

    #[test]
    fn test_from_config_carries_every_field() {
        let config = ReplicationConfig {
            replication_interval: 0.25,
            max_replication_distance: 800.0,
            enable_compression: false,
            enable_client_prediction: false,
            enable_interest_management: false,
            prediction_tolerance: 0.5,
            max_replication_frequency: 10,
            enable_relevancy: false,
            bandwidth_limit_kb: 12.0,
        };
        let s = ReplicationSettings::from_config(&config);
        assert_eq!(s.replication_interval, 0.25);
        assert_eq!(s.max_replication_distance, 800.0);
        assert!(!s.enable_compression);
        assert!(!s.enable_client_prediction);
        assert!(!s.enable_interest_management);
        assert_eq!(s.prediction_tolerance, 0.5);
        assert_eq!(s.max_replication_frequency, 10);
        assert!(!s.enable_relevancy);
        assert_eq!(s.bandwidth_limit_kb, 12.0);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut s = ReplicationSettings::default();
        s.replication_interval = 0.0;
        assert_eq!(s.validate(), Err(SettingsError::Interval(0.0)));

        let mut s = ReplicationSettings::default();
        s.max_replication_frequency = 0;
        assert_eq!(s.validate(), Err(SettingsError::Frequency));

        let mut s = ReplicationSettings::default();
        s.max_replication_distance = -1.0;
        assert!(matches!(
            s.validate(),
            Err(SettingsError::Negative {
                field: "max_replication_distance",
                ..
            })
        ));

        let mut s = ReplicationSettings::default();
        s.bandwidth_limit_kb = f32::INFINITY;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_zero_distance_is_allowed() {
        let s = ReplicationSettings {
            max_replication_distance: 0.0,
            ..Default::default()
        };
        assert!(s.validate().is_ok());
    }
}
