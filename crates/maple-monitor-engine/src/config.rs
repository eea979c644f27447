//! Engine configuration.
//!
//! Every option has a default, so a partial TOML/JSON document deserializes
//! into a complete `EngineConfig`.

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};

/// Default per-entity history capacity.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Fingerprints are recomputed on every Nth append.
pub const DEFAULT_FINGERPRINT_INTERVAL: usize = 10;

/// Base z-score threshold (MEDIUM boundary).
pub const DEFAULT_ANOMALY_THRESHOLD_Z: f64 = 2.0;

/// Window length before statistical scoring starts.
pub const DEFAULT_MIN_SAMPLES_STATISTICAL: usize = 5;

/// Training vectors required before the model path is attempted.
pub const DEFAULT_MIN_SAMPLES_MODEL: usize = 10;

/// Leak growth rate for MEDIUM severity.
pub const DEFAULT_LEAK_MEDIUM_THRESHOLD: f64 = 0.05;

/// Leak growth rate for HIGH severity.
pub const DEFAULT_LEAK_HIGH_THRESHOLD: f64 = 0.10;

/// Configuration for the pattern engine and its components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum samples retained per entity.
    pub history_capacity: usize,
    /// Recompute the fingerprint every N appends.
    pub fingerprint_recompute_interval: usize,
    /// Base z-score threshold. HIGH is 1.5x, LOW (mean z) is 0.75x.
    pub anomaly_threshold_z: f64,
    /// Minimum window length before scoring.
    pub min_samples_statistical: usize,
    /// Minimum training vectors for the model path.
    pub min_samples_model: usize,
    /// Growth rate for a MEDIUM leak.
    pub leak_medium_threshold: f64,
    /// Growth rate for a HIGH leak.
    pub leak_high_threshold: f64,
    /// Number of recent values used for the trend fit.
    pub trend_window: usize,
    /// Minimum values before a trend is reported.
    pub min_samples_trend: usize,
    /// Slope magnitude for a MEDIUM increasing trend.
    pub trend_low_slope: f64,
    /// Slope magnitude for a HIGH increasing trend.
    pub trend_high_slope: f64,
    /// Values used (and required) for periodicity detection.
    pub periodicity_window: usize,
    /// Recent resident sizes inspected by the leak detector.
    pub leak_window: usize,
    /// Minimum samples before a fingerprint can be computed.
    pub min_samples_fingerprint: usize,
    /// Steps ahead covered by the utilization forecast.
    pub forecast_horizon: usize,
    /// Forecast value (percent) that produces an insight.
    pub forecast_alert_percent: f64,
    /// Entity cap applied by `evict_least_recent`.
    pub max_entities: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            fingerprint_recompute_interval: DEFAULT_FINGERPRINT_INTERVAL,
            anomaly_threshold_z: DEFAULT_ANOMALY_THRESHOLD_Z,
            min_samples_statistical: DEFAULT_MIN_SAMPLES_STATISTICAL,
            min_samples_model: DEFAULT_MIN_SAMPLES_MODEL,
            leak_medium_threshold: DEFAULT_LEAK_MEDIUM_THRESHOLD,
            leak_high_threshold: DEFAULT_LEAK_HIGH_THRESHOLD,
            trend_window: 10,
            min_samples_trend: 5,
            trend_low_slope: 1.0,
            trend_high_slope: 5.0,
            periodicity_window: 20,
            leak_window: 20,
            min_samples_fingerprint: 5,
            forecast_horizon: 3,
            forecast_alert_percent: 90.0,
            max_entities: None,
        }
    }
}

impl EngineConfig {
    /// Check internal consistency.
    pub fn validate(&self) -> MonitorResult<()> {
        let windows = [
            ("history_capacity", self.history_capacity),
            (
                "fingerprint_recompute_interval",
                self.fingerprint_recompute_interval,
            ),
            ("min_samples_statistical", self.min_samples_statistical),
            ("min_samples_model", self.min_samples_model),
            ("trend_window", self.trend_window),
            ("periodicity_window", self.periodicity_window),
            ("leak_window", self.leak_window),
            ("min_samples_fingerprint", self.min_samples_fingerprint),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(MonitorError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        let thresholds = [
            ("anomaly_threshold_z", self.anomaly_threshold_z),
            ("leak_medium_threshold", self.leak_medium_threshold),
            ("leak_high_threshold", self.leak_high_threshold),
            ("trend_low_slope", self.trend_low_slope),
            ("trend_high_slope", self.trend_high_slope),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value <= 0.0 {
                return Err(MonitorError::InvalidConfig(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        if self.leak_high_threshold < self.leak_medium_threshold {
            return Err(MonitorError::InvalidConfig(format!(
                "leak_high_threshold ({}) is below leak_medium_threshold ({})",
                self.leak_high_threshold, self.leak_medium_threshold
            )));
        }
        if self.trend_high_slope < self.trend_low_slope {
            return Err(MonitorError::InvalidConfig(format!(
                "trend_high_slope ({}) is below trend_low_slope ({})",
                self.trend_high_slope, self.trend_low_slope
            )));
        }
        if self.max_entities == Some(0) {
            return Err(MonitorError::InvalidConfig(
                "max_entities must be greater than zero when set".into(),
            ));
        }

        Ok(())
    }

    /// z-score above which a result is HIGH_ANOMALY.
    pub fn high_z(&self) -> f64 {
        self.anomaly_threshold_z * 1.5
    }

    /// Mean z-score above which a result is LOW_ANOMALY.
    pub fn low_mean_z(&self) -> f64 {
        self.anomaly_threshold_z * 0.75
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.history_capacity, 100);
        assert_eq!(cfg.fingerprint_recompute_interval, 10);
        assert!((cfg.anomaly_threshold_z - 2.0).abs() < f64::EPSILON);
        assert_eq!(cfg.min_samples_statistical, 5);
        assert_eq!(cfg.min_samples_model, 10);
        assert!((cfg.leak_medium_threshold - 0.05).abs() < f64::EPSILON);
        assert!((cfg.leak_high_threshold - 0.10).abs() < f64::EPSILON);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn derived_thresholds() {
        let cfg = EngineConfig::default();
        assert!((cfg.high_z() - 3.0).abs() < 1e-12);
        assert!((cfg.low_mean_z() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_zero_capacity() {
        let cfg = EngineConfig {
            history_capacity: 0,
            ..EngineConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("history_capacity"));
    }

    #[test]
    fn rejects_inverted_leak_thresholds() {
        let cfg = EngineConfig {
            leak_medium_threshold: 0.2,
            leak_high_threshold: 0.1,
            ..EngineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(MonitorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_non_positive_threshold() {
        let cfg = EngineConfig {
            anomaly_threshold_z: 0.0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_document_fills_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"history_capacity": 50, "max_entities": 8}"#).unwrap();
        assert_eq!(cfg.history_capacity, 50);
        assert_eq!(cfg.max_entities, Some(8));
        assert_eq!(cfg.min_samples_model, 10);
    }
}
