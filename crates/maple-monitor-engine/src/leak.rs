//! Sustained-growth (leak) detection on resident memory size.
//!
//! Runs independently of the anomaly detector: slow steady growth is rarely
//! a statistical outlier against its own recent mean.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::sample::EntityId;
use crate::stats;
use crate::trend::Severity;

/// Minimum sizes needed to fit a growth rate.
const MIN_LEAK_SAMPLES: usize = 2;

/// Leak severity. There is no LOW tier: below MEDIUM no leak is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeakSeverity {
    Medium,
    High,
}

impl From<LeakSeverity> for Severity {
    fn from(s: LeakSeverity) -> Self {
        match s {
            LeakSeverity::Medium => Severity::Medium,
            LeakSeverity::High => Severity::High,
        }
    }
}

/// A detected leak.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeakReport {
    pub entity: EntityId,
    /// Relative growth per sample: OLS slope over the window divided by the
    /// fitted level at its start (the mean when that level is not positive).
    /// Not comparable with `FingerprintStats::growth_rate`, which divides the
    /// slope by the mean.
    pub growth_rate: f64,
    pub severity: LeakSeverity,
    pub current_resident_bytes: f64,
    /// Sizes the rate was fitted on.
    pub samples: usize,
}

/// Growth-rate classifier.
#[derive(Clone, Debug)]
pub struct LeakDetector {
    window: usize,
    medium: f64,
    high: f64,
}

impl Default for LeakDetector {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl LeakDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            window: config.leak_window,
            medium: config.leak_medium_threshold,
            high: config.leak_high_threshold,
        }
    }

    /// Relative growth per step over the last `window` sizes.
    ///
    /// The slope is normalized by the fitted level at the start of the
    /// window, or by the mean when that level is not positive.
    pub fn growth_rate(&self, sizes: &[f64]) -> f64 {
        let recent = &sizes[sizes.len().saturating_sub(self.window)..];
        if recent.len() < MIN_LEAK_SAMPLES {
            return 0.0;
        }
        let fit = stats::linear_fit(recent);
        let base = if fit.intercept > 0.0 {
            fit.intercept
        } else {
            stats::mean(recent)
        };
        if base <= 0.0 {
            return 0.0;
        }
        fit.slope / base
    }

    /// Classify the resident-size sequence of one entity.
    pub fn detect(&self, entity: &EntityId, sizes: &[f64]) -> Option<LeakReport> {
        let recent = &sizes[sizes.len().saturating_sub(self.window)..];
        if recent.len() < MIN_LEAK_SAMPLES {
            return None;
        }
        let growth_rate = self.growth_rate(recent);
        let severity = if growth_rate > self.high {
            LeakSeverity::High
        } else if growth_rate > self.medium {
            LeakSeverity::Medium
        } else {
            return None;
        };
        Some(LeakReport {
            entity: entity.clone(),
            growth_rate,
            severity,
            current_resident_bytes: recent.last().copied().unwrap_or(0.0),
            samples: recent.len(),
        })
    }
}
