//! Core types for anomaly detection.

use serde::{Deserialize, Serialize};

use crate::fingerprint::BehaviorFinding;
use crate::trend::{Pattern, Severity};

/// Classification of the current sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyStatus {
    /// Not enough history yet. Not an error.
    Learning,
    Normal,
    LowAnomaly,
    MediumAnomaly,
    HighAnomaly,
}

impl AnomalyStatus {
    pub fn is_anomalous(&self) -> bool {
        self.severity().is_some()
    }

    /// Severity tier for anomalous states.
    pub fn severity(&self) -> Option<Severity> {
        match self {
            Self::LowAnomaly => Some(Severity::Low),
            Self::MediumAnomaly => Some(Severity::Medium),
            Self::HighAnomaly => Some(Severity::High),
            Self::Learning | Self::Normal => None,
        }
    }
}

impl std::fmt::Display for AnomalyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Learning => write!(f, "LEARNING"),
            Self::Normal => write!(f, "NORMAL"),
            Self::LowAnomaly => write!(f, "LOW_ANOMALY"),
            Self::MediumAnomaly => write!(f, "MEDIUM_ANOMALY"),
            Self::HighAnomaly => write!(f, "HIGH_ANOMALY"),
        }
    }
}

/// Which path produced a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Statistical,
    Model,
    /// The model failed; the statistical path produced the result.
    ModelFallback,
}

/// Aggregated z-scores over the features that had variance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZScoreSummary {
    pub max_z: f64,
    pub mean_z: f64,
    /// Features with std > 0.
    pub contributing: usize,
}

/// Outcome of scoring one sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub status: AnomalyStatus,
    /// `max_z` on the statistical path, the native model score otherwise.
    pub score: f64,
    pub method: DetectionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<ZScoreSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_cause: Option<String>,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub findings: Vec<BehaviorFinding>,
}

impl AnomalyResult {
    /// Cold-start result.
    pub fn learning() -> Self {
        Self {
            status: AnomalyStatus::Learning,
            score: 0.0,
            method: DetectionMethod::Statistical,
            z: None,
            fallback_cause: None,
            patterns: Vec::new(),
            findings: Vec::new(),
        }
    }

    pub fn is_learning(&self) -> bool {
        self.status == AnomalyStatus::Learning
    }
}
