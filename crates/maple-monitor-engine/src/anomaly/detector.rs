//! Anomaly detector: model path with statistical fallback.
//!
//! Provides:
//! - `StatisticalScorer`: per-feature z-scores against the history
//! - `AnomalyDetector`: LEARNING gate, optional model, fallback tagging

use std::sync::Arc;

use tracing::warn;

use crate::config::EngineConfig;
use crate::features::FeatureVector;
use crate::stats;

use super::model::AnomalyModel;
use super::types::{AnomalyResult, AnomalyStatus, DetectionMethod, ZScoreSummary};

// ── Statistical Scorer ──────────────────────────────────────────────────

/// Z-score scoring with thresholds derived from a base threshold `T`.
///
/// `max_z > 1.5T` → HIGH, `max_z > T` → MEDIUM, `mean_z > 0.75T` → LOW.
#[derive(Clone, Debug)]
pub struct StatisticalScorer {
    pub high_z: f64,
    pub medium_z: f64,
    pub low_mean_z: f64,
}

impl StatisticalScorer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            high_z: config.high_z(),
            medium_z: config.anomaly_threshold_z,
            low_mean_z: config.low_mean_z(),
        }
    }

    /// Aggregate z-scores of `current` against `history`.
    ///
    /// Features with zero spread are skipped.
    pub fn z_scores(&self, history: &[FeatureVector], current: &FeatureVector) -> ZScoreSummary {
        let mut scores = Vec::new();
        for (i, value) in current.values().iter().enumerate() {
            let column: Vec<f64> = history.iter().map(|v| v.get(i)).collect();
            let std = stats::std_dev(&column);
            if std > 0.0 {
                scores.push((value - stats::mean(&column)).abs() / std);
            }
        }
        ZScoreSummary {
            max_z: scores.iter().copied().fold(0.0, f64::max),
            mean_z: stats::mean(&scores),
            contributing: scores.len(),
        }
    }

    pub fn classify(&self, z: &ZScoreSummary) -> AnomalyStatus {
        if z.max_z > self.high_z {
            AnomalyStatus::HighAnomaly
        } else if z.max_z > self.medium_z {
            AnomalyStatus::MediumAnomaly
        } else if z.mean_z > self.low_mean_z {
            AnomalyStatus::LowAnomaly
        } else {
            AnomalyStatus::Normal
        }
    }
}

// ── Detector ────────────────────────────────────────────────────────────

/// Scores the current feature vector against the entity's history.
///
/// The model backend is fixed at construction; `None` means statistical
/// scoring only.
#[derive(Clone)]
pub struct AnomalyDetector {
    scorer: StatisticalScorer,
    min_samples_statistical: usize,
    min_samples_model: usize,
    model: Option<Arc<dyn AnomalyModel>>,
}

impl std::fmt::Debug for AnomalyDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyDetector")
            .field("scorer", &self.scorer)
            .field("min_samples_statistical", &self.min_samples_statistical)
            .field("min_samples_model", &self.min_samples_model)
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .finish()
    }
}

impl AnomalyDetector {
    /// Statistical-only detector.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            scorer: StatisticalScorer::new(config),
            min_samples_statistical: config.min_samples_statistical,
            min_samples_model: config.min_samples_model,
            model: None,
        }
    }

    /// Detector with a model backend.
    pub fn with_model(config: &EngineConfig, model: Arc<dyn AnomalyModel>) -> Self {
        Self {
            model: Some(model),
            ..Self::new(config)
        }
    }

    /// Score `current` against `history` (which excludes `current`).
    ///
    /// Never fails: a model error falls back to the statistical path and is
    /// recorded as `fallback_cause`.
    pub fn detect(&self, history: &[FeatureVector], current: &FeatureVector) -> AnomalyResult {
        if history.len() + 1 < self.min_samples_statistical {
            return AnomalyResult::learning();
        }

        let mut method = DetectionMethod::Statistical;
        let mut fallback_cause = None;

        if let Some(model) = &self.model {
            if history.len() >= self.min_samples_model {
                match model.fit_score(history, current) {
                    Ok(scored) => {
                        return AnomalyResult {
                            status: scored.status,
                            score: scored.score,
                            method: DetectionMethod::Model,
                            z: Some(self.scorer.z_scores(history, current)),
                            fallback_cause: None,
                            patterns: Vec::new(),
                            findings: Vec::new(),
                        };
                    }
                    Err(e) => {
                        warn!(model = model.name(), error = %e, "model scoring failed, using statistical fallback");
                        method = DetectionMethod::ModelFallback;
                        fallback_cause = Some(e.to_string());
                    }
                }
            }
        }

        let z = self.scorer.z_scores(history, current);
        AnomalyResult {
            status: self.scorer.classify(&z),
            score: z.max_z,
            method,
            z: Some(z),
            fallback_cause,
            patterns: Vec::new(),
            findings: Vec::new(),
        }
    }
}
