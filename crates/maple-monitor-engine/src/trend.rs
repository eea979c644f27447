//! Trend, periodicity, variability and forecast over a feature history.
//!
//! The tracked scalar series is the utilization feature. Every analysis has
//! a minimum input length; below it no pattern is emitted.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::features::{FeatureVector, FEATURE_NAMES};
use crate::stats;

/// Values used by the short-horizon forecast fit.
const FORECAST_WINDOW: usize = 5;

/// Minimum values for a forecast.
const MIN_FORECAST_SAMPLES: usize = 3;

/// A feature is "highly variable" when std > this fraction of its mean.
const VARIABILITY_RATIO: f64 = 0.5;

/// ...and std exceeds this absolute floor.
const VARIABILITY_FLOOR: f64 = 0.1;

// ── Patterns ────────────────────────────────────────────────────────────

/// Severity tier shared by patterns, leaks and insights.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// The evidence carried by a detected pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternKind {
    IncreasingTrend { slope: f64 },
    DecreasingTrend { slope: f64 },
    Periodic { period: usize, strength: f64 },
    HighVariability { features: Vec<String>, ratio: f64 },
}

/// A detected pattern with its severity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(flatten)]
    pub kind: PatternKind,
    pub severity: Severity,
}

impl Pattern {
    /// Stable name of the pattern type.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            PatternKind::IncreasingTrend { .. } => "increasing_trend",
            PatternKind::DecreasingTrend { .. } => "decreasing_trend",
            PatternKind::Periodic { .. } => "periodic",
            PatternKind::HighVariability { .. } => "high_variability",
        }
    }
}

/// Confidence attached to a forecast point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForecastConfidence {
    Low,
    Medium,
}

/// Linear extrapolation of the utilization feature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub steps_ahead: usize,
    /// Predicted utilization, clamped to [0, 100].
    pub predicted_percent: f64,
    pub confidence: ForecastConfidence,
}

// ── Analyzer ────────────────────────────────────────────────────────────

/// Slope, autocorrelation and variability analysis.
#[derive(Clone, Debug)]
pub struct TrendAnalyzer {
    trend_window: usize,
    min_samples_trend: usize,
    low_slope: f64,
    high_slope: f64,
    periodicity_window: usize,
    min_samples_variability: usize,
    forecast_horizon: usize,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl TrendAnalyzer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            trend_window: config.trend_window,
            min_samples_trend: config.min_samples_trend,
            low_slope: config.trend_low_slope,
            high_slope: config.trend_high_slope,
            periodicity_window: config.periodicity_window,
            min_samples_variability: config.min_samples_model,
            forecast_horizon: config.forecast_horizon,
        }
    }

    /// Trend and periodicity over a scalar series.
    pub fn analyze(&self, series: &[f64]) -> Vec<Pattern> {
        self.trend(series)
            .into_iter()
            .chain(self.periodicity(series))
            .collect()
    }

    /// OLS slope over the last `trend_window` values.
    pub fn trend(&self, series: &[f64]) -> Option<Pattern> {
        let recent = tail(series, self.trend_window);
        if recent.len() < self.min_samples_trend {
            return None;
        }
        let slope = stats::linear_fit(recent).slope;

        if slope > self.high_slope {
            Some(Pattern {
                kind: PatternKind::IncreasingTrend { slope },
                severity: Severity::High,
            })
        } else if slope > self.low_slope {
            Some(Pattern {
                kind: PatternKind::IncreasingTrend { slope },
                severity: Severity::Medium,
            })
        } else if slope < -self.high_slope {
            Some(Pattern {
                kind: PatternKind::DecreasingTrend { slope },
                severity: Severity::High,
            })
        } else if slope < -self.low_slope {
            Some(Pattern {
                kind: PatternKind::DecreasingTrend { slope },
                severity: Severity::Low,
            })
        } else {
            None
        }
    }

    /// First autocorrelation peak over the last `periodicity_window` values.
    pub fn periodicity(&self, series: &[f64]) -> Option<Pattern> {
        if series.len() < self.periodicity_window || self.periodicity_window < 3 {
            return None;
        }
        let acf = autocorrelation(tail(series, self.periodicity_window));
        if acf.is_empty() {
            return None;
        }

        (1..acf.len() - 1)
            .find(|&k| acf[k] > acf[k - 1] && acf[k] > acf[k + 1])
            .map(|period| Pattern {
                kind: PatternKind::Periodic {
                    period,
                    strength: acf[period],
                },
                severity: Severity::Low,
            })
    }

    /// Flag features whose spread is large relative to their mean.
    pub fn variability(&self, history: &[FeatureVector]) -> Option<Pattern> {
        if history.len() < self.min_samples_variability || history.is_empty() {
            return None;
        }
        let dims = history[0].len();

        let mut flagged = Vec::new();
        let mut ratio = 0.0f64;
        for i in 0..dims {
            let column: Vec<f64> = history.iter().map(|fv| fv.get(i)).collect();
            let mean = stats::mean(&column);
            let std = stats::std_dev(&column);
            if std > VARIABILITY_RATIO * mean && std > VARIABILITY_FLOOR {
                flagged.push(
                    FEATURE_NAMES
                        .get(i)
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| format!("feature_{}", i)),
                );
                if mean > 0.0 {
                    ratio = ratio.max(std / mean);
                }
            }
        }

        if flagged.is_empty() {
            return None;
        }
        let severity = if ratio > 1.0 {
            Severity::Medium
        } else {
            Severity::Low
        };
        Some(Pattern {
            kind: PatternKind::HighVariability {
                features: flagged,
                ratio,
            },
            severity,
        })
    }

    /// Extrapolate the last few values `forecast_horizon` steps ahead.
    pub fn forecast(&self, series: &[f64]) -> Vec<Forecast> {
        let recent = tail(series, FORECAST_WINDOW);
        if recent.len() < MIN_FORECAST_SAMPLES {
            return Vec::new();
        }
        let fit = stats::linear_fit(recent);
        let confidence = if fit.slope.abs() > self.high_slope {
            ForecastConfidence::Low
        } else {
            ForecastConfidence::Medium
        };
        let last = (recent.len() - 1) as f64;

        (1..=self.forecast_horizon)
            .map(|step| Forecast {
                steps_ahead: step,
                predicted_percent: fit.at(last + step as f64).clamp(0.0, 100.0),
                confidence,
            })
            .collect()
    }
}

/// Mean-centered autocorrelation for lags `0..n`, normalized by lag 0.
///
/// Returns an empty vector for a constant series.
pub fn autocorrelation(series: &[f64]) -> Vec<f64> {
    let n = series.len();
    let mean = stats::mean(series);
    let centered: Vec<f64> = series.iter().map(|v| v - mean).collect();
    let c0: f64 = centered.iter().map(|v| v * v).sum();
    if c0 <= f64::EPSILON {
        return Vec::new();
    }
    (0..n)
        .map(|lag| {
            centered[..n - lag]
                .iter()
                .zip(&centered[lag..])
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / c0
        })
        .collect()
}

fn tail(series: &[f64], n: usize) -> &[f64] {
    &series[series.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sinusoid(period: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|t| 50.0 + 10.0 * (2.0 * std::f64::consts::PI * t as f64 / period).sin())
            .collect()
    }

    #[test]
    fn no_trend_below_minimum() {
        let a = TrendAnalyzer::default();
        assert!(a.trend(&[1.0, 10.0, 20.0, 30.0]).is_none());
    }

    #[test]
    fn increasing_trend_severity() {
        let a = TrendAnalyzer::default();
        let steep: Vec<f64> = (0..10).map(|i| i as f64 * 6.0).collect();
        let p = a.trend(&steep).unwrap();
        assert_eq!(p.severity, Severity::High);
        assert_eq!(p.type_name(), "increasing_trend");

        let gentle: Vec<f64> = (0..10).map(|i| i as f64 * 2.0).collect();
        assert_eq!(a.trend(&gentle).unwrap().severity, Severity::Medium);

        let flat: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        assert!(a.trend(&flat).is_none());
    }

    #[test]
    fn decreasing_trend_severity() {
        let a = TrendAnalyzer::default();
        let steep: Vec<f64> = (0..10).map(|i| 100.0 - i as f64 * 8.0).collect();
        let p = a.trend(&steep).unwrap();
        match p.kind {
            PatternKind::DecreasingTrend { slope } => assert!((slope + 8.0).abs() < 1e-9),
            other => panic!("unexpected pattern: {:?}", other),
        }
        assert_eq!(p.severity, Severity::High);

        let gentle: Vec<f64> = (0..10).map(|i| 100.0 - i as f64 * 2.0).collect();
        assert_eq!(a.trend(&gentle).unwrap().severity, Severity::Low);
    }

    #[test]
    fn trend_uses_only_recent_window() {
        let a = TrendAnalyzer::default();
        let mut series: Vec<f64> = (0..30).map(|i| i as f64 * 10.0).collect();
        series.extend(std::iter::repeat(300.0).take(10));
        assert!(a.trend(&series).is_none());
    }

    #[test]
    fn periodic_sinusoid() {
        let a = TrendAnalyzer::default();
        let p = a.periodicity(&sinusoid(5.0, 20)).unwrap();
        match p.kind {
            PatternKind::Periodic { period, strength } => {
                assert_eq!(period, 5);
                assert!(strength > 0.5);
            }
            other => panic!("unexpected pattern: {other:?}"),
        }
        assert_eq!(p.severity, Severity::Low);
    }

    #[test]
    fn periodicity_needs_full_window() {
        let a = TrendAnalyzer::default();
        assert!(a.periodicity(&sinusoid(5.0, 19)).is_none());
    }

    #[test]
    fn constant_series_has_no_period() {
        let a = TrendAnalyzer::default();
        assert!(a.periodicity(&[42.0; 20]).is_none());
        assert!(autocorrelation(&[42.0; 20]).is_empty());
    }

    #[test]
    fn monotone_series_has_no_period() {
        let a = TrendAnalyzer::default();
        let ramp: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert!(a.periodicity(&ramp).is_none());
    }

    #[test]
    fn autocorrelation_lag_zero_is_one() {
        let acf = autocorrelation(&sinusoid(4.0, 16));
        assert_eq!(acf.len(), 16);
        assert!((acf[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn variability_flags_noisy_feature() {
        let a = TrendAnalyzer::default();
        let history: Vec<FeatureVector> = (0..12)
            .map(|i| {
                let spiky = if i % 2 == 0 { 0.0 } else { 40.0 };
                FeatureVector(vec![spiky, 0.5, 1.0, 0.0, 0.1, 0.0, 0.0, 0.0])
            })
            .collect();
        let p = a.variability(&history).unwrap();
        match &p.kind {
            PatternKind::HighVariability { features, ratio } => {
                assert_eq!(features, &vec!["utilization_percent".to_string()]);
                // mean 20, std 20
                assert!((ratio - 1.0).abs() < 1e-9);
            }
            other => panic!("unexpected pattern: {other:?}"),
        }
        assert_eq!(p.severity, Severity::Low);
    }

    #[test]
    fn variability_needs_enough_history() {
        let a = TrendAnalyzer::default();
        let history: Vec<FeatureVector> = (0..5)
            .map(|i| FeatureVector(vec![i as f64 * 100.0; 8]))
            .collect();
        assert!(a.variability(&history).is_none());
    }

    #[test]
    fn forecast_extrapolates_and_clamps() {
        let a = TrendAnalyzer::default();
        let f = a.forecast(&[80.0, 82.0, 84.0, 86.0, 88.0]);
        assert_eq!(f.len(), 3);
        assert!((f[0].predicted_percent - 90.0).abs() < 1e-9);
        assert!((f[2].predicted_percent - 94.0).abs() < 1e-9);
        assert_eq!(f[0].confidence, ForecastConfidence::Medium);

        let steep = a.forecast(&[70.0, 80.0, 90.0]);
        assert!(steep.iter().all(|p| p.predicted_percent <= 100.0));
        assert_eq!(steep[0].confidence, ForecastConfidence::Low);

        assert!(a.forecast(&[1.0, 2.0]).is_empty());
    }

    #[test]
    fn pattern_serializes_with_type_tag() {
        let p = Pattern {
            kind: PatternKind::Periodic {
                period: 5,
                strength: 0.75,
            },
            severity: Severity::Low,
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "periodic");
        assert_eq!(json["period"], 5);
        assert_eq!(json["severity"], "LOW");
    }
}
