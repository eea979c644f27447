//! Human-readable insights ranked by category.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::anomaly::{AnomalyResult, AnomalyStatus};
use crate::config::EngineConfig;
use crate::fingerprint::BehaviorFinding;
use crate::leak::LeakReport;
use crate::trend::{Forecast, Pattern, PatternKind, Severity};

/// Forecast insights emitted per analysis at most.
const MAX_FORECAST_INSIGHTS: usize = 2;

/// Ordering category. Declaration order is output order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    HighAnomaly,
    MediumAnomaly,
    LowAnomaly,
    Trend,
    Periodicity,
    Leak,
    Behavior,
    Variability,
    Forecast,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub severity: Severity,
    pub message: String,
}

/// Maps detector outputs to ordered, de-duplicated messages.
#[derive(Clone, Debug)]
pub struct InsightGenerator {
    forecast_alert_percent: f64,
}

impl Default for InsightGenerator {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl InsightGenerator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            forecast_alert_percent: config.forecast_alert_percent,
        }
    }

    pub fn generate(
        &self,
        result: &AnomalyResult,
        leak: Option<&LeakReport>,
        forecasts: &[Forecast],
    ) -> Vec<Insight> {
        let mut insights = Vec::new();

        if let Some(insight) = status_insight(result) {
            insights.push(insight);
        }

        let mut seen = BTreeSet::new();
        for pattern in &result.patterns {
            if seen.insert(pattern.type_name()) {
                insights.push(pattern_insight(pattern));
            }
        }

        if let Some(leak) = leak {
            insights.push(Insight {
                kind: InsightKind::Leak,
                severity: leak.severity.into(),
                message: format!(
                    "Possible memory leak in {}: resident size growing {:.2}% per sample",
                    leak.entity,
                    leak.growth_rate * 100.0
                ),
            });
        }

        for finding in &result.findings {
            if seen.insert(finding.type_name()) {
                insights.push(finding_insight(finding));
            }
        }

        insights.extend(
            forecasts
                .iter()
                .filter(|f| f.predicted_percent > self.forecast_alert_percent)
                .take(MAX_FORECAST_INSIGHTS)
                .map(|f| Insight {
                    kind: InsightKind::Forecast,
                    severity: Severity::Medium,
                    message: format!(
                        "Memory usage predicted to reach {:.1}% in {} samples",
                        f.predicted_percent, f.steps_ahead
                    ),
                }),
        );

        insights.sort_by_key(|i| i.kind);
        insights
    }
}

fn status_insight(result: &AnomalyResult) -> Option<Insight> {
    let (kind, severity, message) = match result.status {
        AnomalyStatus::HighAnomaly => (
            InsightKind::HighAnomaly,
            Severity::High,
            "Critical memory anomaly detected, immediate attention required",
        ),
        AnomalyStatus::MediumAnomaly => (
            InsightKind::MediumAnomaly,
            Severity::Medium,
            "Memory usage showing unusual patterns",
        ),
        AnomalyStatus::LowAnomaly => (
            InsightKind::LowAnomaly,
            Severity::Low,
            "Minor memory irregularities observed",
        ),
        AnomalyStatus::Normal | AnomalyStatus::Learning => return None,
    };
    Some(Insight {
        kind,
        severity,
        message: format!("{} (score {:.2})", message, result.score),
    })
}

fn pattern_insight(pattern: &Pattern) -> Insight {
    let (kind, message) = match &pattern.kind {
        PatternKind::IncreasingTrend { slope } => (
            InsightKind::Trend,
            format!("Memory usage trending upward (slope {:.2})", slope),
        ),
        PatternKind::DecreasingTrend { slope } => (
            InsightKind::Trend,
            format!("Memory usage trending downward (slope {:.2})", slope),
        ),
        PatternKind::Periodic { period, strength } => (
            InsightKind::Periodicity,
            format!(
                "Periodic memory pattern detected (period {} samples, strength {:.2})",
                period, strength
            ),
        ),
        PatternKind::HighVariability { features, ratio } => (
            InsightKind::Variability,
            format!(
                "Memory metrics showing high variability: {} (ratio {:.2})",
                features.join(", "),
                ratio
            ),
        ),
    };
    Insight {
        kind,
        severity: pattern.severity,
        message,
    }
}

fn finding_insight(finding: &BehaviorFinding) -> Insight {
    let message = match finding {
        BehaviorFinding::UnusualMemoryUsage {
            current_avg,
            expected_avg,
            deviation_percent,
        } => format!(
            "Memory usage deviates {:.1}% from established pattern ({:.0} vs {:.0} bytes)",
            deviation_percent, current_avg, expected_avg
        ),
        BehaviorFinding::ThreadInstability { variation } => {
            format!("Unstable thread count pattern (std {:.2})", variation)
        }
    };
    Insight {
        kind: InsightKind::Behavior,
        severity: finding.severity(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::DetectionMethod;
    use crate::leak::LeakSeverity;
    use crate::sample::EntityId;
    use crate::trend::ForecastConfidence;

    fn result(status: AnomalyStatus, patterns: Vec<Pattern>) -> AnomalyResult {
        AnomalyResult {
            status,
            score: 3.4,
            method: DetectionMethod::Statistical,
            z: None,
            fallback_cause: None,
            patterns,
            findings: Vec::new(),
        }
    }

    fn trend(slope: f64) -> Pattern {
        Pattern {
            kind: PatternKind::IncreasingTrend { slope },
            severity: Severity::Medium,
        }
    }

    fn periodic() -> Pattern {
        Pattern {
            kind: PatternKind::Periodic {
                period: 5,
                strength: 0.75,
            },
            severity: Severity::Low,
        }
    }

    fn variability() -> Pattern {
        Pattern {
            kind: PatternKind::HighVariability {
                features: vec!["swap_percent".into()],
                ratio: 1.2,
            },
            severity: Severity::Medium,
        }
    }

    fn leak() -> LeakReport {
        LeakReport {
            entity: EntityId::Process(4),
            growth_rate: 0.062,
            severity: LeakSeverity::Medium,
            current_resident_bytes: 1551.0,
            samples: 10,
        }
    }

    #[test]
    fn nothing_noteworthy_is_empty() {
        let g = InsightGenerator::default();
        assert!(g
            .generate(&result(AnomalyStatus::Normal, vec![]), None, &[])
            .is_empty());
        assert!(g
            .generate(&AnomalyResult::learning(), None, &[])
            .is_empty());
    }

    #[test]
    fn ordered_by_category() {
        let g = InsightGenerator::default();
        let mut r = result(
            AnomalyStatus::HighAnomaly,
            vec![variability(), periodic(), trend(2.0)],
        );
        r.findings
            .push(BehaviorFinding::ThreadInstability { variation: 7.0 });
        let insights = g.generate(&r, Some(&leak()), &[]);
        let kinds: Vec<InsightKind> = insights.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                InsightKind::HighAnomaly,
                InsightKind::Trend,
                InsightKind::Periodicity,
                InsightKind::Leak,
                InsightKind::Behavior,
                InsightKind::Variability,
            ]
        );
        assert_eq!(insights[0].severity, Severity::High);
        assert!(insights[3].message.contains("6.20%"));
    }

    #[test]
    fn one_message_per_pattern_type() {
        let g = InsightGenerator::default();
        let r = result(AnomalyStatus::Normal, vec![trend(2.0), trend(3.0)]);
        let insights = g.generate(&r, None, &[]);
        assert_eq!(insights.len(), 1);
        assert!(insights[0].message.contains("2.00"));
    }

    #[test]
    fn forecast_only_above_alert_and_capped() {
        let g = InsightGenerator::default();
        let forecasts: Vec<Forecast> = [85.0, 92.0, 95.0, 99.0]
            .iter()
            .enumerate()
            .map(|(i, p)| Forecast {
                steps_ahead: i + 1,
                predicted_percent: *p,
                confidence: ForecastConfidence::Medium,
            })
            .collect();
        let insights = g.generate(&result(AnomalyStatus::Normal, vec![]), None, &forecasts);
        assert_eq!(insights.len(), 2);
        assert!(insights.iter().all(|i| i.kind == InsightKind::Forecast));
        assert!(insights[0].message.contains("92.0%"));
    }

    #[test]
    fn medium_and_low_status() {
        let g = InsightGenerator::default();
        let medium = g.generate(&result(AnomalyStatus::MediumAnomaly, vec![]), None, &[]);
        assert_eq!(medium[0].kind, InsightKind::MediumAnomaly);
        let low = g.generate(&result(AnomalyStatus::LowAnomaly, vec![]), None, &[]);
        assert_eq!(low[0].severity, Severity::Low);
    }
}
