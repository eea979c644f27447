//! Behavioral fingerprints.
//!
//! A fingerprint is a rounded statistical summary of an entity's sample
//! window plus a blake3 hash of that summary. Two windows whose rounded
//! statistics are identical always hash identically.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sample::{EntityId, Sample};
use crate::stats;
use crate::trend::Severity;

/// Decimals kept in every fingerprint statistic.
pub const FINGERPRINT_PRECISION: i32 = 6;

/// Samples inspected by `Fingerprint::check_recent`.
const RECENT_WINDOW: usize = 10;

/// Minimum recent samples for a behavior check.
const MIN_RECENT: usize = 5;

/// Thread-count std above which the thread pattern is considered unstable.
const THREAD_INSTABILITY: f64 = 5.0;

/// Hash domain separator.
const HASH_DOMAIN: &[u8] = b"maple-monitor-fingerprint-v1:";

// ── Statistics ──────────────────────────────────────────────────────────

/// Rounded statistics summarizing a sample window.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FingerprintStats {
    pub mean_resident: f64,
    pub std_resident: f64,
    pub mean_virtual: f64,
    pub std_virtual: f64,
    pub shared_ratio: f64,
    pub data_ratio: f64,
    pub stack_ratio: f64,
    pub memory_variability: f64,
    pub cpu_correlation: f64,
    pub thread_stability: f64,
    pub mapped_regions_mean: f64,
    /// Resident-size slope divided by its mean.
    pub growth_rate: f64,
    pub complexity: f64,
}

impl FingerprintStats {
    /// Named values, sorted by name.
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("complexity", self.complexity),
            ("cpu_correlation", self.cpu_correlation),
            ("data_ratio", self.data_ratio),
            ("growth_rate", self.growth_rate),
            ("mapped_regions_mean", self.mapped_regions_mean),
            ("mean_resident", self.mean_resident),
            ("mean_virtual", self.mean_virtual),
            ("memory_variability", self.memory_variability),
            ("shared_ratio", self.shared_ratio),
            ("stack_ratio", self.stack_ratio),
            ("std_resident", self.std_resident),
            ("std_virtual", self.std_virtual),
            ("thread_stability", self.thread_stability),
        ])
    }

    fn rounded(mut self) -> Self {
        for v in [
            &mut self.mean_resident,
            &mut self.std_resident,
            &mut self.mean_virtual,
            &mut self.std_virtual,
            &mut self.shared_ratio,
            &mut self.data_ratio,
            &mut self.stack_ratio,
            &mut self.memory_variability,
            &mut self.cpu_correlation,
            &mut self.thread_stability,
            &mut self.mapped_regions_mean,
            &mut self.growth_rate,
            &mut self.complexity,
        ] {
            *v = stats::round_to(*v, FINGERPRINT_PRECISION);
        }
        self
    }

    /// Content hash over the canonical (sorted-key, fixed-precision) payload.
    pub fn content_hash(&self) -> String {
        let payload: serde_json::Map<String, serde_json::Value> = self
            .to_map()
            .into_iter()
            .map(|(k, v)| {
                let v = stats::round_to(v, FINGERPRINT_PRECISION);
                (k.to_string(), serde_json::Value::String(format!("{:.6}", v)))
            })
            .collect();
        let canonical = serde_json::Value::Object(payload).to_string();

        let mut hasher = blake3::Hasher::new();
        hasher.update(HASH_DOMAIN);
        hasher.update(canonical.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

// ── Fingerprint ─────────────────────────────────────────────────────────

/// Stable summary of an entity's long-run behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub entity: EntityId,
    pub stats: FingerprintStats,
    /// 64 hex characters.
    pub hash: String,
    /// Samples that contributed (non-zero resident size).
    pub sample_count: usize,
    pub computed_at: DateTime<Utc>,
}

/// A deviation from the established fingerprint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BehaviorFinding {
    UnusualMemoryUsage {
        current_avg: f64,
        expected_avg: f64,
        deviation_percent: f64,
    },
    ThreadInstability {
        variation: f64,
    },
}

impl BehaviorFinding {
    pub fn severity(&self) -> Severity {
        match self {
            Self::UnusualMemoryUsage { .. } => Severity::Medium,
            Self::ThreadInstability { .. } => Severity::Low,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::UnusualMemoryUsage { .. } => "unusual_memory_usage",
            Self::ThreadInstability { .. } => "thread_instability",
        }
    }
}

impl Fingerprint {
    /// Mean relative difference over all statistics.
    ///
    /// 0 for identical fingerprints; grows with the size of any difference.
    pub fn distance(&self, other: &Fingerprint) -> f64 {
        let a = self.stats.to_map();
        let b = other.stats.to_map();
        let diffs: Vec<f64> = a
            .iter()
            .zip(b.values())
            .map(|((_, x), y)| {
                let scale = x.abs().max(y.abs()).max(1e-9);
                (x - y).abs() / scale
            })
            .collect();
        stats::mean(&diffs)
    }

    /// Whether behavior has moved further than `tolerance` from `baseline`.
    pub fn has_drifted(&self, baseline: &Fingerprint, tolerance: f64) -> bool {
        self.hash != baseline.hash && self.distance(baseline) > tolerance
    }

    /// Compare the most recent samples against this fingerprint.
    pub fn check_recent(&self, samples: &[Sample]) -> Vec<BehaviorFinding> {
        let recent = &samples[samples.len().saturating_sub(RECENT_WINDOW)..];
        if recent.len() < MIN_RECENT {
            return Vec::new();
        }

        let mut findings = Vec::new();

        let resident: Vec<f64> = recent.iter().map(|s| s.metrics.resident_bytes).collect();
        let current_avg = stats::mean(&resident);
        let expected_avg = self.stats.mean_resident;
        let deviation = (current_avg - expected_avg).abs();
        if deviation > 2.0 * self.stats.std_resident {
            let deviation_percent = if expected_avg > 0.0 {
                deviation / expected_avg * 100.0
            } else {
                0.0
            };
            findings.push(BehaviorFinding::UnusualMemoryUsage {
                current_avg,
                expected_avg,
                deviation_percent,
            });
        }

        if self.stats.thread_stability > THREAD_INSTABILITY {
            findings.push(BehaviorFinding::ThreadInstability {
                variation: self.stats.thread_stability,
            });
        }

        findings
    }
}

// ── Generator ───────────────────────────────────────────────────────────

/// Computes fingerprints from sample windows.
#[derive(Clone, Debug)]
pub struct FingerprintGenerator {
    min_samples: usize,
}

impl FingerprintGenerator {
    pub fn new(min_samples: usize) -> Self {
        Self {
            min_samples: min_samples.max(1),
        }
    }

    /// Summarize a window. Samples with zero resident size are ignored;
    /// `None` when fewer than `min_samples` remain.
    pub fn generate(&self, entity: &EntityId, samples: &[Sample]) -> Option<Fingerprint> {
        let usable: Vec<&Sample> = samples
            .iter()
            .filter(|s| s.metrics.resident_bytes > 0.0)
            .collect();
        if usable.len() < self.min_samples {
            return None;
        }

        let stats = compute_stats(&usable).rounded();
        let hash = stats.content_hash();
        Some(Fingerprint {
            entity: entity.clone(),
            stats,
            hash,
            sample_count: usable.len(),
            computed_at: Utc::now(),
        })
    }
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new(crate::config::EngineConfig::default().min_samples_fingerprint)
    }
}

fn compute_stats(samples: &[&Sample]) -> FingerprintStats {
    let column = |f: fn(&Sample) -> f64| -> Vec<f64> { samples.iter().map(|s| f(s)).collect() };

    let resident = column(|s| s.metrics.resident_bytes);
    let virtual_ = column(|s| s.metrics.virtual_bytes);
    let shared = column(|s| s.metrics.shared_bytes / s.metrics.resident_bytes);
    let data = column(|s| s.metrics.data_bytes / s.metrics.resident_bytes);
    let stack = column(|s| s.metrics.stack_bytes / s.metrics.resident_bytes);
    let percent = column(|s| s.metrics.memory_percent);
    let cpu = column(|s| s.metrics.cpu_percent);
    let threads = column(|s| s.metrics.threads);
    let maps = column(|s| s.metrics.mapped_regions);

    let tracked = [
        &resident, &virtual_, &shared, &data, &stack, &percent, &cpu, &threads, &maps,
    ];
    let complexity = stats::mean(
        &tracked
            .iter()
            .map(|col| normalized_spread(col))
            .collect::<Vec<_>>(),
    );

    FingerprintStats {
        mean_resident: stats::mean(&resident),
        std_resident: stats::std_dev(&resident),
        mean_virtual: stats::mean(&virtual_),
        std_virtual: stats::std_dev(&virtual_),
        shared_ratio: stats::mean(&shared),
        data_ratio: stats::mean(&data),
        stack_ratio: stats::mean(&stack),
        memory_variability: stats::std_dev(&percent),
        cpu_correlation: stats::pearson(&resident, &cpu),
        thread_stability: stats::std_dev(&threads),
        mapped_regions_mean: stats::mean(&maps),
        growth_rate: stats::growth_rate(&resident),
        complexity,
    }
}

/// std(column / (max(column) + 1e-10)).
fn normalized_spread(column: &[f64]) -> f64 {
    let max = column.iter().copied().fold(f64::MIN, f64::max);
    let scale = max + 1e-10;
    let normalized: Vec<f64> = column.iter().map(|v| v / scale).collect();
    stats::std_dev(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::ResourceMetrics;

    fn sample(resident: f64, threads: f64, cpu: f64) -> Sample {
        Sample::now(
            EntityId::Process(7),
            ResourceMetrics {
                resident_bytes: resident,
                virtual_bytes: resident * 4.0,
                shared_bytes: resident * 0.25,
                data_bytes: resident * 0.5,
                stack_bytes: resident * 0.01,
                memory_percent: resident / 1.0e7,
                cpu_percent: cpu,
                threads,
                mapped_regions: 120.0,
                ..ResourceMetrics::default()
            },
        )
    }

    fn steady(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| sample(1.0e8 + (i % 3) as f64 * 1.0e6, 8.0, 5.0 + (i % 2) as f64))
            .collect()
    }

    #[test]
    fn needs_minimum_samples() {
        let g = FingerprintGenerator::new(5);
        assert!(g.generate(&EntityId::Process(7), &steady(4)).is_none());
        assert!(g.generate(&EntityId::Process(7), &steady(5)).is_some());
    }

    #[test]
    fn zero_resident_samples_are_skipped() {
        let g = FingerprintGenerator::new(5);
        let zeros: Vec<Sample> = (0..6).map(|_| sample(0.0, 1.0, 1.0)).collect();
        assert!(g.generate(&EntityId::Process(7), &zeros).is_none());

        let mut mixed = steady(5);
        mixed.push(sample(0.0, 1.0, 1.0));
        let fp = g.generate(&EntityId::Process(7), &mixed).unwrap();
        assert_eq!(fp.sample_count, 5);

        let mut sparse = steady(4);
        sparse.extend((0..2).map(|_| sample(0.0, 1.0, 1.0)));
        assert!(g.generate(&EntityId::Process(7), &sparse).is_none());
    }

    #[test]
    fn ratios_and_hash_shape() {
        let g = FingerprintGenerator::default();
        let fp = g.generate(&EntityId::Process(7), &steady(10)).unwrap();
        assert!((fp.stats.shared_ratio - 0.25).abs() < 1e-9);
        assert!((fp.stats.data_ratio - 0.5).abs() < 1e-9);
        assert!((fp.stats.stack_ratio - 0.01).abs() < 1e-9);
        assert!((fp.stats.mapped_regions_mean - 120.0).abs() < 1e-9);
        assert_eq!(fp.stats.thread_stability, 0.0);
        assert_eq!(fp.hash.len(), 64);
        assert!(fp.hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn identical_histories_hash_equal() {
        let g = FingerprintGenerator::default();
        let a = g.generate(&EntityId::Process(7), &steady(10)).unwrap();
        let b = g.generate(&EntityId::Process(8), &steady(10)).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.distance(&b), 0.0);
        assert!(!b.has_drifted(&a, 0.0));
    }

    #[test]
    fn different_histories_hash_differently() {
        let g = FingerprintGenerator::default();
        let a = g.generate(&EntityId::Process(7), &steady(10)).unwrap();
        let shifted: Vec<Sample> = (0..10).map(|_| sample(3.0e8, 30.0, 50.0)).collect();
        let b = g.generate(&EntityId::Process(7), &shifted).unwrap();
        assert_ne!(a.hash, b.hash);
        assert!(a.distance(&b) > 0.0);
        assert!(b.has_drifted(&a, 0.05));
    }

    #[test]
    fn distance_grows_with_difference() {
        let g = FingerprintGenerator::default();
        let base: Vec<Sample> = (0..10).map(|_| sample(1.0e8, 8.0, 5.0)).collect();
        let near: Vec<Sample> = (0..10).map(|_| sample(1.1e8, 8.0, 5.0)).collect();
        let far: Vec<Sample> = (0..10).map(|_| sample(2.0e8, 8.0, 5.0)).collect();
        let base = g.generate(&EntityId::System, &base).unwrap();
        let near = g.generate(&EntityId::System, &near).unwrap();
        let far = g.generate(&EntityId::System, &far).unwrap();
        assert!(base.distance(&near) < base.distance(&far));
    }

    #[test]
    fn negative_zero_is_normalized() {
        let stats = FingerprintStats {
            cpu_correlation: -0.0,
            ..FingerprintStats::default()
        };
        assert_eq!(stats.content_hash(), FingerprintStats::default().content_hash());
    }

    #[test]
    fn growth_rate_uses_slope_over_mean() {
        let g = FingerprintGenerator::default();
        let growing: Vec<Sample> = (0..10)
            .map(|i| sample(1.0e8 + i as f64 * 1.0e7, 8.0, 5.0))
            .collect();
        let fp = g.generate(&EntityId::System, &growing).unwrap();
        // slope 1e7, mean 1.45e8
        assert!((fp.stats.growth_rate - 1.0e7 / 1.45e8).abs() < 1e-6);
        assert!(fp.stats.complexity > 0.0);
    }

    #[test]
    fn check_recent_flags_unusual_usage() {
        let g = FingerprintGenerator::default();
        let fp = g.generate(&EntityId::Process(7), &steady(20)).unwrap();

        assert!(fp.check_recent(&steady(10)).is_empty());

        let spike: Vec<Sample> = (0..10).map(|_| sample(2.0e8, 8.0, 5.0)).collect();
        let findings = fp.check_recent(&spike);
        assert_eq!(findings.len(), 1);
        match &findings[0] {
            BehaviorFinding::UnusualMemoryUsage {
                deviation_percent, ..
            } => assert!(*deviation_percent > 90.0),
            other => panic!("unexpected finding: {other:?}"),
        }
        assert_eq!(findings[0].severity(), Severity::Medium);

        assert!(fp.check_recent(&spike[..4]).is_empty());
    }

    #[test]
    fn check_recent_flags_thread_instability() {
        let g = FingerprintGenerator::default();
        let jittery: Vec<Sample> = (0..10)
            .map(|i| sample(1.0e8, if i % 2 == 0 { 4.0 } else { 40.0 }, 5.0))
            .collect();
        let fp = g.generate(&EntityId::Process(7), &jittery).unwrap();
        let findings = fp.check_recent(&jittery);
        assert!(findings
            .iter()
            .any(|f| matches!(f, BehaviorFinding::ThreadInstability { .. })));
    }
}
