//! Feature extraction: raw sample → fixed-length normalized vector.
//!
//! This runs on every append, so it is a total function: every ratio with a
//! zero denominator is defined as 0.

use serde::{Deserialize, Serialize};

use crate::sample::Sample;
use crate::stats;

/// Number of features in a `FeatureVector`.
pub const FEATURE_COUNT: usize = 8;

/// Feature names, in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "utilization_percent",
    "available_fraction",
    "swap_percent",
    "constituent_count",
    "aggregate_ratio",
    "max_constituent_percent",
    "constituent_spread",
    "fragmentation",
];

/// Index of the primary utilization feature tracked by the trend analyzer.
pub const UTILIZATION: usize = 0;

/// Aggregate view over an entity's constituents (the processes of a host).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstituentSummary {
    pub count: usize,
    pub total_resident_bytes: f64,
    pub max_percent: f64,
    pub percent_std: f64,
}

impl ConstituentSummary {
    /// Summarize constituents from `(resident_bytes, memory_percent)` pairs.
    pub fn from_usage<I>(usage: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut total = 0.0;
        let mut percents = Vec::new();
        for (resident, percent) in usage {
            total += resident;
            percents.push(percent);
        }
        Self {
            count: percents.len(),
            total_resident_bytes: total,
            max_percent: percents.iter().copied().fold(0.0, f64::max),
            percent_std: stats::std_dev(&percents),
        }
    }

    /// Summarize constituents from their samples.
    pub fn from_samples<'a, I>(samples: I) -> Self
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        Self::from_usage(
            samples
                .into_iter()
                .map(|s| (s.metrics.resident_bytes, s.metrics.memory_percent)),
        )
    }
}

/// System-wide totals needed for ratio features.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureContext {
    pub total_memory_bytes: f64,
    pub available_memory_bytes: f64,
    pub used_memory_bytes: f64,
    pub constituents: ConstituentSummary,
}

/// Fixed-length normalized feature vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub Vec<f64>);

impl FeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of one feature (0 when out of range).
    pub fn get(&self, index: usize) -> f64 {
        self.0.get(index).copied().unwrap_or(0.0)
    }

    /// Primary utilization feature.
    pub fn utilization(&self) -> f64 {
        self.get(UTILIZATION)
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Stateless feature extractor.
#[derive(Clone, Copy, Debug, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Derive the feature vector for a sample.
    ///
    /// Same sample + same context always yields the same vector.
    pub fn extract(sample: &Sample, context: &FeatureContext) -> FeatureVector {
        let m = &sample.metrics;
        let total = context.total_memory_bytes;
        let constituents = &context.constituents;

        let aggregate = if constituents.count > 0 {
            constituents.total_resident_bytes
        } else {
            m.resident_bytes
        };

        let features = vec![
            m.memory_percent,
            ratio(context.available_memory_bytes, total),
            m.swap_percent,
            constituents.count as f64,
            ratio(aggregate, total),
            constituents.max_percent,
            constituents.percent_std,
            fragmentation(context),
        ];

        FeatureVector(features.into_iter().map(finite_or_zero).collect())
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// `1 - available / (total - used)`, clamped to [0, 1].
fn fragmentation(context: &FeatureContext) -> f64 {
    let free = context.total_memory_bytes - context.used_memory_bytes;
    if context.total_memory_bytes <= 0.0 || free <= 0.0 {
        return 0.0;
    }
    (1.0 - context.available_memory_bytes / free).clamp(0.0, 1.0)
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
