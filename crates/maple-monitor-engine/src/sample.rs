//! Sample and entity types.
//!
//! A `Sample` is one observation of one entity. Raw metrics live in a
//! statically shaped `ResourceMetrics` block; collector-specific values go
//! into the `extra` map. Validation happens once, at the append boundary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};

// ── Entity Identification ───────────────────────────────────────────────

/// Identifies a monitored entity: the whole host or a single process.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityId {
    System,
    Process(u32),
}

impl EntityId {
    /// Process id, if this entity is a process.
    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::System => None,
            Self::Process(pid) => Some(*pid),
        }
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Process(pid) => write!(f, "pid:{}", pid),
        }
    }
}

// ── Raw Metrics ─────────────────────────────────────────────────────────

/// Named raw resource metrics. All values must be finite and non-negative.
///
/// `resident_bytes` and `memory_percent` are required on decode; unknown
/// keys are rejected, collector-specific values belong in `Sample::extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceMetrics {
    /// Resident set size in bytes (used memory for the system entity).
    pub resident_bytes: f64,
    /// Virtual size in bytes.
    #[serde(default)]
    pub virtual_bytes: f64,
    /// Shared memory in bytes.
    #[serde(default)]
    pub shared_bytes: f64,
    /// Data segment size in bytes.
    #[serde(default)]
    pub data_bytes: f64,
    /// Stack segment size in bytes.
    #[serde(default)]
    pub stack_bytes: f64,
    /// Memory utilization in percent of system total.
    pub memory_percent: f64,
    /// Swap utilization in percent.
    #[serde(default)]
    pub swap_percent: f64,
    /// CPU utilization in percent.
    #[serde(default)]
    pub cpu_percent: f64,
    /// Thread count.
    #[serde(default)]
    pub threads: f64,
    /// Number of mapped memory regions.
    #[serde(default)]
    pub mapped_regions: f64,
}

impl ResourceMetrics {
    /// Named view of every field, in declaration order.
    pub fn fields(&self) -> [(&'static str, f64); 10] {
        [
            ("resident_bytes", self.resident_bytes),
            ("virtual_bytes", self.virtual_bytes),
            ("shared_bytes", self.shared_bytes),
            ("data_bytes", self.data_bytes),
            ("stack_bytes", self.stack_bytes),
            ("memory_percent", self.memory_percent),
            ("swap_percent", self.swap_percent),
            ("cpu_percent", self.cpu_percent),
            ("threads", self.threads),
            ("mapped_regions", self.mapped_regions),
        ]
    }
}

// ── Sample ──────────────────────────────────────────────────────────────

/// One observation of one entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub entity: EntityId,
    pub timestamp: DateTime<Utc>,
    /// Human-readable name (process name, host name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub metrics: ResourceMetrics,
    /// Collector-specific extras.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

impl Sample {
    /// Create a sample stamped with the current time.
    pub fn now(entity: EntityId, metrics: ResourceMetrics) -> Self {
        Self::at(entity, Utc::now(), metrics)
    }

    /// Create a sample with an explicit timestamp.
    pub fn at(entity: EntityId, timestamp: DateTime<Utc>, metrics: ResourceMetrics) -> Self {
        Self {
            entity,
            timestamp,
            name: None,
            metrics,
            extra: BTreeMap::new(),
        }
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a collector-specific value.
    pub fn with_extra(mut self, key: impl Into<String>, value: f64) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Reject negative, NaN or infinite values.
    pub fn validate(&self) -> MonitorResult<()> {
        let named = self
            .metrics
            .fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v));
        let extras = self.extra.iter().map(|(k, v)| (format!("extra.{}", k), *v));

        for (field, value) in named.chain(extras) {
            let reason = if value.is_nan() {
                "not a number"
            } else if value.is_infinite() {
                "infinite"
            } else if value < 0.0 {
                "negative"
            } else {
                continue;
            };
            return Err(MonitorError::InvalidSample {
                entity: self.entity.to_string(),
                field,
                value,
                reason,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> ResourceMetrics {
        ResourceMetrics {
            resident_bytes: 1024.0,
            memory_percent: 12.5,
            threads: 4.0,
            ..ResourceMetrics::default()
        }
    }

    #[test]
    fn entity_display() {
        assert_eq!(EntityId::System.to_string(), "system");
        assert_eq!(EntityId::Process(42).to_string(), "pid:42");
        assert_eq!(EntityId::Process(42).pid(), Some(42));
        assert_eq!(EntityId::System.pid(), None);
    }

    #[test]
    fn valid_sample_passes() {
        let s = Sample::now(EntityId::Process(1), metrics()).with_extra("io_wait", 0.5);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn negative_metric_rejected() {
        let mut m = metrics();
        m.cpu_percent = -3.0;
        let err = Sample::now(EntityId::System, m).validate().unwrap_err();
        match err {
            MonitorError::InvalidSample { field, reason, .. } => {
                assert_eq!(field, "cpu_percent");
                assert_eq!(reason, "negative");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nan_and_extra_rejected() {
        let mut m = metrics();
        m.swap_percent = f64::NAN;
        assert!(Sample::now(EntityId::System, m).validate().is_err());

        let s = Sample::now(EntityId::System, metrics()).with_extra("gpu", -1.0);
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("extra.gpu"));
    }

    #[test]
    fn sample_serialization() {
        let s = Sample::now(EntityId::Process(7), metrics()).with_name("postgres");
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"process\":7"));
        let restored: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, s);
    }

    #[test]
    fn optional_metric_fields_default_to_zero() {
        let json = r#"{"entity":"system","timestamp":"2024-01-01T00:00:00Z","metrics":{"resident_bytes":1024.0,"memory_percent":40.0}}"#;
        let s: Sample = serde_json::from_str(json).unwrap();
        assert_eq!(s.metrics.memory_percent, 40.0);
        assert_eq!(s.metrics.threads, 0.0);
        assert!(s.extra.is_empty());
    }

    #[test]
    fn misspelled_metric_key_rejected() {
        let json = r#"{"entity":"system","timestamp":"2024-01-01T00:00:00Z","metrics":{"resident_bytes":1024.0,"memory_percent":40.0,"memory_pct":95.0}}"#;
        let err = serde_json::from_str::<Sample>(json).unwrap_err();
        assert!(err.to_string().contains("memory_pct"));
    }

    #[test]
    fn required_metric_missing_rejected() {
        let json = r#"{"entity":"system","timestamp":"2024-01-01T00:00:00Z","metrics":{"memory_pct":95.0,"resident_bytes":1024.0}}"#;
        assert!(serde_json::from_str::<Sample>(json).is_err());

        let json = r#"{"entity":"system","timestamp":"2024-01-01T00:00:00Z","metrics":{"memory_percent":95.0}}"#;
        let err = serde_json::from_str::<Sample>(json).unwrap_err();
        assert!(err.to_string().contains("resident_bytes"));
    }
}
