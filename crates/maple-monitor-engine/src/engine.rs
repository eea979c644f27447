//! The pattern engine: one entry point per appended sample.
//!
//! `ingest` validates and appends the sample, then runs every analyzer on
//! the entity's state while holding that entity's lock, so each returned
//! `Analysis` reflects exactly the history up to its own append.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::anomaly::{AnomalyDetector, AnomalyModel, AnomalyResult, AnomalyStatus};
use crate::config::EngineConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::features::{FeatureContext, FeatureVector};
use crate::fingerprint::{Fingerprint, FingerprintGenerator};
use crate::history::{EntityState, HistoryStore};
use crate::insight::{Insight, InsightGenerator};
use crate::leak::{LeakDetector, LeakReport, LeakSeverity};
use crate::sample::{EntityId, Sample};
use crate::trend::{Forecast, TrendAnalyzer};

// ── Outputs ─────────────────────────────────────────────────────────────

/// Everything derived from one appended sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub entity: EntityId,
    pub timestamp: DateTime<Utc>,
    /// Window length after the append.
    pub window_len: usize,
    pub anomaly: AnomalyResult,
    pub leak: Option<LeakReport>,
    pub forecasts: Vec<Forecast>,
    /// Whether this append recomputed the fingerprint.
    pub fingerprint_updated: bool,
    pub insights: Vec<Insight>,
}

impl Analysis {
    pub fn has_insights(&self) -> bool {
        !self.insights.is_empty()
    }
}

/// Current state of one entity, for reporting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub entity: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub window_len: usize,
    pub appends: u64,
    pub last_seen: DateTime<Utc>,
    /// Utilization feature of the latest sample.
    pub current_percent: f64,
    pub status: Option<AnomalyStatus>,
    pub score: f64,
    pub fingerprint_hash: Option<String>,
    pub leak: Option<LeakSeverity>,
}

impl EntitySummary {
    fn from_state(state: &EntityState) -> Self {
        let last = state.last_result.as_ref();
        Self {
            entity: state.entity.clone(),
            name: state.name.clone(),
            window_len: state.len(),
            appends: state.appends,
            last_seen: state.last_seen,
            current_percent: state
                .features
                .latest()
                .map(FeatureVector::utilization)
                .unwrap_or(0.0),
            status: last.map(|r| r.status),
            score: last.map(|r| r.score).unwrap_or(0.0),
            fingerprint_hash: state.fingerprint.as_ref().map(|f| f.hash.clone()),
            leak: state.last_leak.as_ref().map(|l| l.severity),
        }
    }

    /// Sort rank: anomalous entities first, then by score.
    fn rank(&self) -> (u8, f64) {
        let tier = match self.status {
            Some(AnomalyStatus::HighAnomaly) => 3,
            Some(AnomalyStatus::MediumAnomaly) => 2,
            Some(AnomalyStatus::LowAnomaly) => 1,
            _ => 0,
        };
        (tier, self.score)
    }
}

/// Engine-wide report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineReport {
    pub generated_at: DateTime<Utc>,
    pub entity_count: usize,
    pub anomalous_entities: usize,
    pub learning_entities: usize,
    /// All current leaks, fastest growth first.
    pub leaks: Vec<LeakReport>,
    /// Highest-ranked entities.
    pub top_entities: Vec<EntitySummary>,
}

// ── Engine ──────────────────────────────────────────────────────────────

/// Per-entity time-series pattern and anomaly engine.
///
/// `Send + Sync`; share it behind an `Arc`. Appends to different entities
/// never contend.
#[derive(Debug)]
pub struct PatternEngine {
    config: EngineConfig,
    store: HistoryStore,
    trend: TrendAnalyzer,
    fingerprints: FingerprintGenerator,
    detector: AnomalyDetector,
    leaks: LeakDetector,
    insights: InsightGenerator,
}

impl PatternEngine {
    /// Statistical-only engine.
    pub fn new(config: EngineConfig) -> MonitorResult<Self> {
        config.validate()?;
        let detector = AnomalyDetector::new(&config);
        Ok(Self::build(config, detector))
    }

    /// Engine with a model backend for the anomaly detector.
    pub fn with_model(config: EngineConfig, model: Arc<dyn AnomalyModel>) -> MonitorResult<Self> {
        config.validate()?;
        let detector = AnomalyDetector::with_model(&config, model);
        Ok(Self::build(config, detector))
    }

    /// Statistical-only engine with the default configuration.
    pub fn with_defaults() -> Self {
        let config = EngineConfig::default();
        let detector = AnomalyDetector::new(&config);
        Self::build(config, detector)
    }

    fn build(config: EngineConfig, detector: AnomalyDetector) -> Self {
        Self {
            store: HistoryStore::new(config.history_capacity),
            trend: TrendAnalyzer::new(&config),
            fingerprints: FingerprintGenerator::new(config.min_samples_fingerprint),
            leaks: LeakDetector::new(&config),
            insights: InsightGenerator::new(&config),
            detector,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Append a sample and analyze its entity.
    ///
    /// The only caller-visible error is an invalid sample, in which case
    /// nothing is stored.
    pub fn ingest(&self, sample: Sample, context: &FeatureContext) -> MonitorResult<Analysis> {
        self.store
            .append_with(sample, context, |state| self.analyze(state))
    }

    fn analyze(&self, state: &mut EntityState) -> Analysis {
        let features = state.features.to_vec();
        let Some((current, history)) = features.split_last() else {
            return Analysis {
                entity: state.entity.clone(),
                timestamp: state.last_seen,
                window_len: 0,
                anomaly: AnomalyResult::learning(),
                leak: None,
                forecasts: Vec::new(),
                fingerprint_updated: false,
                insights: Vec::new(),
            };
        };
        let series: Vec<f64> = features.iter().map(FeatureVector::utilization).collect();

        let mut anomaly = self.detector.detect(history, current);
        let scored = !anomaly.is_learning();

        let fingerprint_updated = self.config.fingerprint_recompute_interval > 0
            && state.appends % self.config.fingerprint_recompute_interval as u64 == 0
            && self.refresh_fingerprint(state).is_some();

        let samples = state.samples.to_vec();
        let mut forecasts = Vec::new();
        if scored {
            anomaly.patterns = self.trend.analyze(&series);
            anomaly.patterns.extend(self.trend.variability(history));
            if let Some(fp) = &state.fingerprint {
                anomaly.findings = fp.check_recent(&samples);
            }
            forecasts = self.trend.forecast(&series);
        }

        let sizes: Vec<f64> = samples.iter().map(|s| s.metrics.resident_bytes).collect();
        let leak = self.leaks.detect(&state.entity, &sizes);
        let insights = self.insights.generate(&anomaly, leak.as_ref(), &forecasts);

        trace!(
            entity = %state.entity,
            status = %anomaly.status,
            score = anomaly.score,
            patterns = anomaly.patterns.len(),
            insights = insights.len(),
            "sample analyzed"
        );

        state.last_result = Some(anomaly.clone());
        state.last_leak = leak.clone();

        Analysis {
            entity: state.entity.clone(),
            timestamp: state.last_seen,
            window_len: state.len(),
            anomaly,
            leak,
            forecasts,
            fingerprint_updated,
            insights,
        }
    }

    fn refresh_fingerprint(&self, state: &mut EntityState) -> Option<Fingerprint> {
        let samples = state.samples.to_vec();
        let fingerprint = self.fingerprints.generate(&state.entity, &samples)?;
        debug!(
            entity = %state.entity,
            hash = %fingerprint.hash,
            samples = fingerprint.sample_count,
            "fingerprint recomputed"
        );
        state.fingerprint = Some(fingerprint.clone());
        Some(fingerprint)
    }

    /// Force a fingerprint recomputation outside the append schedule.
    pub fn recompute_fingerprint(&self, entity: &EntityId) -> MonitorResult<Option<Fingerprint>> {
        self.store
            .with_entity_mut(entity, |state| self.refresh_fingerprint(state))
            .ok_or_else(|| MonitorError::UnknownEntity(entity.to_string()))
    }

    // ── Read accessors ──────────────────────────────────────────────

    pub fn window(&self, entity: &EntityId) -> Vec<Sample> {
        self.store.window(entity)
    }

    pub fn features(&self, entity: &EntityId) -> Vec<FeatureVector> {
        self.store.features(entity)
    }

    pub fn fingerprint(&self, entity: &EntityId) -> Option<Fingerprint> {
        self.store
            .with_entity(entity, |s| s.fingerprint.clone())
            .flatten()
    }

    pub fn last_result(&self, entity: &EntityId) -> Option<AnomalyResult> {
        self.store
            .with_entity(entity, |s| s.last_result.clone())
            .flatten()
    }

    pub fn leak_report(&self, entity: &EntityId) -> Option<LeakReport> {
        self.store
            .with_entity(entity, |s| s.last_leak.clone())
            .flatten()
    }

    /// Current leaks across all entities, fastest growth first.
    pub fn leak_reports(&self) -> Vec<LeakReport> {
        let mut reports: Vec<LeakReport> = self
            .store
            .entities()
            .iter()
            .filter_map(|id| self.leak_report(id))
            .collect();
        reports.sort_by(|a, b| b.growth_rate.total_cmp(&a.growth_rate));
        reports
    }

    pub fn summary(&self, entity: &EntityId) -> Option<EntitySummary> {
        self.store.with_entity(entity, EntitySummary::from_state)
    }

    /// Engine-wide report with the `top_n` highest-ranked entities.
    pub fn report(&self, top_n: usize) -> EngineReport {
        let mut summaries: Vec<EntitySummary> = self
            .store
            .entities()
            .iter()
            .filter_map(|id| self.summary(id))
            .collect();

        let anomalous_entities = summaries
            .iter()
            .filter(|s| s.status.is_some_and(|st| st.is_anomalous()))
            .count();
        let learning_entities = summaries
            .iter()
            .filter(|s| s.status == Some(AnomalyStatus::Learning))
            .count();
        let entity_count = summaries.len();

        summaries.sort_by(|a, b| {
            let (ta, sa) = a.rank();
            let (tb, sb) = b.rank();
            tb.cmp(&ta)
                .then(sb.total_cmp(&sa))
                .then_with(|| a.entity.cmp(&b.entity))
        });
        summaries.truncate(top_n);

        EngineReport {
            generated_at: Utc::now(),
            entity_count,
            anomalous_entities,
            learning_entities,
            leaks: self.leak_reports(),
            top_entities: summaries,
        }
    }

    /// Known entities, sorted.
    pub fn entities(&self) -> Vec<EntityId> {
        self.store.entities()
    }

    pub fn entity_count(&self) -> usize {
        self.store.len()
    }

    /// Drop an entity and its state.
    pub fn remove(&self, entity: &EntityId) -> bool {
        self.store.remove(entity)
    }

    /// Evict least recently appended entities down to `max_entities`.
    pub fn evict_least_recent(&self, max_entities: usize) -> Vec<EntityId> {
        self.store.evict_least_recent(max_entities)
    }

    /// Apply the configured `max_entities` cap, if any.
    pub fn enforce_entity_cap(&self) -> Vec<EntityId> {
        match self.config.max_entities {
            Some(max) => self.evict_least_recent(max),
            None => Vec::new(),
        }
    }
}
