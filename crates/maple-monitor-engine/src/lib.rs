//! # maple-monitor-engine
//!
//! Time-series pattern and anomaly engine for host resource monitoring.
//!
//! The engine turns a stream of raw CPU/memory samples into bounded
//! per-entity history, normalized feature vectors, anomaly classifications,
//! trend and periodicity patterns, behavioral fingerprints, leak reports and
//! ranked insights. It performs no I/O: samples come in, structured results
//! go out.
//!
//! ## Architecture
//!
//! ```text
//!   Sample + FeatureContext
//!       │ validate (InvalidSample → rejected, nothing stored)
//!       ▼
//!   ┌──────────────────────────────┐
//!   │  HistoryStore                │  ← DashMap<EntityId, Mutex<EntityState>>
//!   │  ┌────────────┐ ┌─────────┐  │
//!   │  │ samples    │ │features │  │  ← bounded FIFO windows
//!   │  └────────────┘ └─────────┘  │
//!   └──────────────┬───────────────┘
//!                  │ under the entity lock
//!       ┌──────────┼──────────────┬──────────────┬──────────────┐
//!       ▼          ▼              ▼              ▼              ▼
//!   Anomaly     Trend /        Fingerprint     Leak         Forecast
//!   Detector    Periodicity    (every Kth)     Detector
//!       │          │              │              │              │
//!       └──────────┴──────┬───────┴──────────────┴──────────────┘
//!                         ▼
//!                  InsightGenerator ──► Analysis
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use maple_monitor_engine::{
//!     EntityId, FeatureContext, PatternEngine, ResourceMetrics, Sample,
//! };
//!
//! let engine = PatternEngine::with_defaults();
//! let sample = Sample::now(
//!     EntityId::System,
//!     ResourceMetrics {
//!         resident_bytes: 4.0e9,
//!         memory_percent: 50.0,
//!         ..ResourceMetrics::default()
//!     },
//! );
//!
//! let analysis = engine.ingest(sample, &FeatureContext::default()).unwrap();
//! for insight in &analysis.insights {
//!     println!("{}", insight.message);
//! }
//! ```

#![deny(unsafe_code)]

pub mod anomaly;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod fingerprint;
pub mod history;
pub mod insight;
pub mod leak;
pub mod sample;
pub mod stats;
pub mod trend;

pub use anomaly::{
    AnomalyDetector, AnomalyModel, AnomalyResult, AnomalyStatus, DetectionMethod,
    IsolationForest, ModelScore, StatisticalScorer, ZScoreSummary,
};
pub use config::EngineConfig;
pub use engine::{Analysis, EngineReport, EntitySummary, PatternEngine};
pub use error::{ModelError, MonitorError, MonitorResult};
pub use features::{
    ConstituentSummary, FeatureContext, FeatureExtractor, FeatureVector, FEATURE_COUNT,
    FEATURE_NAMES,
};
pub use fingerprint::{BehaviorFinding, Fingerprint, FingerprintGenerator, FingerprintStats};
pub use history::{EntityState, HistoryStore, HistoryWindow};
pub use insight::{Insight, InsightGenerator, InsightKind};
pub use leak::{LeakDetector, LeakReport, LeakSeverity};
pub use sample::{EntityId, ResourceMetrics, Sample};
pub use trend::{
    Forecast, ForecastConfidence, Pattern, PatternKind, Severity, TrendAnalyzer,
};
