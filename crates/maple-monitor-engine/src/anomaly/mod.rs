//! Anomaly detection with a pluggable model and statistical fallback.
//!
//! ## Architecture
//!
//! ```text
//!   history (excluding current) + current FeatureVector
//!       │
//!       ├── window < min_samples_statistical ──► LEARNING
//!       │
//!       ├──► AnomalyModel (isolation forest)      [if supplied, history ≥ min_samples_model]
//!       │       │ Ok  ──► method = model
//!       │       └ Err ──┐
//!       │               ▼
//!       └──► StatisticalScorer (z-scores) ──► method = statistical | model_fallback
//! ```

pub mod detector;
pub mod model;
pub mod types;

pub use detector::{AnomalyDetector, StatisticalScorer};
pub use model::{AnomalyModel, IsolationForest, ModelScore};
pub use types::{AnomalyResult, AnomalyStatus, DetectionMethod, ZScoreSummary};
