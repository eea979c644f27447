use thiserror::Error;

/// Errors surfaced by the pattern engine.
///
/// Only sample validation and configuration problems reach callers; every
/// failure inside the detection path degrades to a documented default.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid sample for {entity}: {field} = {value} ({reason})")]
    InvalidSample {
        entity: String,
        field: String,
        value: f64,
        reason: &'static str,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),
}

/// Convenience type alias for engine results.
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Failures raised while fitting or scoring an anomaly model.
///
/// These never escape the detector: they trigger the statistical fallback
/// and are attached to the result as the fallback cause.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("model needs at least {needed} training vectors, got {got}")]
    InsufficientSamples { needed: usize, got: usize },

    #[error("feature dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("non-finite value in feature {feature}")]
    NonFinite { feature: usize },

    #[error("training data is degenerate: no feature varies")]
    Degenerate,
}
