//! Health error types.

use thiserror::Error;

use rollgate_state::{MetricName, StateError};

/// Result type alias for health operations.
pub type HealthResult<T> = Result<T, HealthError>;

/// A rule that cannot be stored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("rule name is empty")]
    EmptyName,

    #[error("rule has no trigger expression")]
    NoTrigger,

    #[error("rule has more than one trigger on {0:?}")]
    DuplicateTrigger(MetricName),

    #[error("threshold {value} on {metric:?} is not a finite number")]
    InvalidThreshold { metric: MetricName, value: f64 },
}

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("invalid rule: {0}")]
    Rule(#[from] RuleError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    State(#[from] StateError),
}
