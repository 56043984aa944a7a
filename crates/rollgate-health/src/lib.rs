//! rollgate-health: release-health evaluation for Rollgate.
//!
//! Metric snapshots arrive already populated. The [`HealthEvaluator`]
//! stores them, evaluates every live [`HealthRule`] of the snapshot's
//! platform, and records one [`HealthEvent`] per (release, rule, metric).
//!
//! # Components
//!
//! - **`expression`**: derived metric values and comparator evaluation
//! - **`rule`**: rule validation and the healthy/unhealthy decision
//! - **`evaluator`**: event recording and halt signalling
//!
//! An unhealthy event from a halting rule enqueues a [`HaltSignal`] on an
//! unbounded channel. The evaluator never waits on the consumer; whatever
//! executes the halt reads the other end.
//!
//! [`HealthRule`]: rollgate_state::HealthRule
//! [`HealthEvent`]: rollgate_state::HealthEvent

pub mod error;
pub mod evaluator;
pub mod expression;
pub mod rule;

use serde::{Deserialize, Serialize};

pub use error::{HealthError, HealthResult, RuleError};
pub use evaluator::{HealthEvaluator, RuleDraft};
pub use expression::{compare, is_satisfied, metric_value};
pub use rule::{rule_is_healthy, validate_rule};

/// Request to halt the active rollout of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltSignal {
    pub release_id: String,
    /// The unhealthy event that caused the request.
    pub event_id: String,
}
