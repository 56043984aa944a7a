//! Domain types for the Rollgate state store.
//!
//! These types represent the persisted state of rollouts, their transition
//! history, health rules, metric snapshots, health events, and lock leases.
//! All types are serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};

/// Unique identifier for a rollout.
pub type RolloutId = String;

/// Unique identifier for the parent release that owns a rollout.
pub type ReleaseId = String;

/// Unique identifier for a health rule.
pub type RuleId = String;

/// Unique identifier for a metric snapshot.
pub type MetricId = String;

// ── Rollout ───────────────────────────────────────────────────────

/// Which family of store integration drives a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFamily {
    /// Stores that expose an arbitrary user-fraction per stage.
    StagedPercentage,
    /// Stores that run a fixed, day-based phased release.
    PhasedRelease,
}

/// Lifecycle status of a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStatus {
    Created,
    Started,
    Paused,
    Halted,
    Completed,
}

impl RolloutStatus {
    /// Statuses that count against the one-active-rollout-per-channel rule.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Started | Self::Paused | Self::Halted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Paused => "paused",
            Self::Halted => "halted",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for RolloutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The build being rolled out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRef {
    pub version_name: String,
    pub build_number: String,
}

/// A failure captured on a rollout instead of being raised to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedError {
    /// Operation that failed ("advance", "halt", ...).
    pub operation: String,
    /// Failure category ("transient", "lock_contention", ...).
    pub category: String,
    /// External resource the failure refers to.
    pub resource: String,
    pub message: String,
    /// Unix timestamp (millis) of the failure.
    pub at: u64,
}

/// Persisted state of one rollout on one distribution channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutRecord {
    pub id: RolloutId,
    /// Parent release (production or pre-production) owning this rollout.
    pub release_id: ReleaseId,
    /// Release-platform run this rollout belongs to.
    pub run_id: String,
    /// Store submission / track this rollout drives.
    pub channel_id: String,
    pub store_family: StoreFamily,
    /// External account/app scope; serializes store mutations.
    pub account_scope: String,
    pub build: BuildRef,
    /// Stage percentages (0 < p <= 100).
    pub stage_config: Vec<f64>,
    /// Index into `stage_config`; `None` before any stage started.
    pub current_stage: Option<usize>,
    pub status: RolloutStatus,
    pub is_staged: bool,
    pub automatic_rollout: bool,
    /// Set when the last attempted operation failed.
    pub error_flag: bool,
    pub last_error: Option<RecordedError>,
    /// Optimistic-concurrency counter, bumped on every committed write.
    pub version: u64,
    /// Unix timestamp (millis) the automatic scheduler should act next.
    pub next_automatic_update_at: Option<u64>,
    /// Unix timestamp (millis) when this rollout was created.
    pub created_at: u64,
    /// Unix timestamp (millis) of the last committed write.
    pub updated_at: u64,
}

impl RolloutRecord {
    /// Build the key for the rollouts table.
    pub fn table_key(&self) -> String {
        self.id.clone()
    }

    /// Whether this rollout shares a (run, channel) pair with `other`.
    pub fn same_channel(&self, other: &RolloutRecord) -> bool {
        self.run_id == other.run_id && self.channel_id == other.channel_id
    }
}

/// One committed rollout transition, kept as an audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub rollout_id: RolloutId,
    /// Rollout version produced by this transition.
    pub version: u64,
    pub operation: String,
    pub from: RolloutStatus,
    pub to: RolloutStatus,
    pub stage: Option<usize>,
    /// Percentage sent to the store, if any.
    pub percentage: Option<f64>,
    /// Unix timestamp (millis).
    pub at: u64,
}

impl TransitionRecord {
    /// Build the composite key for the transitions table.
    pub fn table_key(&self) -> String {
        format!("{}:{:020}", self.rollout_id, self.version)
    }
}

// ── Health rules ──────────────────────────────────────────────────

/// Named, derived release-health quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    SessionStability,
    UserStability,
    ErrorsCount,
    NewErrorsCount,
    AdoptionRate,
    StagedRollout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionKind {
    /// Breach condition.
    Trigger,
    /// Gate that must also hold for a breach to count.
    Filter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleExpression {
    pub metric: MetricName,
    pub comparator: Comparator,
    pub threshold_value: f64,
    pub kind: ExpressionKind,
}

/// Declarative health threshold, scoped to a release platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRule {
    pub id: RuleId,
    pub platform_id: String,
    pub name: String,
    /// Whether an unhealthy outcome should halt the active rollout.
    pub is_halting: bool,
    pub expressions: Vec<RuleExpression>,
    /// Soft-delete marker (unix millis).
    pub discarded_at: Option<u64>,
    pub created_at: u64,
}

impl HealthRule {
    /// Build the composite key for the health rules table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.platform_id, self.id)
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded_at.is_some()
    }

    pub fn triggers(&self) -> impl Iterator<Item = &RuleExpression> {
        self.expressions
            .iter()
            .filter(|e| e.kind == ExpressionKind::Trigger)
    }

    pub fn filters(&self) -> impl Iterator<Item = &RuleExpression> {
        self.expressions
            .iter()
            .filter(|e| e.kind == ExpressionKind::Filter)
    }
}

// ── Metrics and events ────────────────────────────────────────────

/// Immutable snapshot of raw release-health counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetric {
    pub id: MetricId,
    pub release_id: ReleaseId,
    pub platform_id: String,
    pub sessions: u64,
    pub sessions_with_errors: u64,
    pub daily_users: u64,
    pub daily_users_with_errors: u64,
    pub errors_count: u64,
    pub new_errors_count: u64,
    /// Sessions of this release in the last day.
    pub sessions_in_last_day: u64,
    /// Sessions of all releases in the last day.
    pub total_sessions_in_last_day: u64,
    /// Rollout percentage reported alongside the snapshot.
    pub staged_rollout: Option<f64>,
    /// Unix timestamp (millis) the counters were fetched.
    pub fetched_at: u64,
}

impl HealthMetric {
    /// Build the composite key for the health metrics table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.release_id, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Outcome of evaluating one rule against one metric for one release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthEvent {
    pub id: String,
    pub release_id: ReleaseId,
    pub rule_id: RuleId,
    pub metric_id: MetricId,
    pub status: HealthStatus,
    /// Copied from the rule at evaluation time.
    pub is_halting: bool,
    /// Unix timestamp (millis).
    pub event_at: u64,
}

impl HealthEvent {
    /// Build the composite key for the health events table.
    ///
    /// One key per (release, rule, metric) makes evaluation idempotent.
    pub fn table_key(&self) -> String {
        event_key(&self.release_id, &self.rule_id, &self.metric_id)
    }
}

pub(crate) fn event_key(release_id: &str, rule_id: &str, metric_id: &str) -> String {
    format!("{release_id}:{rule_id}:{metric_id}")
}

// ── Locks ─────────────────────────────────────────────────────────

/// A held lock lease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockLease {
    pub key: String,
    /// Random token identifying the holder.
    pub token: String,
    /// Unix timestamp (millis) after which the lease is void.
    pub expires_at: u64,
}

/// Current unix time in milliseconds.
pub fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
