//! redb table definitions for the Rollgate state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).
//! Composite keys follow the pattern `{parent_id}:{child_id}` so that related
//! records can be found with a prefix scan.

use redb::TableDefinition;

/// Rollout records keyed by `{rollout_id}`.
pub const ROLLOUTS: TableDefinition<&str, &[u8]> = TableDefinition::new("rollouts");

/// Transition audit trail keyed by `{rollout_id}:{version:020}`.
pub const TRANSITIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("rollout_transitions");

/// Health rules keyed by `{platform_id}/{rule_id}`.
pub const HEALTH_RULES: TableDefinition<&str, &[u8]> = TableDefinition::new("health_rules");

/// Metric snapshots keyed by `{release_id}:{metric_id}`.
pub const HEALTH_METRICS: TableDefinition<&str, &[u8]> = TableDefinition::new("health_metrics");

/// Health events keyed by `{release_id}:{rule_id}:{metric_id}`.
pub const HEALTH_EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("health_events");

/// Lock leases keyed by lock key.
pub const LOCKS: TableDefinition<&str, &[u8]> = TableDefinition::new("locks");
