//! StateStore: redb-backed state persistence for Rollgate.
//!
//! Provides typed operations over rollouts, transitions, health rules,
//! metrics, health events, and lock leases. All values are JSON-serialized
//! into redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Result of a compare-and-swap rollout write.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The write landed; carries the record as stored.
    Committed(RolloutRecord),
    /// Another writer got there first.
    Stale { current_version: u64 },
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for def in [
            ROLLOUTS,
            TRANSITIONS,
            HEALTH_RULES,
            HEALTH_METRICS,
            HEALTH_EVENTS,
            LOCKS,
        ] {
            txn.open_table(def).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic helpers ────────────────────────────────────────────

    fn get_json<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, def: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert `value` only if `key` is vacant. Returns true if it was written.
    fn insert_absent<T: Serialize>(
        &self,
        def: JsonTable,
        key: &str,
        value: &T,
    ) -> StateResult<bool> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let inserted;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            let exists = table.get(key).map_err(map_err!(Read))?.is_some();
            if !exists {
                table
                    .insert(key, bytes.as_slice())
                    .map_err(map_err!(Write))?;
            }
            inserted = !exists;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(inserted)
    }

    fn scan_prefix<T: DeserializeOwned>(
        &self,
        def: JsonTable,
        prefix: &str,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let item: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(item);
            }
        }
        Ok(results)
    }

    // ── Rollouts ───────────────────────────────────────────────────

    /// Insert a new rollout. Fails if the id is taken.
    pub fn insert_rollout(&self, rollout: &RolloutRecord) -> StateResult<()> {
        let key = rollout.table_key();
        if !self.insert_absent(ROLLOUTS, &key, rollout)? {
            return Err(StateError::AlreadyExists(format!("rollout {key}")));
        }
        debug!(%key, "rollout stored");
        Ok(())
    }

    /// Get a rollout by id.
    pub fn get_rollout(&self, id: &str) -> StateResult<Option<RolloutRecord>> {
        self.get_json(ROLLOUTS, id)
    }

    /// List all rollouts.
    pub fn list_rollouts(&self) -> StateResult<Vec<RolloutRecord>> {
        self.scan_prefix(ROLLOUTS, "")
    }

    /// List the rollouts owned by a parent release.
    pub fn list_rollouts_for_release(&self, release_id: &str) -> StateResult<Vec<RolloutRecord>> {
        Ok(self
            .list_rollouts()?
            .into_iter()
            .filter(|r| r.release_id == release_id)
            .collect())
    }

    /// Find an active rollout on the same run and channel as `rollout`,
    /// other than `rollout` itself.
    pub fn active_rollout_on_channel(
        &self,
        rollout: &RolloutRecord,
    ) -> StateResult<Option<RolloutRecord>> {
        Ok(self
            .list_rollouts()?
            .into_iter()
            .find(|r| r.id != rollout.id && r.same_channel(rollout) && r.status.is_active()))
    }

    /// Compare-and-swap a rollout write.
    ///
    /// The write lands only if the stored record still carries
    /// `expected_version`; the stored copy gets `expected_version + 1`.
    /// Moving a rollout into an active status fails with
    /// [`StateError::Conflict`] when another rollout is already active on
    /// the same run and channel. The optional transition is appended to the
    /// audit trail in the same transaction.
    pub fn commit_rollout(
        &self,
        updated: &RolloutRecord,
        expected_version: u64,
        transition: Option<&TransitionRecord>,
    ) -> StateResult<CommitOutcome> {
        let key = updated.table_key();
        let mut stored = updated.clone();
        stored.version = expected_version + 1;
        let bytes = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
            let current: RolloutRecord = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("rollout {key}"))),
            };

            if current.version != expected_version {
                debug!(%key, expected_version, current = current.version, "stale rollout write");
                return Ok(CommitOutcome::Stale {
                    current_version: current.version,
                });
            }

            if stored.status.is_active() && !current.status.is_active() {
                for entry in table.iter().map_err(map_err!(Read))? {
                    let (_, value) = entry.map_err(map_err!(Read))?;
                    let other: RolloutRecord =
                        serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                    if other.id != stored.id
                        && other.same_channel(&stored)
                        && other.status.is_active()
                    {
                        return Err(StateError::Conflict(format!(
                            "rollout {} is already {} on run {} channel {}",
                            other.id, other.status, other.run_id, other.channel_id
                        )));
                    }
                }
            }

            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }

        if let Some(transition) = transition {
            let mut transition = transition.clone();
            transition.version = stored.version;
            let tkey = transition.table_key();
            let tbytes = serde_json::to_vec(&transition).map_err(map_err!(Serialize))?;
            let mut table = txn.open_table(TRANSITIONS).map_err(map_err!(Table))?;
            table
                .insert(tkey.as_str(), tbytes.as_slice())
                .map_err(map_err!(Write))?;
        }

        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, version = stored.version, status = %stored.status, "rollout committed");
        Ok(CommitOutcome::Committed(stored))
    }

    /// Transition history for a rollout, oldest first.
    pub fn list_transitions(&self, rollout_id: &str) -> StateResult<Vec<TransitionRecord>> {
        self.scan_prefix(TRANSITIONS, &format!("{rollout_id}:"))
    }

    // ── Health rules ───────────────────────────────────────────────

    /// Insert or update a health rule.
    pub fn put_health_rule(&self, rule: &HealthRule) -> StateResult<()> {
        let key = rule.table_key();
        self.put_json(HEALTH_RULES, &key, rule)?;
        debug!(%key, "health rule stored");
        Ok(())
    }

    pub fn get_health_rule(
        &self,
        platform_id: &str,
        rule_id: &str,
    ) -> StateResult<Option<HealthRule>> {
        self.get_json(HEALTH_RULES, &format!("{platform_id}/{rule_id}"))
    }

    /// List rules for a platform. Discarded rules are filtered out unless
    /// `include_discarded` is set.
    pub fn list_health_rules(
        &self,
        platform_id: &str,
        include_discarded: bool,
    ) -> StateResult<Vec<HealthRule>> {
        let rules: Vec<HealthRule> = self.scan_prefix(HEALTH_RULES, &format!("{platform_id}/"))?;
        Ok(rules
            .into_iter()
            .filter(|r| include_discarded || !r.is_discarded())
            .collect())
    }

    // ── Health metrics ─────────────────────────────────────────────

    /// Record a metric snapshot. Snapshots are immutable: returns false and
    /// leaves the stored copy alone if the id was already recorded.
    pub fn insert_health_metric(&self, metric: &HealthMetric) -> StateResult<bool> {
        let key = metric.table_key();
        let inserted = self.insert_absent(HEALTH_METRICS, &key, metric)?;
        debug!(%key, inserted, "health metric recorded");
        Ok(inserted)
    }

    pub fn get_health_metric(
        &self,
        release_id: &str,
        metric_id: &str,
    ) -> StateResult<Option<HealthMetric>> {
        self.get_json(HEALTH_METRICS, &format!("{release_id}:{metric_id}"))
    }

    /// Metric snapshots for a release, newest first, at most `limit`.
    pub fn list_metrics_for_release(
        &self,
        release_id: &str,
        limit: usize,
    ) -> StateResult<Vec<HealthMetric>> {
        let mut metrics: Vec<HealthMetric> =
            self.scan_prefix(HEALTH_METRICS, &format!("{release_id}:"))?;
        metrics.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
        metrics.truncate(limit);
        Ok(metrics)
    }

    // ── Health events ──────────────────────────────────────────────

    /// Insert an event unless one exists for its (release, rule, metric).
    /// Returns true if the event was created.
    pub fn insert_health_event(&self, event: &HealthEvent) -> StateResult<bool> {
        let key = event.table_key();
        let created = self.insert_absent(HEALTH_EVENTS, &key, event)?;
        debug!(%key, created, status = ?event.status, "health event");
        Ok(created)
    }

    pub fn get_health_event_for(
        &self,
        release_id: &str,
        rule_id: &str,
        metric_id: &str,
    ) -> StateResult<Option<HealthEvent>> {
        self.get_json(HEALTH_EVENTS, &event_key(release_id, rule_id, metric_id))
    }

    /// Find an event of a release by its id.
    pub fn get_health_event(
        &self,
        release_id: &str,
        event_id: &str,
    ) -> StateResult<Option<HealthEvent>> {
        Ok(self
            .list_health_events_for_release(release_id)?
            .into_iter()
            .find(|e| e.id == event_id))
    }

    /// Events of a release, oldest first.
    pub fn list_health_events_for_release(
        &self,
        release_id: &str,
    ) -> StateResult<Vec<HealthEvent>> {
        let mut events: Vec<HealthEvent> =
            self.scan_prefix(HEALTH_EVENTS, &format!("{release_id}:"))?;
        events.sort_by(|a, b| a.event_at.cmp(&b.event_at));
        Ok(events)
    }

    // ── Locks ──────────────────────────────────────────────────────

    /// Take the lease on `key` for `token` unless someone else holds an
    /// unexpired lease. Returns true if the lease is now held by `token`.
    pub fn try_acquire_lock(
        &self,
        key: &str,
        token: &str,
        ttl_ms: u64,
        now: u64,
    ) -> StateResult<bool> {
        let lease = LockLease {
            key: key.to_string(),
            token: token.to_string(),
            expires_at: now.saturating_add(ttl_ms),
        };
        let bytes = serde_json::to_vec(&lease).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let acquired;
        {
            let mut table = txn.open_table(LOCKS).map_err(map_err!(Table))?;
            let holder: Option<LockLease> = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            acquired = match holder {
                Some(h) => h.token == token || h.expires_at <= now,
                None => true,
            };
            if acquired {
                table
                    .insert(key, bytes.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(acquired)
    }

    /// Drop the lease on `key` if `token` still holds it.
    pub fn release_lock(&self, key: &str, token: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let released;
        {
            let mut table = txn.open_table(LOCKS).map_err(map_err!(Table))?;
            let holder: Option<LockLease> = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            released = holder.is_some_and(|h| h.token == token);
            if released {
                table.remove(key).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(released)
    }

    /// Current lease on `key`, expired or not.
    pub fn get_lock(&self, key: &str) -> StateResult<Option<LockLease>> {
        self.get_json(LOCKS, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rollout(id: &str, run_id: &str, channel_id: &str) -> RolloutRecord {
        RolloutRecord {
            id: id.to_string(),
            release_id: "release-1".to_string(),
            run_id: run_id.to_string(),
            channel_id: channel_id.to_string(),
            store_family: StoreFamily::StagedPercentage,
            account_scope: "play:com.example.app".to_string(),
            build: BuildRef {
                version_name: "1.2.0".to_string(),
                build_number: "120".to_string(),
            },
            stage_config: vec![1.0, 20.0, 50.0, 100.0],
            current_stage: None,
            status: RolloutStatus::Created,
            is_staged: true,
            automatic_rollout: false,
            error_flag: false,
            last_error: None,
            version: 0,
            next_automatic_update_at: None,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_rule(platform_id: &str, id: &str) -> HealthRule {
        HealthRule {
            id: id.to_string(),
            platform_id: platform_id.to_string(),
            name: "crash-free sessions".to_string(),
            is_halting: true,
            expressions: vec![RuleExpression {
                metric: MetricName::SessionStability,
                comparator: Comparator::Lt,
                threshold_value: 99.0,
                kind: ExpressionKind::Trigger,
            }],
            discarded_at: None,
            created_at: 1000,
        }
    }

    fn test_metric(release_id: &str, id: &str, fetched_at: u64) -> HealthMetric {
        HealthMetric {
            id: id.to_string(),
            release_id: release_id.to_string(),
            platform_id: "android".to_string(),
            sessions: 1000,
            sessions_with_errors: 5,
            daily_users: 400,
            daily_users_with_errors: 2,
            errors_count: 7,
            new_errors_count: 1,
            sessions_in_last_day: 300,
            total_sessions_in_last_day: 1200,
            staged_rollout: Some(20.0),
            fetched_at,
        }
    }

    fn test_event(
        release_id: &str,
        rule_id: &str,
        metric_id: &str,
        status: HealthStatus,
    ) -> HealthEvent {
        HealthEvent {
            id: format!("evt-{rule_id}-{metric_id}"),
            release_id: release_id.to_string(),
            rule_id: rule_id.to_string(),
            metric_id: metric_id.to_string(),
            status,
            is_halting: true,
            event_at: 1000,
        }
    }

    // ── Rollouts ───────────────────────────────────────────────────

    #[test]
    fn rollout_insert_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let rollout = test_rollout("r-1", "run-1", "production");

        store.insert_rollout(&rollout).unwrap();
        assert_eq!(store.get_rollout("r-1").unwrap(), Some(rollout));
        assert!(store.get_rollout("nope").unwrap().is_none());
    }

    #[test]
    fn rollout_insert_twice_fails() {
        let store = StateStore::open_in_memory().unwrap();
        let rollout = test_rollout("r-1", "run-1", "production");
        store.insert_rollout(&rollout).unwrap();

        let err = store.insert_rollout(&rollout).unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));
    }

    #[test]
    fn commit_bumps_version_and_records_transition() {
        let store = StateStore::open_in_memory().unwrap();
        let rollout = test_rollout("r-1", "run-1", "production");
        store.insert_rollout(&rollout).unwrap();

        let mut started = rollout.clone();
        started.status = RolloutStatus::Started;
        started.current_stage = Some(0);
        let transition = TransitionRecord {
            rollout_id: "r-1".to_string(),
            version: 0,
            operation: "start".to_string(),
            from: RolloutStatus::Created,
            to: RolloutStatus::Started,
            stage: Some(0),
            percentage: Some(1.0),
            at: 2000,
        };

        let outcome = store.commit_rollout(&started, 0, Some(&transition)).unwrap();
        let CommitOutcome::Committed(stored) = outcome else {
            panic!("expected commit");
        };
        assert_eq!(stored.version, 1);
        assert_eq!(store.get_rollout("r-1").unwrap().unwrap().version, 1);

        let history = store.list_transitions("r-1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 1);
        assert_eq!(history[0].to, RolloutStatus::Started);
    }

    #[test]
    fn commit_with_stale_version_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let rollout = test_rollout("r-1", "run-1", "production");
        store.insert_rollout(&rollout).unwrap();

        let mut first = rollout.clone();
        first.status = RolloutStatus::Started;
        first.current_stage = Some(0);
        assert!(matches!(
            store.commit_rollout(&first, 0, None).unwrap(),
            CommitOutcome::Committed(_)
        ));

        // Second writer still believes version 0.
        let mut second = rollout.clone();
        second.status = RolloutStatus::Started;
        second.current_stage = Some(1);
        assert_eq!(
            store.commit_rollout(&second, 0, None).unwrap(),
            CommitOutcome::Stale { current_version: 1 }
        );
        assert_eq!(store.get_rollout("r-1").unwrap().unwrap().current_stage, Some(0));
    }

    #[test]
    fn commit_refuses_second_active_rollout_on_channel() {
        let store = StateStore::open_in_memory().unwrap();
        let a = test_rollout("r-a", "run-1", "production");
        let b = test_rollout("r-b", "run-1", "production");
        let other_channel = test_rollout("r-c", "run-1", "beta");
        store.insert_rollout(&a).unwrap();
        store.insert_rollout(&b).unwrap();
        store.insert_rollout(&other_channel).unwrap();

        let mut started = a.clone();
        started.status = RolloutStatus::Started;
        store.commit_rollout(&started, 0, None).unwrap();

        let mut started_b = b.clone();
        started_b.status = RolloutStatus::Started;
        let err = store.commit_rollout(&started_b, 0, None).unwrap_err();
        assert!(matches!(err, StateError::Conflict(_)));

        let mut started_c = other_channel.clone();
        started_c.status = RolloutStatus::Started;
        assert!(matches!(
            store.commit_rollout(&started_c, 0, None).unwrap(),
            CommitOutcome::Committed(_)
        ));

        assert_eq!(
            store.active_rollout_on_channel(&b).unwrap().map(|r| r.id),
            Some("r-a".to_string())
        );
    }

    #[test]
    fn commit_missing_rollout_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let rollout = test_rollout("ghost", "run-1", "production");
        let err = store.commit_rollout(&rollout, 0, None).unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn rollouts_for_release() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_rollout(&test_rollout("r-1", "run-1", "production")).unwrap();
        let mut other = test_rollout("r-2", "run-2", "production");
        other.release_id = "release-2".to_string();
        store.insert_rollout(&other).unwrap();

        let found = store.list_rollouts_for_release("release-1").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "r-1");
        assert_eq!(store.list_rollouts().unwrap().len(), 2);
    }

    // ── Health rules ───────────────────────────────────────────────

    #[test]
    fn discarded_rules_are_filtered_at_query_time() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_health_rule(&test_rule("android", "rule-1")).unwrap();
        let mut discarded = test_rule("android", "rule-2");
        discarded.discarded_at = Some(5000);
        store.put_health_rule(&discarded).unwrap();
        store.put_health_rule(&test_rule("ios", "rule-3")).unwrap();

        let active = store.list_health_rules("android", false).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "rule-1");
        assert_eq!(store.list_health_rules("android", true).unwrap().len(), 2);
        assert!(store.get_health_rule("android", "rule-2").unwrap().unwrap().is_discarded());
    }

    // ── Metrics and events ─────────────────────────────────────────

    #[test]
    fn metrics_are_immutable_once_recorded() {
        let store = StateStore::open_in_memory().unwrap();
        let metric = test_metric("release-1", "m-1", 1000);
        assert!(store.insert_health_metric(&metric).unwrap());

        let mut altered = metric.clone();
        altered.sessions_with_errors = 999;
        assert!(!store.insert_health_metric(&altered).unwrap());

        let stored = store.get_health_metric("release-1", "m-1").unwrap().unwrap();
        assert_eq!(stored.sessions_with_errors, 5);
    }

    #[test]
    fn metrics_listed_newest_first() {
        let store = StateStore::open_in_memory().unwrap();
        for (id, at) in [("m-1", 1000u64), ("m-2", 3000), ("m-3", 2000)] {
            store.insert_health_metric(&test_metric("release-1", id, at)).unwrap();
        }
        store.insert_health_metric(&test_metric("release-2", "m-9", 9000)).unwrap();

        let recent = store.list_metrics_for_release("release-1", 2).unwrap();
        let ids: Vec<_> = recent.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-2", "m-3"]);
    }

    #[test]
    fn health_event_unique_per_triple() {
        let store = StateStore::open_in_memory().unwrap();
        let event = test_event("release-1", "rule-1", "m-1", HealthStatus::Unhealthy);

        assert!(store.insert_health_event(&event).unwrap());
        let mut again = event.clone();
        again.id = "evt-other".to_string();
        assert!(!store.insert_health_event(&again).unwrap());

        let events = store.list_health_events_for_release("release-1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            store.get_health_event("release-1", &event.id).unwrap(),
            Some(event.clone())
        );
        assert!(store
            .get_health_event_for("release-1", "rule-1", "m-1")
            .unwrap()
            .is_some());
    }

    // ── Locks ──────────────────────────────────────────────────────

    #[test]
    fn lock_excludes_other_holders_until_expiry() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.try_acquire_lock("scope", "a", 1_000, 10_000).unwrap());
        assert!(!store.try_acquire_lock("scope", "b", 1_000, 10_500).unwrap());
        // Re-entrant for the same token.
        assert!(store.try_acquire_lock("scope", "a", 1_000, 10_500).unwrap());
        // Lease from 10_500 runs until 11_500.
        assert!(store.try_acquire_lock("scope", "b", 1_000, 11_500).unwrap());
        assert_eq!(store.get_lock("scope").unwrap().unwrap().token, "b");
    }

    #[test]
    fn lock_release_requires_token() {
        let store = StateStore::open_in_memory().unwrap();
        store.try_acquire_lock("scope", "a", 60_000, 0).unwrap();

        assert!(!store.release_lock("scope", "b").unwrap());
        assert!(store.release_lock("scope", "a").unwrap());
        assert!(store.get_lock("scope").unwrap().is_none());
        assert!(store.try_acquire_lock("scope", "b", 60_000, 1).unwrap());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.insert_rollout(&test_rollout("r-1", "run-1", "production")).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        let rollout = store.get_rollout("r-1").unwrap();
        assert_eq!(rollout.unwrap().channel_id, "production");
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_rollouts().unwrap().is_empty());
        assert!(store.list_transitions("any").unwrap().is_empty());
        assert!(store.list_health_rules("any", true).unwrap().is_empty());
        assert!(store.list_metrics_for_release("any", 10).unwrap().is_empty());
        assert!(store.list_health_events_for_release("any").unwrap().is_empty());
        assert!(!store.release_lock("any", "token").unwrap());
    }
}
