//! Rollout controller: executes the transition table against a store.
//!
//! Every mutating operation follows the same path:
//!
//! 1. load the record and ask the parent whether it is actionable
//! 2. plan the transition (pure; a no-op plan becomes `Outcome::Skipped`)
//! 3. take the account-scope lock through the retry shell
//! 4. re-read and re-plan; skip if the operation now means something else
//! 5. make the store call under the retry policy
//! 6. commit status, stage and audit entry with a version compare-and-swap
//!
//! A failed store call leaves status and stage alone, sets `error_flag` and
//! records the error, so the same operation can simply be retried.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use rollgate_core::config::{ConfigError, RollgateConfig};
use rollgate_guard::{
    CallOptions, DistributedLock, LockConfig, LockError, RetryPolicy, RetryShell, ShellError,
};
use rollgate_state::{
    epoch_millis, BuildRef, CommitOutcome, RecordedError, RolloutRecord, RolloutStatus, StateStore,
    StoreFamily, TransitionRecord,
};
use rollgate_storefront::{StoreClient, StoreTarget, TrackStatus};

use crate::error::{RolloutError, RolloutResult};
use crate::machine::{self, Command, Effect, Plan, SkipReason};
use crate::parent::ParentRelease;
use crate::registry::ClientRegistry;
use crate::stages::validate_stages;

/// Category recorded when a lenient operation could not take the lock.
pub(crate) const LOCK_CONTENTION: &str = "lock_contention";

/// How lock contention is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    /// Raise [`RolloutError::LockContention`]; for interactive callers.
    Strict,
    /// Record the failure on the rollout; for background retries.
    #[default]
    Lenient,
}

/// Result of one rollout operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// The transition was committed.
    Applied(RolloutRecord),
    /// Nothing happened and nothing was called.
    Skipped(SkipReason),
    /// The operation failed; the error is recorded on the rollout.
    Failed(RecordedError),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn record(&self) -> Option<&RolloutRecord> {
        match self {
            Self::Applied(record) => Some(record),
            _ => None,
        }
    }
}

/// Input for [`RolloutController::create`].
#[derive(Debug, Clone)]
pub struct NewRollout {
    pub release_id: String,
    pub run_id: String,
    pub channel_id: String,
    pub store_family: StoreFamily,
    pub account_scope: String,
    pub build: BuildRef,
    pub stage_config: Vec<f64>,
    pub is_staged: bool,
    pub automatic_rollout: bool,
}

/// Drives rollouts. Cheap to clone; clones share state, clients and lock.
#[derive(Clone)]
pub struct RolloutController {
    state: StateStore,
    clients: ClientRegistry,
    shell: RetryShell,
    parent: Arc<dyn ParentRelease>,
    stage_interval: Duration,
}

impl RolloutController {
    pub fn new(
        state: StateStore,
        clients: ClientRegistry,
        shell: RetryShell,
        parent: Arc<dyn ParentRelease>,
    ) -> Self {
        Self {
            state,
            clients,
            shell,
            parent,
            stage_interval: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Build a controller whose lock leases live in `state`.
    pub fn from_config(
        config: &RollgateConfig,
        state: StateStore,
        clients: ClientRegistry,
        parent: Arc<dyn ParentRelease>,
    ) -> Result<Self, ConfigError> {
        let lock = DistributedLock::new(
            Arc::new(state.clone()),
            LockConfig::try_from(&config.lock)?,
        );
        let shell = RetryShell::new(lock, RetryPolicy::try_from(&config.retry)?);
        Ok(Self::new(state, clients, shell, parent)
            .with_stage_interval(config.scheduler.stage_interval()?))
    }

    /// Delay between automatic stage advances.
    pub fn with_stage_interval(mut self, interval: Duration) -> Self {
        self.stage_interval = interval;
        self
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    // ── Queries ────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> RolloutResult<RolloutRecord> {
        self.state
            .get_rollout(id)?
            .ok_or_else(|| RolloutError::NotFound(id.to_string()))
    }

    pub fn rollouts_for_release(&self, release_id: &str) -> RolloutResult<Vec<RolloutRecord>> {
        Ok(self.state.list_rollouts_for_release(release_id)?)
    }

    /// Committed transitions of a rollout, oldest first.
    pub fn transitions(&self, id: &str) -> RolloutResult<Vec<TransitionRecord>> {
        Ok(self.state.list_transitions(id)?)
    }

    /// Ask the store where the release stands.
    pub async fn track_status(&self, id: &str) -> RolloutResult<TrackStatus> {
        let record = self.get(id)?;
        let client = self.client(record.store_family)?;
        Ok(client.query_track(&target(&record)).await?)
    }

    // ── Operations ─────────────────────────────────────────────────

    /// Persist a new rollout in `Created`.
    pub fn create(&self, new: NewRollout) -> RolloutResult<RolloutRecord> {
        validate_stages(&new.stage_config).map_err(RolloutError::Invalid)?;
        if new.account_scope.trim().is_empty() {
            return Err(RolloutError::Invalid("account scope is empty".to_string()));
        }

        let now = epoch_millis();
        let record = RolloutRecord {
            id: uuid::Uuid::new_v4().to_string(),
            release_id: new.release_id,
            run_id: new.run_id,
            channel_id: new.channel_id,
            store_family: new.store_family,
            account_scope: new.account_scope,
            build: new.build,
            stage_config: new.stage_config,
            current_stage: None,
            status: RolloutStatus::Created,
            is_staged: new.is_staged,
            automatic_rollout: new.automatic_rollout,
            error_flag: false,
            last_error: None,
            version: 0,
            next_automatic_update_at: None,
            created_at: now,
            updated_at: now,
        };
        self.state.insert_rollout(&record)?;
        info!(
            rollout = %record.id,
            release = %record.release_id,
            channel = %record.channel_id,
            stages = record.stage_config.len(),
            "rollout created"
        );
        Ok(record)
    }

    /// Create the store draft for a `Created` rollout.
    pub async fn prepare_draft(&self, id: &str, mode: LockMode) -> RolloutResult<Outcome> {
        self.execute(id, Command::PrepareDraft, mode).await
    }

    pub async fn start(&self, id: &str, mode: LockMode) -> RolloutResult<Outcome> {
        self.execute(id, Command::Start, mode).await
    }

    /// Move to the next stage, or release fully from the last one.
    pub async fn advance(&self, id: &str, mode: LockMode) -> RolloutResult<Outcome> {
        self.execute(id, Command::Advance, mode).await
    }

    pub async fn halt(&self, id: &str, mode: LockMode) -> RolloutResult<Outcome> {
        self.execute(id, Command::Halt, mode).await
    }

    pub async fn pause(&self, id: &str, mode: LockMode) -> RolloutResult<Outcome> {
        self.execute(id, Command::Pause, mode).await
    }

    pub async fn resume(&self, id: &str, mode: LockMode) -> RolloutResult<Outcome> {
        self.execute(id, Command::Resume, mode).await
    }

    pub async fn release_fully(&self, id: &str, mode: LockMode) -> RolloutResult<Outcome> {
        self.execute(id, Command::ReleaseFully, mode).await
    }

    /// Complete a started rollout the store has finished on its own.
    ///
    /// Read-only against the store, so it takes no lock; the version
    /// compare-and-swap still guards the commit.
    pub async fn refresh(&self, id: &str) -> RolloutResult<Outcome> {
        let record = self.get(id)?;
        let plan = match self.prepare(&record, Command::ObserveCompletion)? {
            Ok(plan) => plan,
            Err(reason) => return Ok(skipped(&record, Command::ObserveCompletion, reason)),
        };

        let client = self.client(record.store_family)?;
        let track = client.query_track(&target(&record)).await?;
        if !track.is_complete() {
            debug!(
                rollout = %record.id,
                state = ?track.state,
                percentage = ?track.percentage,
                "store release still running"
            );
            return Ok(Outcome::Skipped(SkipReason::StoreNotComplete));
        }
        self.commit(&record, &plan)
    }

    async fn execute(&self, id: &str, command: Command, mode: LockMode) -> RolloutResult<Outcome> {
        let record = self.get(id)?;
        let plan = match self.prepare(&record, command)? {
            Ok(plan) => plan,
            Err(reason) => return Ok(skipped(&record, command, reason)),
        };
        let client = self.client(record.store_family)?;

        let guard = match self.shell.acquire(&record.account_scope).await {
            Ok(guard) => guard,
            Err(e @ LockError::Contended { .. }) => {
                if mode == LockMode::Strict {
                    return Err(RolloutError::LockContention(e));
                }
                let error = self.record_failure(
                    &record,
                    command,
                    LOCK_CONTENTION,
                    &record.account_scope,
                    e.to_string(),
                )?;
                return Ok(Outcome::Failed(error));
            }
            Err(e) => return Err(RolloutError::Lock(e)),
        };

        // Other writers may have moved this rollout or its channel while we
        // waited. The operation goes ahead only if it still means the same
        // store call and the same target status.
        let current = self.get(id)?;
        let plan = match self.prepare(&current, command)? {
            Ok(replanned) if replanned.call == plan.call && replanned.to == plan.to => replanned,
            Ok(_) => return Ok(skipped(&current, command, SkipReason::Stale)),
            Err(reason) => return Ok(skipped(&current, command, reason)),
        };

        if plan.has_effect(Effect::NotifyStarted) {
            self.parent.rollout_started(&current);
        }

        if let Some(call) = plan.call {
            let target = target(&current);
            let options = CallOptions {
                skip_review_fallback: plan.skip_review_fallback,
            };
            debug!(
                rollout = %current.id,
                call = call.name(),
                percentage = ?call.percentage(),
                scope = %current.account_scope,
                "calling store"
            );

            let result = self
                .shell
                .invoke(&guard, options, |skip_review| {
                    call.dispatch(&*client, &target, skip_review)
                })
                .await;

            match result {
                Ok(report) => {
                    debug!(
                        rollout = %current.id,
                        attempts = report.attempts,
                        skip_review = report.skip_review,
                        duplicate = report.duplicate,
                        "store call done"
                    );
                }
                Err(ShellError::Store { source, attempts }) => {
                    drop(guard);
                    warn!(
                        rollout = %current.id,
                        operation = %command,
                        attempts,
                        error = %source,
                        "rollout operation failed"
                    );
                    let error = self.record_failure(
                        &current,
                        command,
                        source.category.as_str(),
                        &source.resource,
                        source.message,
                    )?;
                    return Ok(Outcome::Failed(error));
                }
                Err(ShellError::Lock(e)) => return Err(RolloutError::Lock(e)),
            }
        }

        let outcome = self.commit(&current, &plan);
        drop(guard);
        outcome
    }

    /// Parent check, transition plan, and the one-active-per-channel check.
    fn prepare(
        &self,
        record: &RolloutRecord,
        command: Command,
    ) -> RolloutResult<Result<Plan, SkipReason>> {
        if !self.parent.is_actionable(record) {
            return Ok(Err(SkipReason::NotActionable));
        }
        let plan = match machine::plan(record, command) {
            Ok(plan) => plan,
            Err(reason) => return Ok(Err(reason)),
        };
        if plan.to.is_active() && !record.status.is_active() {
            if let Some(other) = self.state.active_rollout_on_channel(record)? {
                return Ok(Err(SkipReason::ChannelBusy { rollout_id: other.id }));
            }
        }
        Ok(Ok(plan))
    }

    /// Commit the planned transition on top of `base`.
    ///
    /// A concurrent write that only touched the error fields (a lenient lock
    /// failure recorded by another caller) does not invalidate the plan, so
    /// the commit is retried on the newer copy.
    fn commit(&self, base: &RolloutRecord, plan: &Plan) -> RolloutResult<Outcome> {
        let mut current = base.clone();
        loop {
            match self.try_commit(&current, plan)? {
                CommitOutcome::Committed(stored) => {
                    info!(
                        rollout = %stored.id,
                        operation = %plan.command,
                        from = %current.status,
                        to = %stored.status,
                        stage = ?stored.current_stage,
                        "rollout transition"
                    );
                    if plan.has_effect(Effect::NotifyComplete) {
                        self.parent.rollout_complete(&stored);
                    }
                    return Ok(Outcome::Applied(stored));
                }
                CommitOutcome::Stale { current_version } => {
                    let latest = self.get(&current.id)?;
                    if latest.status == current.status
                        && latest.current_stage == current.current_stage
                    {
                        debug!(
                            rollout = %current.id,
                            current_version,
                            "rollout flagged meanwhile, recommitting"
                        );
                        current = latest;
                        continue;
                    }
                    warn!(
                        rollout = %current.id,
                        operation = %plan.command,
                        expected = current.version,
                        current_version,
                        "rollout moved during operation, transition dropped"
                    );
                    return Ok(Outcome::Skipped(SkipReason::Stale));
                }
            }
        }
    }

    fn try_commit(&self, current: &RolloutRecord, plan: &Plan) -> RolloutResult<CommitOutcome> {
        let now = epoch_millis();
        let mut updated = current.clone();
        updated.status = plan.to;
        updated.current_stage = plan.stage;
        updated.error_flag = false;
        updated.last_error = None;
        updated.updated_at = now;
        updated.next_automatic_update_at =
            if updated.automatic_rollout && updated.is_staged && plan.to == RolloutStatus::Started {
                Some(now + self.stage_interval.as_millis() as u64)
            } else {
                None
            };

        let transition = TransitionRecord {
            rollout_id: current.id.clone(),
            version: current.version + 1,
            operation: plan.command.as_str().to_string(),
            from: current.status,
            to: plan.to,
            stage: plan.stage,
            percentage: plan.call.and_then(|call| call.percentage()),
            at: now,
        };

        Ok(self.state.commit_rollout(&updated, current.version, Some(&transition))?)
    }

    /// Set `error_flag` and the recorded error, leaving status and stage.
    fn record_failure(
        &self,
        current: &RolloutRecord,
        command: Command,
        category: &str,
        resource: &str,
        message: String,
    ) -> RolloutResult<RecordedError> {
        let error = RecordedError {
            operation: command.as_str().to_string(),
            category: category.to_string(),
            resource: resource.to_string(),
            message,
            at: epoch_millis(),
        };

        let mut updated = current.clone();
        updated.error_flag = true;
        updated.last_error = Some(error.clone());
        updated.updated_at = error.at;

        if let CommitOutcome::Stale { .. } =
            self.state.commit_rollout(&updated, current.version, None)?
        {
            debug!(rollout = %current.id, "rollout moved on, failure not recorded");
        }
        Ok(error)
    }

    fn client(&self, family: StoreFamily) -> RolloutResult<Arc<dyn StoreClient>> {
        self.clients.get(family).ok_or(RolloutError::NoClient(family))
    }
}

fn skipped(record: &RolloutRecord, command: Command, reason: SkipReason) -> Outcome {
    debug!(
        rollout = %record.id,
        operation = %command,
        status = %record.status,
        %reason,
        "operation skipped"
    );
    Outcome::Skipped(reason)
}

fn target(record: &RolloutRecord) -> StoreTarget {
    StoreTarget {
        app_id: record.account_scope.clone(),
        channel: record.channel_id.clone(),
        version_name: record.build.version_name.clone(),
        build_number: record.build.build_number.clone(),
    }
}
