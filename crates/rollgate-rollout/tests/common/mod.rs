#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rollgate_guard::{DistributedLock, LockConfig, RetryPolicy, RetryShell};
use rollgate_rollout::{ClientRegistry, NewRollout, ParentRelease, RolloutController};
use rollgate_state::{BuildRef, RolloutRecord, StateStore, StoreFamily};
use rollgate_storefront::{
    ErrorCategory, StoreClient, StoreError, StoreResult, StoreTarget, TrackState, TrackStatus,
};

/// One call seen by the fake store.
#[derive(Debug, Clone, PartialEq)]
pub struct SeenCall {
    pub name: &'static str,
    pub percentage: Option<f64>,
    pub skip_review: bool,
}

/// Scripted store: records calls, fails with queued errors, then succeeds.
pub struct FakeStore {
    calls: Mutex<Vec<SeenCall>>,
    failures: Mutex<VecDeque<StoreError>>,
    track: Mutex<TrackStatus>,
    delay: Duration,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            track: Mutex::new(TrackStatus {
                state: TrackState::Draft,
                percentage: None,
            }),
            delay,
        }
    }

    pub fn fail_next(&self, category: ErrorCategory, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back(StoreError::new(
                category,
                "com.example.app/production",
                "scripted failure",
            ));
        }
    }

    pub fn set_track(&self, state: TrackState, percentage: Option<f64>) {
        *self.track.lock().unwrap() = TrackStatus { state, percentage };
    }

    pub fn calls(&self) -> Vec<SeenCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.calls().into_iter().map(|c| c.name).collect()
    }

    async fn mutate(
        &self,
        name: &'static str,
        percentage: Option<f64>,
        skip_review: bool,
    ) -> StoreResult<()> {
        self.calls.lock().unwrap().push(SeenCall {
            name,
            percentage,
            skip_review,
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StoreClient for FakeStore {
    async fn create_draft(&self, _target: &StoreTarget, skip_review: bool) -> StoreResult<()> {
        self.mutate("create_draft", None, skip_review).await
    }

    async fn rollout(
        &self,
        _target: &StoreTarget,
        percentage: f64,
        skip_review: bool,
    ) -> StoreResult<()> {
        self.mutate("rollout", Some(percentage), skip_review).await
    }

    async fn halt(&self, _target: &StoreTarget, skip_review: bool) -> StoreResult<()> {
        self.mutate("halt", None, skip_review).await
    }

    async fn pause(&self, _target: &StoreTarget, skip_review: bool) -> StoreResult<()> {
        self.mutate("pause", None, skip_review).await
    }

    async fn resume(
        &self,
        _target: &StoreTarget,
        percentage: f64,
        skip_review: bool,
    ) -> StoreResult<()> {
        self.mutate("resume", Some(percentage), skip_review).await
    }

    async fn release_fully(&self, _target: &StoreTarget, skip_review: bool) -> StoreResult<()> {
        self.mutate("release_fully", Some(100.0), skip_review).await
    }

    async fn query_track(&self, _target: &StoreTarget) -> StoreResult<TrackStatus> {
        Ok(self.track.lock().unwrap().clone())
    }
}

/// Parent that records notifications and can be made non-actionable.
pub struct RecordingParent {
    actionable: AtomicBool,
    started: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
}

impl RecordingParent {
    pub fn new() -> Self {
        Self {
            actionable: AtomicBool::new(true),
            started: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_actionable(&self, actionable: bool) {
        self.actionable.store(actionable, Ordering::SeqCst);
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

impl ParentRelease for RecordingParent {
    fn is_actionable(&self, _rollout: &RolloutRecord) -> bool {
        self.actionable.load(Ordering::SeqCst)
    }

    fn rollout_started(&self, rollout: &RolloutRecord) {
        self.started.lock().unwrap().push(rollout.id.clone());
    }

    fn rollout_complete(&self, rollout: &RolloutRecord) {
        self.completed.lock().unwrap().push(rollout.id.clone());
    }
}

pub struct Harness {
    pub state: StateStore,
    pub store: Arc<FakeStore>,
    pub phased: Arc<FakeStore>,
    pub parent: Arc<RecordingParent>,
    pub lock: DistributedLock,
    pub controller: RolloutController,
}

pub fn harness() -> Harness {
    harness_with(FakeStore::new(), 3)
}

/// Harness with a custom staged-percentage store and lock attempt count.
pub fn harness_with(store: FakeStore, lock_attempts: u32) -> Harness {
    let state = StateStore::open_in_memory().unwrap();
    let store = Arc::new(store);
    let phased = Arc::new(FakeStore::new());
    let parent = Arc::new(RecordingParent::new());

    let lock = DistributedLock::new(
        Arc::new(state.clone()),
        LockConfig {
            attempts: lock_attempts,
            retry_delay: Duration::from_millis(10),
            ttl: Duration::from_secs(60),
        },
    );
    let shell = RetryShell::new(
        lock.clone(),
        RetryPolicy {
            retry_delay: Duration::ZERO,
            ..RetryPolicy::default()
        },
    );
    let clients = ClientRegistry::new()
        .with(StoreFamily::StagedPercentage, store.clone())
        .with(StoreFamily::PhasedRelease, phased.clone());
    let controller = RolloutController::new(state.clone(), clients, shell, parent.clone());

    Harness {
        state,
        store,
        phased,
        parent,
        lock,
        controller,
    }
}

pub fn new_rollout(stages: &[f64]) -> NewRollout {
    NewRollout {
        release_id: "rel-1".to_string(),
        run_id: "run-1".to_string(),
        channel_id: "production".to_string(),
        store_family: StoreFamily::StagedPercentage,
        account_scope: "com.example.app".to_string(),
        build: BuildRef {
            version_name: "1.2.0".to_string(),
            build_number: "120".to_string(),
        },
        stage_config: stages.to_vec(),
        is_staged: true,
        automatic_rollout: false,
    }
}
