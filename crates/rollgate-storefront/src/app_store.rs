//! Phased-release store family.
//!
//! The store runs a fixed seven-day phased release and moves the exposure
//! forward on its own, one phase per day. Rollgate only starts, pauses,
//! resumes, halts, or completes it; intermediate percentages requested by
//! the rollout are satisfied as long as the phased release is running.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{StoreClient, StoreTarget, TrackState, TrackStatus};
use crate::error::{ErrorCategory, StoreError, StoreResult};

/// Exposure percentage for each day of the phased release.
pub const PHASED_SCHEDULE: [f64; 7] = [1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0];

/// Percentage exposed on `day` (1-based) of a phased release.
pub fn percentage_for_day(day: u32) -> f64 {
    match day {
        0 => 0.0,
        d => PHASED_SCHEDULE[(d as usize - 1).min(PHASED_SCHEDULE.len() - 1)],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppStoreApiError {
    pub status: u16,
    /// Machine-readable error code, e.g. `STATE_ERROR`.
    pub code: String,
    pub message: String,
}

impl AppStoreApiError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhasedReleaseState {
    Inactive,
    Active,
    Paused,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasedRelease {
    pub state: PhasedReleaseState,
    pub current_day_number: u32,
}

/// Raw store API. Authentication and payload encoding live behind this trait.
#[async_trait]
pub trait AppStoreConnectApi: Send + Sync {
    /// Attach the build to an unreleased version.
    async fn prepare_version(&self, app_id: &str, version_name: &str, build_number: &str)
    -> Result<(), AppStoreApiError>;

    /// Release the version, optionally as a phased release.
    async fn start_release(
        &self,
        app_id: &str,
        version_name: &str,
        phased: bool,
    ) -> Result<(), AppStoreApiError>;

    async fn phased_release(&self, app_id: &str, version_name: &str)
    -> Result<Option<PhasedRelease>, AppStoreApiError>;

    async fn update_phased_release(
        &self,
        app_id: &str,
        version_name: &str,
        state: PhasedReleaseState,
    ) -> Result<(), AppStoreApiError>;

    /// Stop distributing the version.
    async fn halt_release(&self, app_id: &str, version_name: &str) -> Result<(), AppStoreApiError>;
}

static DUPLICATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)already (been )?(released|completed|in (this|the requested) state)")
        .expect("valid regex")
});

static REVIEW_BLOCKED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(waiting for|pending|requires?) (app )?review").expect("valid regex")
});

static TRANSIENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)another (request|operation) is in progress|try again").expect("valid regex")
});

/// Map a raw API error onto a store error category.
pub fn classify(err: &AppStoreApiError) -> ErrorCategory {
    if DUPLICATE.is_match(&err.message) {
        ErrorCategory::Duplicate
    } else if err.code.contains("REVIEW") || REVIEW_BLOCKED.is_match(&err.message) {
        ErrorCategory::ReviewBlocked
    } else if TRANSIENT.is_match(&err.message) {
        ErrorCategory::Transient
    } else {
        match err.status {
            401 | 403 => ErrorCategory::Permission,
            404 => ErrorCategory::NotFound,
            429 | 500..=599 => ErrorCategory::Transient,
            _ => ErrorCategory::Precondition,
        }
    }
}

/// Store client for the phased-release family.
pub struct AppStoreClient<A> {
    api: A,
}

impl<A: AppStoreConnectApi> AppStoreClient<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    fn store_error(target: &StoreTarget, err: AppStoreApiError) -> StoreError {
        StoreError::new(classify(&err), target.resource(), err.message)
    }

    async fn current(&self, target: &StoreTarget) -> StoreResult<Option<PhasedRelease>> {
        self.api
            .phased_release(&target.app_id, &target.version_name)
            .await
            .map_err(|e| Self::store_error(target, e))
    }

    async fn set_state(&self, target: &StoreTarget, state: PhasedReleaseState) -> StoreResult<()> {
        self.api
            .update_phased_release(&target.app_id, &target.version_name, state)
            .await
            .map_err(|e| Self::store_error(target, e))?;
        debug!(resource = %target.resource(), ?state, "phased release updated");
        Ok(())
    }

    async fn start(&self, target: &StoreTarget, phased: bool) -> StoreResult<()> {
        self.api
            .start_release(&target.app_id, &target.version_name, phased)
            .await
            .map_err(|e| Self::store_error(target, e))?;
        info!(resource = %target.resource(), phased, "release started");
        Ok(())
    }
}

#[async_trait]
impl<A: AppStoreConnectApi> StoreClient for AppStoreClient<A> {
    async fn create_draft(&self, target: &StoreTarget, _skip_review: bool) -> StoreResult<()> {
        self.api
            .prepare_version(&target.app_id, &target.version_name, &target.build_number)
            .await
            .map_err(|e| Self::store_error(target, e))
    }

    async fn rollout(
        &self,
        target: &StoreTarget,
        percentage: f64,
        skip_review: bool,
    ) -> StoreResult<()> {
        if !(percentage > 0.0 && percentage <= 100.0) {
            return Err(StoreError::new(
                ErrorCategory::Precondition,
                target.resource(),
                format!("rollout percentage {percentage} is outside (0, 100]"),
            ));
        }
        if percentage >= 100.0 {
            return self.release_fully(target, skip_review).await;
        }

        match self.current(target).await? {
            None => self.start(target, true).await,
            Some(p) if p.state == PhasedReleaseState::Inactive => self.start(target, true).await,
            Some(p) if p.state == PhasedReleaseState::Paused => {
                self.set_state(target, PhasedReleaseState::Active).await
            }
            // Active or complete: the store drives the remaining phases.
            Some(_) => Ok(()),
        }
    }

    async fn halt(&self, target: &StoreTarget, _skip_review: bool) -> StoreResult<()> {
        self.api
            .halt_release(&target.app_id, &target.version_name)
            .await
            .map_err(|e| Self::store_error(target, e))
    }

    async fn pause(&self, target: &StoreTarget, _skip_review: bool) -> StoreResult<()> {
        self.set_state(target, PhasedReleaseState::Paused).await
    }

    async fn resume(
        &self,
        target: &StoreTarget,
        _percentage: f64,
        _skip_review: bool,
    ) -> StoreResult<()> {
        self.set_state(target, PhasedReleaseState::Active).await
    }

    async fn release_fully(&self, target: &StoreTarget, _skip_review: bool) -> StoreResult<()> {
        match self.current(target).await? {
            None => self.start(target, false).await,
            Some(p) if p.state == PhasedReleaseState::Complete => Ok(()),
            Some(_) => self.set_state(target, PhasedReleaseState::Complete).await,
        }
    }

    async fn query_track(&self, target: &StoreTarget) -> StoreResult<TrackStatus> {
        let status = match self.current(target).await? {
            None => TrackStatus {
                state: TrackState::Absent,
                percentage: None,
            },
            Some(p) => match p.state {
                PhasedReleaseState::Inactive => TrackStatus {
                    state: TrackState::Draft,
                    percentage: None,
                },
                PhasedReleaseState::Active => TrackStatus {
                    state: TrackState::InProgress,
                    percentage: Some(percentage_for_day(p.current_day_number)),
                },
                PhasedReleaseState::Paused => TrackStatus {
                    state: TrackState::Paused,
                    percentage: Some(percentage_for_day(p.current_day_number)),
                },
                PhasedReleaseState::Complete => TrackStatus {
                    state: TrackState::Completed,
                    percentage: Some(100.0),
                },
            },
        };
        Ok(status)
    }
}
