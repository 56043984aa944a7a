//! The capability set every store integration exposes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// What a store call operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreTarget {
    /// External account/app scope (package name, app id).
    pub app_id: String,
    /// Track or submission channel within the app.
    pub channel: String,
    pub version_name: String,
    pub build_number: String,
}

impl StoreTarget {
    /// Human-readable resource name used in errors and logs.
    pub fn resource(&self) -> String {
        format!("{}/{}@{}", self.app_id, self.channel, self.build_number)
    }
}

/// Release state as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    Draft,
    InProgress,
    Paused,
    Halted,
    Completed,
    /// The build is not on the track.
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackStatus {
    pub state: TrackState,
    /// Exposure percentage, when the store reports one.
    pub percentage: Option<f64>,
}

impl TrackStatus {
    pub fn is_complete(&self) -> bool {
        self.state == TrackState::Completed
    }
}

/// A store integration.
///
/// Mutating calls take `skip_review`: when set, the integration asks the
/// store to apply the change without sending it for review.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Prepare an unreleased draft of the build on the channel.
    async fn create_draft(&self, target: &StoreTarget, skip_review: bool) -> StoreResult<()>;

    /// Expose the build to `percentage` (0 < p <= 100) of users.
    async fn rollout(
        &self,
        target: &StoreTarget,
        percentage: f64,
        skip_review: bool,
    ) -> StoreResult<()>;

    async fn halt(&self, target: &StoreTarget, skip_review: bool) -> StoreResult<()>;

    async fn pause(&self, target: &StoreTarget, skip_review: bool) -> StoreResult<()>;

    /// Continue a paused or halted release at `percentage`.
    async fn resume(
        &self,
        target: &StoreTarget,
        percentage: f64,
        skip_review: bool,
    ) -> StoreResult<()>;

    /// Expose the build to every user.
    async fn release_fully(&self, target: &StoreTarget, skip_review: bool) -> StoreResult<()>;

    async fn query_track(&self, target: &StoreTarget) -> StoreResult<TrackStatus>;
}

/// One mutating store call, as data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum StoreCall {
    CreateDraft,
    Rollout { percentage: f64 },
    Halt,
    Pause,
    Resume { percentage: f64 },
    ReleaseFully,
}

impl StoreCall {
    /// Percentage the call sends to the store, if any.
    pub fn percentage(&self) -> Option<f64> {
        match self {
            Self::Rollout { percentage } | Self::Resume { percentage } => Some(*percentage),
            Self::ReleaseFully => Some(100.0),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateDraft => "create_draft",
            Self::Rollout { .. } => "rollout",
            Self::Halt => "halt",
            Self::Pause => "pause",
            Self::Resume { .. } => "resume",
            Self::ReleaseFully => "release_fully",
        }
    }

    /// Issue this call against `client`.
    pub async fn dispatch(
        &self,
        client: &dyn StoreClient,
        target: &StoreTarget,
        skip_review: bool,
    ) -> StoreResult<()> {
        match *self {
            Self::CreateDraft => client.create_draft(target, skip_review).await,
            Self::Rollout { percentage } => client.rollout(target, percentage, skip_review).await,
            Self::Halt => client.halt(target, skip_review).await,
            Self::Pause => client.pause(target, skip_review).await,
            Self::Resume { percentage } => client.resume(target, percentage, skip_review).await,
            Self::ReleaseFully => client.release_fully(target, skip_review).await,
        }
    }
}
