//! Staged-percentage store family.
//!
//! Every mutation follows the publishing-edit protocol: open an edit,
//! replace the track's release for the build, commit. A failed edit is
//! discarded so it does not block the next caller with an "edit already
//! open" conflict. Raw API failures are classified into
//! [`ErrorCategory`] by HTTP status and message.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{StoreClient, StoreTarget, TrackState, TrackStatus};
use crate::error::{ErrorCategory, StoreError, StoreResult};

/// Error as returned by the publishing API.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayApiError {
    pub status: u16,
    pub message: String,
}

impl PlayApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayReleaseStatus {
    Draft,
    InProgress,
    Halted,
    Completed,
}

/// A release entry on a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayTrackRelease {
    pub name: String,
    pub version_codes: Vec<String>,
    pub status: PlayReleaseStatus,
    /// Fraction of users (0.0–1.0) for in-progress and halted releases.
    pub user_fraction: Option<f64>,
}

/// Raw publishing API. Authentication and payload encoding live behind
/// this trait.
#[async_trait]
pub trait PlayPublishingApi: Send + Sync {
    /// Open an edit; returns the edit id.
    async fn insert_edit(&self, package: &str) -> Result<String, PlayApiError>;

    async fn update_track(
        &self,
        package: &str,
        edit_id: &str,
        track: &str,
        release: &PlayTrackRelease,
    ) -> Result<(), PlayApiError>;

    async fn commit_edit(
        &self,
        package: &str,
        edit_id: &str,
        changes_not_sent_for_review: bool,
    ) -> Result<(), PlayApiError>;

    async fn delete_edit(&self, package: &str, edit_id: &str) -> Result<(), PlayApiError>;

    async fn get_track(
        &self,
        package: &str,
        track: &str,
    ) -> Result<Vec<PlayTrackRelease>, PlayApiError>;
}

static DUPLICATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)version code \d+ has already been used|apkUpgradeVersionConflict")
        .expect("valid regex")
});

static REVIEW_BLOCKED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)changes cannot be sent for review automatically|changesNotSentForReview")
        .expect("valid regex")
});

static TRANSIENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)edit is already open|another edit|edit has been deleted|backendError|rateLimitExceeded|try again later",
    )
    .expect("valid regex")
});

static PERMISSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)does not have permission|permissionDenied").expect("valid regex")
});

/// Map a raw API error onto a store error category.
pub fn classify(err: &PlayApiError) -> ErrorCategory {
    if DUPLICATE.is_match(&err.message) {
        ErrorCategory::Duplicate
    } else if REVIEW_BLOCKED.is_match(&err.message) {
        ErrorCategory::ReviewBlocked
    } else if TRANSIENT.is_match(&err.message) {
        ErrorCategory::Transient
    } else if PERMISSION.is_match(&err.message) {
        ErrorCategory::Permission
    } else {
        match err.status {
            401 | 403 => ErrorCategory::Permission,
            404 => ErrorCategory::NotFound,
            409 | 429 | 500..=599 => ErrorCategory::Transient,
            _ => ErrorCategory::Precondition,
        }
    }
}

/// Store client for the staged-percentage family.
pub struct PlayStoreClient<A> {
    api: A,
}

impl<A: PlayPublishingApi> PlayStoreClient<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    fn store_error(target: &StoreTarget, err: PlayApiError) -> StoreError {
        StoreError::new(classify(&err), target.resource(), err.message)
    }

    fn release(
        target: &StoreTarget,
        status: PlayReleaseStatus,
        user_fraction: Option<f64>,
    ) -> PlayTrackRelease {
        PlayTrackRelease {
            name: target.version_name.clone(),
            version_codes: vec![target.build_number.clone()],
            status,
            user_fraction,
        }
    }

    /// Apply `release` to the target track inside one edit.
    async fn apply(
        &self,
        target: &StoreTarget,
        release: PlayTrackRelease,
        skip_review: bool,
    ) -> StoreResult<()> {
        let package = target.app_id.as_str();
        let edit_id = self
            .api
            .insert_edit(package)
            .await
            .map_err(|e| Self::store_error(target, e))?;

        let result = match self
            .api
            .update_track(package, &edit_id, &target.channel, &release)
            .await
        {
            Ok(()) => self.api.commit_edit(package, &edit_id, skip_review).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(
                    resource = %target.resource(),
                    status = ?release.status,
                    fraction = ?release.user_fraction,
                    skip_review,
                    "track release committed"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = self.api.delete_edit(package, &edit_id).await {
                    debug!(%edit_id, error = %cleanup.message, "failed to discard edit");
                }
                warn!(
                    resource = %target.resource(),
                    status = e.status,
                    error = %e.message,
                    "track update failed"
                );
                Err(Self::store_error(target, e))
            }
        }
    }

    async fn find_release(&self, target: &StoreTarget) -> StoreResult<Option<PlayTrackRelease>> {
        let releases = self
            .api
            .get_track(&target.app_id, &target.channel)
            .await
            .map_err(|e| Self::store_error(target, e))?;
        Ok(releases
            .into_iter()
            .find(|r| r.version_codes.iter().any(|c| c == &target.build_number)))
    }
}

fn check_percentage(target: &StoreTarget, percentage: f64) -> StoreResult<()> {
    if percentage > 0.0 && percentage <= 100.0 {
        Ok(())
    } else {
        Err(StoreError::new(
            ErrorCategory::Precondition,
            target.resource(),
            format!("rollout percentage {percentage} is outside (0, 100]"),
        ))
    }
}

#[async_trait]
impl<A: PlayPublishingApi> StoreClient for PlayStoreClient<A> {
    async fn create_draft(&self, target: &StoreTarget, skip_review: bool) -> StoreResult<()> {
        let release = Self::release(target, PlayReleaseStatus::Draft, None);
        self.apply(target, release, skip_review).await
    }

    async fn rollout(
        &self,
        target: &StoreTarget,
        percentage: f64,
        skip_review: bool,
    ) -> StoreResult<()> {
        check_percentage(target, percentage)?;
        let release = if percentage >= 100.0 {
            Self::release(target, PlayReleaseStatus::Completed, None)
        } else {
            Self::release(target, PlayReleaseStatus::InProgress, Some(percentage / 100.0))
        };
        self.apply(target, release, skip_review).await
    }

    async fn halt(&self, target: &StoreTarget, skip_review: bool) -> StoreResult<()> {
        let current = self.find_release(target).await?.ok_or_else(|| {
            StoreError::new(ErrorCategory::NotFound, target.resource(), "build is not on the track")
        })?;
        let release = Self::release(target, PlayReleaseStatus::Halted, current.user_fraction);
        self.apply(target, release, skip_review).await
    }

    async fn pause(&self, target: &StoreTarget, _skip_review: bool) -> StoreResult<()> {
        Err(StoreError::unsupported(target.resource(), "pause"))
    }

    async fn resume(
        &self,
        target: &StoreTarget,
        percentage: f64,
        skip_review: bool,
    ) -> StoreResult<()> {
        self.rollout(target, percentage, skip_review).await
    }

    async fn release_fully(&self, target: &StoreTarget, skip_review: bool) -> StoreResult<()> {
        let release = Self::release(target, PlayReleaseStatus::Completed, None);
        self.apply(target, release, skip_review).await
    }

    async fn query_track(&self, target: &StoreTarget) -> StoreResult<TrackStatus> {
        let Some(release) = self.find_release(target).await? else {
            return Ok(TrackStatus {
                state: TrackState::Absent,
                percentage: None,
            });
        };
        let status = match release.status {
            PlayReleaseStatus::Draft => TrackStatus {
                state: TrackState::Draft,
                percentage: None,
            },
            PlayReleaseStatus::InProgress => TrackStatus {
                state: TrackState::InProgress,
                percentage: release.user_fraction.map(|f| f * 100.0),
            },
            PlayReleaseStatus::Halted => TrackStatus {
                state: TrackState::Halted,
                percentage: release.user_fraction.map(|f| f * 100.0),
            },
            PlayReleaseStatus::Completed => TrackStatus {
                state: TrackState::Completed,
                percentage: Some(100.0),
            },
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records every API call; `commit_edit` fails with queued errors first.
    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<String>>,
        updates: Mutex<Vec<PlayTrackRelease>>,
        commit_errors: Mutex<VecDeque<PlayApiError>>,
        track: Mutex<Vec<PlayTrackRelease>>,
    }

    #[async_trait]
    impl PlayPublishingApi for FakeApi {
        async fn insert_edit(&self, _package: &str) -> Result<String, PlayApiError> {
            self.calls.lock().unwrap().push("insert_edit".into());
            Ok("edit-1".to_string())
        }

        async fn update_track(
            &self,
            _package: &str,
            _edit_id: &str,
            _track: &str,
            release: &PlayTrackRelease,
        ) -> Result<(), PlayApiError> {
            self.calls.lock().unwrap().push("update_track".into());
            self.updates.lock().unwrap().push(release.clone());
            Ok(())
        }

        async fn commit_edit(
            &self,
            _package: &str,
            _edit_id: &str,
            changes_not_sent_for_review: bool,
        ) -> Result<(), PlayApiError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("commit_edit(skip_review={changes_not_sent_for_review})"));
            match self.commit_errors.lock().unwrap().pop_front() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        async fn delete_edit(&self, _package: &str, _edit_id: &str) -> Result<(), PlayApiError> {
            self.calls.lock().unwrap().push("delete_edit".into());
            Ok(())
        }

        async fn get_track(
            &self,
            _package: &str,
            _track: &str,
        ) -> Result<Vec<PlayTrackRelease>, PlayApiError> {
            Ok(self.track.lock().unwrap().clone())
        }
    }

    fn target() -> StoreTarget {
        StoreTarget {
            app_id: "com.example.app".to_string(),
            channel: "production".to_string(),
            version_name: "1.2.0".to_string(),
            build_number: "120".to_string(),
        }
    }

    #[test]
    fn classify_by_message_then_status() {
        let cases = [
            (
                PlayApiError::new(403, "Version code 120 has already been used."),
                ErrorCategory::Duplicate,
            ),
            (
                PlayApiError::new(400, "Changes cannot be sent for review automatically."),
                ErrorCategory::ReviewBlocked,
            ),
            (
                PlayApiError::new(400, "An edit is already open for this app"),
                ErrorCategory::Transient,
            ),
            (
                PlayApiError::new(400, "The caller does not have permission"),
                ErrorCategory::Permission,
            ),
            (PlayApiError::new(401, "unauthorized"), ErrorCategory::Permission),
            (PlayApiError::new(404, "Package not found: com.x"), ErrorCategory::NotFound),
            (PlayApiError::new(503, "unavailable"), ErrorCategory::Transient),
            (PlayApiError::new(400, "Release notes are missing"), ErrorCategory::Precondition),
        ];
        for (err, expected) in cases {
            assert_eq!(classify(&err), expected, "{}", err.message);
        }
    }

    #[tokio::test]
    async fn staged_rollout_sets_user_fraction() {
        let client = PlayStoreClient::new(FakeApi::default());
        client.rollout(&target(), 20.0, false).await.unwrap();

        let updates = client.api.updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].status, PlayReleaseStatus::InProgress);
        assert_eq!(updates[0].user_fraction, Some(0.2));
        assert_eq!(updates[0].version_codes, vec!["120".to_string()]);
    }

    #[tokio::test]
    async fn full_percentage_completes_release() {
        let client = PlayStoreClient::new(FakeApi::default());
        client.rollout(&target(), 100.0, false).await.unwrap();

        let updates = client.api.updates.lock().unwrap().clone();
        assert_eq!(updates[0].status, PlayReleaseStatus::Completed);
        assert_eq!(updates[0].user_fraction, None);
    }

    #[tokio::test]
    async fn out_of_range_percentage_is_rejected_without_api_calls() {
        let client = PlayStoreClient::new(FakeApi::default());
        let err = client.rollout(&target(), 0.0, false).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Precondition);
        assert!(client.api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_commit_discards_edit_and_classifies() {
        let api = FakeApi::default();
        api.commit_errors
            .lock()
            .unwrap()
            .push_back(PlayApiError::new(400, "Changes cannot be sent for review automatically"));
        let client = PlayStoreClient::new(api);

        let err = client.rollout(&target(), 5.0, false).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::ReviewBlocked);
        assert_eq!(err.resource, "com.example.app/production@120");
        let calls = client.api.calls.lock().unwrap().clone();
        assert_eq!(calls.last().map(String::as_str), Some("delete_edit"));
    }

    #[tokio::test]
    async fn skip_review_flag_reaches_commit() {
        let client = PlayStoreClient::new(FakeApi::default());
        client.release_fully(&target(), true).await.unwrap();
        let calls = client.api.calls.lock().unwrap().clone();
        assert!(calls.contains(&"commit_edit(skip_review=true)".to_string()));
    }

    #[tokio::test]
    async fn halt_keeps_current_fraction() {
        let api = FakeApi::default();
        api.track.lock().unwrap().push(PlayTrackRelease {
            name: "1.2.0".to_string(),
            version_codes: vec!["120".to_string()],
            status: PlayReleaseStatus::InProgress,
            user_fraction: Some(0.5),
        });
        let client = PlayStoreClient::new(api);

        client.halt(&target(), false).await.unwrap();
        let updates = client.api.updates.lock().unwrap().clone();
        assert_eq!(updates[0].status, PlayReleaseStatus::Halted);
        assert_eq!(updates[0].user_fraction, Some(0.5));
    }

    #[tokio::test]
    async fn halt_without_release_is_not_found() {
        let client = PlayStoreClient::new(FakeApi::default());
        let err = client.halt(&target(), false).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn pause_is_unsupported() {
        let client = PlayStoreClient::new(FakeApi::default());
        let err = client.pause(&target(), false).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Precondition);
    }

    #[tokio::test]
    async fn query_track_reports_percentage() {
        let api = FakeApi::default();
        api.track.lock().unwrap().push(PlayTrackRelease {
            name: "1.2.0".to_string(),
            version_codes: vec!["120".to_string()],
            status: PlayReleaseStatus::InProgress,
            user_fraction: Some(0.25),
        });
        let client = PlayStoreClient::new(api);

        let status = client.query_track(&target()).await.unwrap();
        assert_eq!(status.state, TrackState::InProgress);
        assert_eq!(status.percentage, Some(25.0));

        let mut other = target();
        other.build_number = "999".to_string();
        assert_eq!(client.query_track(&other).await.unwrap().state, TrackState::Absent);
    }

    #[test]
    fn track_release_serializes_camel_case() {
        let json = serde_json::to_string(&PlayTrackRelease {
            name: "1.0".to_string(),
            version_codes: vec!["1".to_string()],
            status: PlayReleaseStatus::InProgress,
            user_fraction: Some(0.1),
        })
        .unwrap();
        assert!(json.contains("\"versionCodes\""));
        assert!(json.contains("\"inProgress\""));
        assert!(json.contains("\"userFraction\""));
    }
}
