//! The release that owns a rollout.

use rollgate_state::RolloutRecord;

/// Lifecycle collaborator notified of rollout transitions.
///
/// Notifications are fire-and-forget: nothing is returned and a slow or
/// failing parent must not block the rollout, so implementations should
/// hand work off rather than do it inline.
pub trait ParentRelease: Send + Sync {
    /// Whether the parent currently allows rollout operations. When false,
    /// operations no-op instead of failing.
    fn is_actionable(&self, rollout: &RolloutRecord) -> bool;

    /// The rollout is about to expose the build for the first time.
    fn rollout_started(&self, rollout: &RolloutRecord);

    /// The build is fully released.
    fn rollout_complete(&self, rollout: &RolloutRecord);
}

/// A parent that always allows operations and ignores notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedParent;

impl ParentRelease for DetachedParent {
    fn is_actionable(&self, _rollout: &RolloutRecord) -> bool {
        true
    }

    fn rollout_started(&self, _rollout: &RolloutRecord) {}

    fn rollout_complete(&self, _rollout: &RolloutRecord) {}
}
