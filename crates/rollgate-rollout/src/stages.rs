//! Stage arithmetic over a rollout's `stage_config`.

use rollgate_state::RolloutRecord;

/// Full exposure.
pub const FULL_ROLLOUT: f64 = 100.0;

/// Derived stage queries.
pub trait StageProgress {
    /// True when the config is empty or the current stage is the last one.
    fn reached_last_stage(&self) -> bool;

    /// Percentage of the stage after the current one; `None` exactly when
    /// [`reached_last_stage`](Self::reached_last_stage) is true.
    fn next_rollout_percentage(&self) -> Option<f64>;

    /// Percentage the store should be at right now: the current stage, the
    /// first stage before any stage ran, or 100 for unstaged rollouts.
    fn last_rollout_percentage(&self) -> f64;
}

impl StageProgress for RolloutRecord {
    fn reached_last_stage(&self) -> bool {
        let len = self.stage_config.len();
        len == 0 || self.current_stage.is_some_and(|idx| idx + 1 >= len)
    }

    fn next_rollout_percentage(&self) -> Option<f64> {
        if self.reached_last_stage() {
            return None;
        }
        let next = self.current_stage.map_or(0, |idx| idx + 1);
        self.stage_config.get(next).copied()
    }

    fn last_rollout_percentage(&self) -> f64 {
        if !self.is_staged {
            return FULL_ROLLOUT;
        }
        self.current_stage
            .and_then(|idx| self.stage_config.get(idx))
            .or_else(|| self.stage_config.first())
            .copied()
            .unwrap_or(FULL_ROLLOUT)
    }
}

/// Reject stage percentages outside `(0, 100]`.
pub fn validate_stages(stages: &[f64]) -> Result<(), String> {
    match stages.iter().find(|p| !(**p > 0.0 && **p <= FULL_ROLLOUT)) {
        Some(bad) => Err(format!("stage percentage {bad} is outside (0, 100]")),
        None => Ok(()),
    }
}
