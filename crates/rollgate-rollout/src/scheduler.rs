//! Automatic rollout scheduler.
//!
//! On every tick the scheduler looks at started, automatic rollouts:
//! staged-percentage ones advance once `next_automatic_update_at` is due,
//! phased-release ones are refreshed because the store drives their
//! progression. All operations run in lenient lock mode; a busy store is
//! simply retried on a later tick.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use rollgate_core::config::{ConfigError, SchedulerSettings};
use rollgate_state::{epoch_millis, RolloutRecord, RolloutStatus, StoreFamily};

use crate::controller::{LockMode, Outcome, RolloutController};
use crate::error::RolloutResult;

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Rollouts the tick acted on.
    pub considered: usize,
    pub applied: usize,
    pub skipped: usize,
    /// Failures recorded on rollouts, plus errors that aborted an operation.
    pub failed: usize,
}

pub struct RolloutScheduler {
    controller: RolloutController,
    tick_interval: Duration,
}

impl RolloutScheduler {
    pub fn new(controller: RolloutController, tick_interval: Duration) -> Self {
        Self {
            controller,
            tick_interval,
        }
    }

    pub fn from_settings(
        controller: RolloutController,
        settings: &SchedulerSettings,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(controller, settings.tick_interval()?))
    }

    /// Run one pass as of `now` (unix millis).
    pub async fn tick_at(&self, now: u64) -> RolloutResult<TickReport> {
        let mut report = TickReport::default();

        for rollout in self.controller.state().list_rollouts()? {
            let Some(action) = due(&rollout, now) else {
                continue;
            };
            report.considered += 1;

            let result = match action {
                Action::Advance => self.controller.advance(&rollout.id, LockMode::Lenient).await,
                Action::Refresh => self.controller.refresh(&rollout.id).await,
            };
            match result {
                Ok(Outcome::Applied(record)) => {
                    report.applied += 1;
                    debug!(
                        rollout = %record.id,
                        status = %record.status,
                        stage = ?record.current_stage,
                        "scheduled step applied"
                    );
                }
                Ok(Outcome::Skipped(reason)) => {
                    report.skipped += 1;
                    debug!(rollout = %rollout.id, %reason, "scheduled step skipped");
                }
                Ok(Outcome::Failed(_)) => report.failed += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(rollout = %rollout.id, error = %e, "scheduled step errored");
                }
            }
        }

        Ok(report)
    }

    /// Tick until `shutdown` flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.tick_interval, "rollout scheduler starting");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.tick_interval) => {
                    match self.tick_at(epoch_millis()).await {
                        Ok(report) if report.considered > 0 => {
                            info!(
                                applied = report.applied,
                                skipped = report.skipped,
                                failed = report.failed,
                                "scheduler tick"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "scheduler tick failed"),
                    }
                }
                _ = shutdown.changed() => {
                    debug!("rollout scheduler shutting down");
                    break;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Advance,
    Refresh,
}

fn due(rollout: &RolloutRecord, now: u64) -> Option<Action> {
    if !rollout.automatic_rollout || rollout.status != RolloutStatus::Started {
        return None;
    }
    match rollout.store_family {
        StoreFamily::PhasedRelease => Some(Action::Refresh),
        StoreFamily::StagedPercentage => rollout
            .next_automatic_update_at
            .is_some_and(|at| at <= now)
            .then_some(Action::Advance),
    }
}
