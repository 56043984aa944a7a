//! Halt worker: executes halt signals from health evaluation.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use rollgate_health::HaltSignal;
use rollgate_state::{HealthStatus, RolloutStatus};

use crate::controller::{LockMode, Outcome, RolloutController, LOCK_CONTENTION};
use crate::error::RolloutResult;
use crate::machine::SkipReason;

/// Consumes [`HaltSignal`]s and halts the affected rollouts.
///
/// A halt that loses the account-scope lock, or finds the rollout moved
/// under it, is tried again after `retry_delay`, up to `attempts` times.
pub struct HaltWorker {
    controller: RolloutController,
    signals: mpsc::UnboundedReceiver<HaltSignal>,
    attempts: u32,
    retry_delay: Duration,
}

impl HaltWorker {
    pub fn new(
        controller: RolloutController,
        signals: mpsc::UnboundedReceiver<HaltSignal>,
    ) -> Self {
        Self {
            controller,
            signals,
            attempts: 5,
            retry_delay: Duration::from_secs(2),
        }
    }

    pub fn with_retry(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Process signals until every sender is gone.
    pub async fn run(mut self) {
        info!("halt worker starting");
        while let Some(signal) = self.signals.recv().await {
            if let Err(e) = self.handle(&signal).await {
                error!(
                    release = %signal.release_id,
                    event = %signal.event_id,
                    error = %e,
                    "halt failed"
                );
            }
        }
        debug!("halt worker stopped, all senders dropped");
    }

    /// Halt the started rollouts of the signalled release.
    ///
    /// The event is re-read first: only an unhealthy event from a halting
    /// rule halts anything.
    pub async fn handle(&self, signal: &HaltSignal) -> RolloutResult<Vec<Outcome>> {
        let event = self
            .controller
            .state()
            .get_health_event(&signal.release_id, &signal.event_id)?;
        let Some(event) = event else {
            warn!(
                release = %signal.release_id,
                event = %signal.event_id,
                "halt signal for unknown event"
            );
            return Ok(Vec::new());
        };
        if event.status != HealthStatus::Unhealthy || !event.is_halting {
            debug!(
                release = %signal.release_id,
                event = %event.id,
                "event does not call for a halt"
            );
            return Ok(Vec::new());
        }

        let mut outcomes = Vec::new();
        for rollout in self.controller.rollouts_for_release(&signal.release_id)? {
            if rollout.status != RolloutStatus::Started {
                continue;
            }
            let outcome = self.halt_with_retry(&rollout.id).await?;
            if outcome.is_applied() {
                info!(
                    rollout = %rollout.id,
                    release = %signal.release_id,
                    event = %event.id,
                    "rollout halted by health rule"
                );
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn halt_with_retry(&self, id: &str) -> RolloutResult<Outcome> {
        let mut attempt = 1;
        loop {
            let outcome = self.controller.halt(id, LockMode::Lenient).await?;
            if !should_retry(&outcome) || attempt >= self.attempts {
                return Ok(outcome);
            }
            warn!(rollout = %id, attempt, ?outcome, "halt did not land, retrying");
            attempt += 1;
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

fn should_retry(outcome: &Outcome) -> bool {
    match outcome {
        Outcome::Failed(error) => error.category == LOCK_CONTENTION,
        Outcome::Skipped(SkipReason::Stale) => true,
        _ => false,
    }
}
