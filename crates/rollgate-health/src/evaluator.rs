//! Health evaluator: rules × metric snapshot → events and halt signals.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use rollgate_state::{
    epoch_millis, HealthEvent, HealthMetric, HealthRule, HealthStatus, RuleExpression, StateStore,
};

use crate::error::{HealthError, HealthResult};
use crate::rule::{rule_is_healthy, validate_rule};
use crate::HaltSignal;

/// Input for [`HealthEvaluator::create_rule`].
#[derive(Debug, Clone)]
pub struct RuleDraft {
    pub platform_id: String,
    pub name: String,
    pub is_halting: bool,
    pub expressions: Vec<RuleExpression>,
}

/// Evaluates release health and requests halts.
///
/// Evaluation only writes events and enqueues [`HaltSignal`]s; it never
/// touches a store, so it is safe to run from any number of triggers.
#[derive(Clone)]
pub struct HealthEvaluator {
    state: StateStore,
    halt_tx: mpsc::UnboundedSender<HaltSignal>,
}

impl HealthEvaluator {
    pub fn new(state: StateStore, halt_tx: mpsc::UnboundedSender<HaltSignal>) -> Self {
        Self { state, halt_tx }
    }

    /// Record an already-populated snapshot and evaluate it.
    ///
    /// Snapshots are immutable: re-ingesting an id evaluates the stored copy.
    pub fn ingest(&self, metric: HealthMetric) -> HealthResult<Vec<HealthEvent>> {
        if !self.state.insert_health_metric(&metric)? {
            debug!(release = %metric.release_id, metric = %metric.id, "metric already recorded");
        }
        let stored = self
            .state
            .get_health_metric(&metric.release_id, &metric.id)?
            .unwrap_or(metric);
        self.check(&stored)
    }

    /// Evaluate every live rule of the metric's platform.
    ///
    /// Returns the events created by this call. A (release, rule, metric)
    /// triple that already has an event is skipped, so repeated checks are
    /// no-ops.
    pub fn check(&self, metric: &HealthMetric) -> HealthResult<Vec<HealthEvent>> {
        let rules = self.state.list_health_rules(&metric.platform_id, false)?;
        let mut created = Vec::new();

        for rule in rules {
            if self
                .state
                .get_health_event_for(&metric.release_id, &rule.id, &metric.id)?
                .is_some()
            {
                debug!(
                    release = %metric.release_id,
                    rule = %rule.id,
                    metric = %metric.id,
                    "already evaluated"
                );
                continue;
            }

            let status = if rule_is_healthy(&rule, metric) {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            };
            let event = HealthEvent {
                id: uuid::Uuid::new_v4().to_string(),
                release_id: metric.release_id.clone(),
                rule_id: rule.id.clone(),
                metric_id: metric.id.clone(),
                status,
                is_halting: rule.is_halting,
                event_at: epoch_millis(),
            };

            // Lost a race with a concurrent check.
            if !self.state.insert_health_event(&event)? {
                continue;
            }

            if status == HealthStatus::Unhealthy {
                warn!(
                    release = %event.release_id,
                    rule = %rule.name,
                    halting = rule.is_halting,
                    "release health rule tripped"
                );
                if rule.is_halting {
                    self.request_halt(&event);
                }
            }
            created.push(event);
        }

        Ok(created)
    }

    fn request_halt(&self, event: &HealthEvent) {
        let signal = HaltSignal {
            release_id: event.release_id.clone(),
            event_id: event.id.clone(),
        };
        if self.halt_tx.send(signal).is_err() {
            warn!(
                release = %event.release_id,
                event = %event.id,
                "halt receiver gone, signal dropped"
            );
        }
    }

    /// Validate and store a new rule.
    pub fn create_rule(&self, draft: RuleDraft) -> HealthResult<HealthRule> {
        let rule = HealthRule {
            id: uuid::Uuid::new_v4().to_string(),
            platform_id: draft.platform_id,
            name: draft.name,
            is_halting: draft.is_halting,
            expressions: draft.expressions,
            discarded_at: None,
            created_at: epoch_millis(),
        };
        validate_rule(&rule)?;
        self.state.put_health_rule(&rule)?;
        info!(
            platform = %rule.platform_id,
            rule = %rule.name,
            halting = rule.is_halting,
            "health rule created"
        );
        Ok(rule)
    }

    /// Soft-delete a rule. Its past events are kept.
    pub fn discard_rule(&self, platform_id: &str, rule_id: &str) -> HealthResult<HealthRule> {
        let mut rule = self
            .state
            .get_health_rule(platform_id, rule_id)?
            .ok_or_else(|| HealthError::NotFound(format!("rule {platform_id}/{rule_id}")))?;
        if rule.discarded_at.is_none() {
            rule.discarded_at = Some(epoch_millis());
            self.state.put_health_rule(&rule)?;
            info!(platform = %platform_id, rule = %rule.name, "health rule discarded");
        }
        Ok(rule)
    }

    /// Live rules of a platform.
    pub fn list_rules(&self, platform_id: &str) -> HealthResult<Vec<HealthRule>> {
        Ok(self.state.list_health_rules(platform_id, false)?)
    }

    pub fn events_for_release(&self, release_id: &str) -> HealthResult<Vec<HealthEvent>> {
        Ok(self.state.list_health_events_for_release(release_id)?)
    }
}
