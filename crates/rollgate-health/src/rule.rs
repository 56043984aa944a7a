//! Rule validation and the healthy/unhealthy decision.

use std::collections::HashSet;

use rollgate_state::{HealthMetric, HealthRule};

use crate::error::RuleError;
use crate::expression::is_satisfied;

/// Check a rule's shape before it is stored.
pub fn validate_rule(rule: &HealthRule) -> Result<(), RuleError> {
    if rule.name.trim().is_empty() {
        return Err(RuleError::EmptyName);
    }

    let mut seen = HashSet::new();
    for trigger in rule.triggers() {
        if !seen.insert(trigger.metric) {
            return Err(RuleError::DuplicateTrigger(trigger.metric));
        }
    }
    if seen.is_empty() {
        return Err(RuleError::NoTrigger);
    }

    if let Some(expr) = rule.expressions.iter().find(|e| !e.threshold_value.is_finite()) {
        return Err(RuleError::InvalidThreshold {
            metric: expr.metric,
            value: expr.threshold_value,
        });
    }
    Ok(())
}

/// Evaluate a rule against a snapshot.
///
/// A rule breaches when any trigger holds. Without a breach it is healthy.
/// A breach with no filters is unhealthy. With filters, the breach only
/// counts when every filter holds; a filter that does not hold forces the
/// rule healthy.
pub fn rule_is_healthy(rule: &HealthRule, metric: &HealthMetric) -> bool {
    let breached = rule.triggers().any(|t| is_satisfied(t, metric));
    if !breached {
        return true;
    }
    rule.filters().any(|f| !is_satisfied(f, metric))
}
