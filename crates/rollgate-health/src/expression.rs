//! Derived metric values and single-expression evaluation.

use rollgate_state::{Comparator, HealthMetric, MetricName, RuleExpression};

/// Tolerance for `eq` comparisons on derived floating-point values.
const EQ_TOLERANCE: f64 = 1e-9;

/// Derive the named value from a metric snapshot.
///
/// Ratios are percentages (0-100). Returns `None` when the value cannot be
/// derived: a zero denominator, or no staged-rollout figure reported.
pub fn metric_value(metric: &HealthMetric, name: MetricName) -> Option<f64> {
    match name {
        MetricName::SessionStability => {
            stability(metric.sessions, metric.sessions_with_errors)
        }
        MetricName::UserStability => {
            stability(metric.daily_users, metric.daily_users_with_errors)
        }
        MetricName::ErrorsCount => Some(metric.errors_count as f64),
        MetricName::NewErrorsCount => Some(metric.new_errors_count as f64),
        MetricName::AdoptionRate => {
            ratio(metric.sessions_in_last_day, metric.total_sessions_in_last_day)
        }
        MetricName::StagedRollout => metric.staged_rollout,
    }
}

fn stability(total: u64, with_errors: u64) -> Option<f64> {
    ratio(with_errors, total).map(|failing| 100.0 - failing)
}

fn ratio(part: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(part as f64 * 100.0 / total as f64)
}

/// Apply `comparator` as `value <op> threshold`.
pub fn compare(comparator: Comparator, value: f64, threshold: f64) -> bool {
    match comparator {
        Comparator::Lt => value < threshold,
        Comparator::Lte => value <= threshold,
        Comparator::Gt => value > threshold,
        Comparator::Gte => value >= threshold,
        Comparator::Eq => (value - threshold).abs() < EQ_TOLERANCE,
    }
}

/// Whether the expression holds for the snapshot. An underivable value
/// never satisfies an expression.
pub fn is_satisfied(expression: &RuleExpression, metric: &HealthMetric) -> bool {
    metric_value(metric, expression.metric)
        .is_some_and(|value| compare(expression.comparator, value, expression.threshold_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollgate_state::ExpressionKind;

    fn metric() -> HealthMetric {
        HealthMetric {
            id: "m1".to_string(),
            release_id: "rel-1".to_string(),
            platform_id: "android".to_string(),
            sessions: 1000,
            sessions_with_errors: 20,
            daily_users: 400,
            daily_users_with_errors: 4,
            errors_count: 7,
            new_errors_count: 2,
            sessions_in_last_day: 250,
            total_sessions_in_last_day: 1000,
            staged_rollout: Some(10.0),
            fetched_at: 1000,
        }
    }

    #[test]
    fn derived_values() {
        let m = metric();
        assert_eq!(metric_value(&m, MetricName::SessionStability), Some(98.0));
        assert_eq!(metric_value(&m, MetricName::UserStability), Some(99.0));
        assert_eq!(metric_value(&m, MetricName::AdoptionRate), Some(25.0));
        assert_eq!(metric_value(&m, MetricName::ErrorsCount), Some(7.0));
        assert_eq!(metric_value(&m, MetricName::NewErrorsCount), Some(2.0));
        assert_eq!(metric_value(&m, MetricName::StagedRollout), Some(10.0));
    }

    #[test]
    fn zero_denominators_are_unavailable() {
        let m = HealthMetric {
            sessions: 0,
            daily_users: 0,
            total_sessions_in_last_day: 0,
            staged_rollout: None,
            ..metric()
        };
        assert_eq!(metric_value(&m, MetricName::SessionStability), None);
        assert_eq!(metric_value(&m, MetricName::UserStability), None);
        assert_eq!(metric_value(&m, MetricName::AdoptionRate), None);
        assert_eq!(metric_value(&m, MetricName::StagedRollout), None);
    }

    #[test]
    fn comparators() {
        assert!(compare(Comparator::Lt, 1.0, 2.0));
        assert!(!compare(Comparator::Lt, 2.0, 2.0));
        assert!(compare(Comparator::Lte, 2.0, 2.0));
        assert!(compare(Comparator::Gt, 3.0, 2.0));
        assert!(compare(Comparator::Gte, 2.0, 2.0));
        assert!(compare(Comparator::Eq, 0.1 + 0.2, 0.3));
        assert!(!compare(Comparator::Eq, 0.31, 0.3));
    }

    #[test]
    fn unavailable_metric_never_satisfies() {
        let expression = RuleExpression {
            metric: MetricName::UserStability,
            comparator: Comparator::Lt,
            threshold_value: 99.5,
            kind: ExpressionKind::Trigger,
        };
        assert!(is_satisfied(&expression, &metric()));

        let no_users = HealthMetric {
            daily_users: 0,
            ..metric()
        };
        assert!(!is_satisfied(&expression, &no_users));
    }
}
