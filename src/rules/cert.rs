use chrono::{DateTime, Utc};

use super::{Rule, RuleResult};

const MILLIS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Fractional days from `now` until `expires_at`; negative once expired.
pub fn days_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (expires_at - now).num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// Satisfied when fewer than `min_days_validity` days remain.
pub fn evaluate(rule: &Rule, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> RuleResult {
    let days = days_until(expires_at, now);

    if days < rule.min_days_validity as f64 {
        return RuleResult::satisfied(format!(
            "Certificate expires in ~{days:.1} days (threshold: {} days)",
            rule.min_days_validity
        ));
    }

    RuleResult::unsatisfied()
}
