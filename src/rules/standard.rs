//! Expression rules over `downtime` and `responseTime`

use std::time::Duration;

use evalexpr::{
    Context, ContextWithMutableVariables, EvalexprError, HashMapContext, Value,
    build_operator_tree,
};

use super::{Rule, RuleError, RuleResult};

const DOWNTIME: &str = "downtime";
const RESPONSE_TIME: &str = "responseTime";

fn rewrite_token(token: &str) -> String {
    match token {
        "and" => "&&".to_string(),
        "or" => "||".to_string(),
        "not" => "!".to_string(),
        _ => match humantime::parse_duration(token) {
            Ok(duration) => duration.as_secs().to_string(),
            Err(_) => token.to_string(),
        },
    }
}

/// Rewrite duration literals to whole seconds and word operators to symbols.
///
/// `downtime > 2m and responseTime > 1500ms` becomes
/// `downtime > 120 && responseTime > 1`. Applying it twice changes nothing.
pub fn normalize_condition(condition: &str) -> String {
    condition
        .split_whitespace()
        .map(rewrite_token)
        .collect::<Vec<_>>()
        .join(" ")
}

fn evaluation_error(e: EvalexprError) -> RuleError {
    RuleError::Evaluation(e.to_string())
}

/// Context holding only the two facts; nothing else is callable.
fn facts(downtime: i64, response_time: i64) -> Result<HashMapContext, RuleError> {
    let mut context = HashMapContext::new();
    context
        .set_value(DOWNTIME.into(), Value::Int(downtime))
        .map_err(evaluation_error)?;
    context
        .set_value(RESPONSE_TIME.into(), Value::Int(response_time))
        .map_err(evaluation_error)?;
    context
        .set_builtin_functions_disabled(true)
        .map_err(evaluation_error)?;
    Ok(context)
}

fn whole_seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

/// Compile and run `condition` against the given facts (in seconds).
pub fn evaluate_condition(
    condition: &str,
    downtime: i64,
    response_time: i64,
) -> Result<bool, RuleError> {
    if condition.trim().is_empty() {
        return Err(RuleError::EmptyCondition);
    }

    let normalized = normalize_condition(condition);
    let tree =
        build_operator_tree(&normalized).map_err(|e| RuleError::InvalidSyntax(e.to_string()))?;

    let context = facts(downtime, response_time)?;
    match tree.eval_with_context(&context).map_err(evaluation_error)? {
        Value::Boolean(satisfied) => Ok(satisfied),
        other => Err(RuleError::NotBoolean(other.to_string())),
    }
}

/// Fail fast on conditions that can never evaluate, by running them on zeroed facts.
pub fn validate_condition(condition: &str) -> Result<(), RuleError> {
    evaluate_condition(condition, 0, 0).map(|_| ())
}

pub fn evaluate(rule: &Rule, downtime: Duration, response_time: Duration) -> RuleResult {
    let downtime = whole_seconds(downtime);
    let response_time = whole_seconds(response_time);

    match evaluate_condition(&rule.condition, downtime, response_time) {
        Ok(true) => RuleResult::satisfied(format!(
            "{} (downtime={downtime}s, responseTime={response_time}s)",
            rule.condition.trim()
        )),
        Ok(false) => RuleResult::unsatisfied(),
        Err(e) => RuleResult::failed(e),
    }
}
