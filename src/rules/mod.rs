//! Rule evaluation
//!
//! Rules are declarative alert definitions loaded from configuration. Evaluation
//! is a pure function of the facts gathered during one monitoring tick:
//!
//! - `standard` rules compile a boolean expression over `downtime` and
//!   `responseTime` (whole seconds)
//! - `cert` rules compare the days left on a TLS certificate against
//!   `minDaysValidity`
//!
//! Every failure mode (missing type, empty condition, bad syntax, non-boolean
//! result) is carried in the [`RuleResult`] instead of being raised, so a broken
//! rule becomes an alert of its own rather than a crash.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod cert;
pub mod standard;

pub use standard::{normalize_condition, validate_condition};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("rule type must be specified")]
    MissingType,

    #[error("invalid rule type: {0}")]
    InvalidType(String),

    #[error("rule condition cannot be empty")]
    EmptyCondition,

    #[error("invalid rule syntax: {0}")]
    InvalidSyntax(String),

    #[error("rule evaluation failed: {0}")]
    Evaluation(String),

    #[error("rule must evaluate to boolean, got {0}")]
    NotBoolean(String),

    #[error("certificate expiry time is not available")]
    MissingCertificate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
    Standard,
    Cert,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Standard => "standard",
            RuleType::Cert => "cert",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(RuleError::MissingType),
            "standard" => Ok(RuleType::Standard),
            "cert" => Ok(RuleType::Cert),
            other => Err(RuleError::InvalidType(other.to_string())),
        }
    }
}

/// An alert definition as written in the configuration file
///
/// The type is kept as written so that an unknown type surfaces as an
/// evaluation error instead of a parse failure of the whole file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,

    #[serde(rename = "type", default)]
    pub rule_type: String,

    /// Boolean expression (standard rules)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,

    /// Only units carrying at least one of these tags are evaluated; empty matches all
    #[serde(default)]
    pub tags: Vec<String>,

    /// Notifier kinds to deliver to; empty broadcasts to every notifier
    #[serde(default)]
    pub notifications: Vec<String>,

    /// Minimum days of certificate validity (cert rules)
    #[serde(
        rename = "minDaysValidity",
        alias = "min_days_validity",
        default,
        skip_serializing_if = "is_zero"
    )]
    pub min_days_validity: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Rule {
    pub fn standard(name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rule_type: RuleType::Standard.to_string(),
            condition: condition.into(),
            ..Default::default()
        }
    }

    pub fn cert(name: impl Into<String>, min_days_validity: i64) -> Self {
        Self {
            name: name.into(),
            rule_type: RuleType::Cert.to_string(),
            min_days_validity,
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_notifications(mut self, kinds: &[&str]) -> Self {
        self.notifications = kinds.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Check that the rule declares a known type.
    pub fn validate(&self) -> Result<RuleType, RuleError> {
        self.rule_type.parse()
    }

    pub fn is_cert(&self) -> bool {
        matches!(self.validate(), Ok(RuleType::Cert))
    }

    pub fn notification_types(&self) -> &[String] {
        &self.notifications
    }
}

/// Facts available to a rule in one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationParams {
    pub downtime: Duration,
    pub response_time: Duration,
    pub cert_expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleResult {
    pub satisfied: bool,
    pub message: String,
    pub error: Option<RuleError>,
}

impl RuleResult {
    pub fn satisfied(message: impl Into<String>) -> Self {
        Self {
            satisfied: true,
            message: message.into(),
            error: None,
        }
    }

    pub fn unsatisfied() -> Self {
        Self::default()
    }

    pub fn failed(error: RuleError) -> Self {
        Self {
            satisfied: false,
            message: String::new(),
            error: Some(error),
        }
    }

    /// Satisfied or erroring results both warrant a notification.
    pub fn should_notify(&self) -> bool {
        self.satisfied || self.error.is_some()
    }
}

pub fn evaluate(rule: &Rule, params: &EvaluationParams) -> RuleResult {
    evaluate_at(rule, params, Utc::now())
}

/// Evaluate with an explicit clock for certificate arithmetic.
pub fn evaluate_at(rule: &Rule, params: &EvaluationParams, now: DateTime<Utc>) -> RuleResult {
    match rule.validate() {
        Ok(RuleType::Standard) => standard::evaluate(rule, params.downtime, params.response_time),
        Ok(RuleType::Cert) => match params.cert_expiry {
            Some(expires_at) => cert::evaluate(rule, expires_at, now),
            None => RuleResult::failed(RuleError::MissingCertificate),
        },
        Err(e) => RuleResult::failed(e),
    }
}
