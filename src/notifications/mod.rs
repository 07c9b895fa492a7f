//! Notification dispatch
//!
//! A [`Notification`] is built by the monitor from a rule outcome and handed to
//! the [`NotifierSet`], which forwards it to every notifier the rule asks for
//! (or to all of them when the rule names none).
//!
//! ## Delivery
//!
//! ```text
//! Rule + Notification ─→ NotifierSet::select ─┬─→ log   ─┐
//!                                             └─→ slack ─┴─→ join_all ─→ delivered / DispatchError
//! ```
//!
//! Each notifier is independent: one failing delivery never prevents the others.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use crate::config::{NotificationConfig, RuleMode};
use crate::rules::{Rule, RuleResult};

pub mod log;
pub mod slack;

pub use log::LogNotifier;
pub use slack::SlackNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        f.write_str(level)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub level: Level,
    pub site: String,
    pub group: String,
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid Slack webhook URL format")]
    InvalidWebhookUrl,

    #[error("failed to send notification: {0}")]
    Request(String),

    #[error("rate limited by notification endpoint")]
    RateLimited,

    #[error("notification failed with status: {0}")]
    Status(u16),
}

/// One or more notifiers failed to deliver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to send notification via {}", describe(.failures))]
pub struct DispatchError {
    pub delivered: usize,
    pub failures: Vec<(String, NotifyError)>,
}

fn describe(failures: &[(String, NotifyError)]) -> String {
    failures
        .iter()
        .map(|(kind, e)| format!("{kind} ({e})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A delivery channel for notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// The name rules use to select this notifier (e.g. `log`, `slack`).
    fn kind(&self) -> &str;

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifiers keyed by kind; built once and shared read-only between units
#[derive(Clone, Default)]
pub struct NotifierSet {
    notifiers: BTreeMap<String, Arc<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the configured notifiers; duplicate kinds keep the last entry.
    pub fn from_config(configs: &[NotificationConfig]) -> Result<Self, NotifyError> {
        let mut set = Self::new();
        for config in configs {
            match config {
                NotificationConfig::Log => set.insert(LogNotifier),
                NotificationConfig::Slack { webhook_url } => {
                    set.insert(SlackNotifier::new(webhook_url)?)
                }
            }
        }
        Ok(set)
    }

    pub fn insert(&mut self, notifier: impl Notifier + 'static) {
        self.insert_shared(Arc::new(notifier));
    }

    pub fn insert_shared(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.insert(notifier.kind().to_string(), notifier);
    }

    pub fn with(mut self, notifier: impl Notifier + 'static) -> Self {
        self.insert(notifier);
        self
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn Notifier>> {
        self.notifiers.get(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.notifiers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Notifiers for the requested kinds; everything when none are requested.
    ///
    /// Kinds that were never configured are skipped.
    pub fn select(&self, requested: &[String]) -> Vec<&Arc<dyn Notifier>> {
        if requested.is_empty() {
            return self.notifiers.values().collect();
        }

        let mut selected: Vec<&Arc<dyn Notifier>> = Vec::new();
        for kind in requested {
            match self.notifiers.get(kind) {
                Some(notifier) => {
                    if !selected.iter().any(|n| n.kind() == kind) {
                        selected.push(notifier);
                    }
                }
                None => trace!("notifier {kind} not configured, skipping"),
            }
        }
        selected
    }
}

impl fmt::Debug for NotifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierSet")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Deliver `notification` to the notifiers selected by `rule`.
///
/// Returns how many notifiers accepted it.
pub async fn send_rule_notifications(
    rule: &Rule,
    notification: &Notification,
    notifiers: &NotifierSet,
) -> Result<usize, DispatchError> {
    let selected = notifiers.select(rule.notification_types());
    let outcomes = join_all(selected.iter().map(|notifier| async move {
        (notifier.kind().to_string(), notifier.notify(notification).await)
    }))
    .await;

    let mut delivered = 0;
    let mut failures = Vec::new();
    for (kind, outcome) in outcomes {
        match outcome {
            Ok(()) => delivered += 1,
            Err(e) => {
                error!(rule = %rule.name, notifier = %kind, "notification delivery failed: {e}");
                failures.push((kind, e));
            }
        }
    }

    if failures.is_empty() {
        Ok(delivered)
    } else {
        Err(DispatchError {
            delivered,
            failures,
        })
    }
}

/// Human readable summary of a rule outcome for the current group state.
pub fn build_message(
    rule: &Rule,
    result: &RuleResult,
    mode: RuleMode,
    successful: usize,
    total: usize,
) -> String {
    if let Some(e) = &result.error {
        return format!("Rule evaluation failed: {e}");
    }

    let hosts = match mode {
        RuleMode::All if successful == 0 => " (all hosts down)".to_string(),
        RuleMode::All | RuleMode::Any => format!(" ({successful}/{total} hosts up)"),
    };

    let mut message = format!("Rule condition met: {}{hosts}", rule.name);
    if !result.message.is_empty() {
        message.push_str(" - ");
        message.push_str(&result.message);
    }
    message
}

pub fn level_for(result: &RuleResult) -> Level {
    if result.error.is_some() {
        Level::Error
    } else {
        Level::Warning
    }
}
