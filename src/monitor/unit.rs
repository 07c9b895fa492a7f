//! One monitoring loop per (site, group, check)
//!
//! ## Tick
//!
//! ```text
//! probe all hosts ─→ GroupStats ─→ metrics sink
//!                        │
//!                        ├─→ rule mode ─→ downtime accumulator
//!                        │
//!                        └─→ matching rules ─→ notifications ─→ NotifierSet
//! ```
//!
//! Ticks run back to back, each followed by a sleep for whatever is left of
//! the interval. Cancellation interrupts a tick or a sleep immediately.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::checkers::{
    CheckOptions, Checker, HostCheckResult, ProbeContext, ProbeError, Protocol, RegistryError,
};
use crate::config::{CheckConfig, GroupConfig, RuleMode, RuleModeResolver, SiteConfig};
use crate::metrics::GroupMetrics;
use crate::notifications::{Notification, build_message, level_for, send_rule_notifications};
use crate::rules::{self, EvaluationParams, Rule, RuleResult};
use crate::tags;
use crate::util::parse_duration;

use super::UnitResources;
use super::stats::{GroupStats, failing_hosts, update_downtime};

/// Shortest interval a unit accepts
pub const MIN_INTERVAL: Duration = Duration::from_secs(2);

/// Why a unit could not be started
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("invalid interval '{interval}': {reason}")]
    InvalidInterval { interval: String, reason: String },

    #[error("interval {0:?} is shorter than the minimum of {MIN_INTERVAL:?}")]
    IntervalTooShort(Duration),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to configure checker: {0}")]
    Configure(#[from] ProbeError),

    #[error("group has no hosts")]
    NoHosts,
}

/// What one tick observed and did
#[derive(Debug, Clone)]
pub struct TickReport {
    pub results: Vec<HostCheckResult>,
    pub stats: GroupStats,
    pub mode: RuleMode,
    pub downtime: Duration,
    pub notifications: Vec<Notification>,
}

pub struct MonitorUnit {
    /// Reported as the notification site
    monitor_site: String,

    /// Site name from the configuration tree
    site: String,

    group: String,

    hosts: Vec<String>,

    port: u16,

    /// Site, group and check tags merged
    tags: Vec<String>,

    interval: Duration,

    resolver: RuleModeResolver,

    checker: Box<dyn Checker>,

    resources: UnitResources,

    /// Accumulated time the failure condition has held
    downtime: Duration,

    /// Last evaluation per rule name, for debouncing
    last_rule_eval: HashMap<String, Instant>,
}

impl fmt::Debug for MonitorUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorUnit")
            .field("site", &self.site)
            .field("group", &self.group)
            .field("protocol", &self.checker.protocol())
            .field("port", &self.port)
            .field("hosts", &self.hosts)
            .field("interval", &self.interval)
            .field("downtime", &self.downtime)
            .finish()
    }
}

impl MonitorUnit {
    pub fn new(
        resources: &UnitResources,
        site: &SiteConfig,
        group: &GroupConfig,
        check: &CheckConfig,
    ) -> Result<Self, SetupError> {
        let interval =
            parse_duration(&check.interval).map_err(|e| SetupError::InvalidInterval {
                interval: check.interval.clone(),
                reason: e.to_string(),
            })?;
        if interval < MIN_INTERVAL {
            return Err(SetupError::IntervalTooShort(interval));
        }

        let hosts = group.host_names();
        if hosts.is_empty() {
            return Err(SetupError::NoHosts);
        }

        let mut checker = resources.registry.get(check.protocol.as_str())?;
        if let Err(e) = checker.set_timeout(interval) {
            debug!("{e}; using {:?}", checker.timeout());
        }
        checker.configure(&CheckOptions {
            verify_cert: check.verify_cert,
        })?;

        Ok(Self {
            monitor_site: resources.monitor_site.clone(),
            site: site.name.clone(),
            group: group.name.clone(),
            hosts,
            port: check.port,
            tags: tags::merge([
                site.tags.as_slice(),
                group.tags.as_slice(),
                check.tags.as_slice(),
            ]),
            interval,
            resolver: RuleModeResolver::new(group.rule_mode, check.rule_mode),
            checker,
            resources: resources.clone(),
            downtime: Duration::ZERO,
            last_rule_eval: HashMap::new(),
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn protocol(&self) -> Protocol {
        self.checker.protocol()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn checker_timeout(&self) -> Duration {
        self.checker.timeout()
    }

    pub fn downtime(&self) -> Duration {
        self.downtime
    }

    /// Tick until `cancel` fires.
    #[instrument(skip_all, fields(site = %self.site, group = %self.group, protocol = %self.checker.protocol(), port = self.port))]
    pub async fn run(mut self, cancel: CancellationToken) {
        debug!("starting monitoring unit every {:?}", self.interval);

        loop {
            let started = Instant::now();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                report = self.tick(&cancel) => {
                    trace!(
                        up = report.stats.successful,
                        total = report.stats.total_hosts,
                        downtime_s = report.downtime.as_secs(),
                        notifications = report.notifications.len(),
                        "tick complete"
                    );
                }
            }

            let remaining = self.interval.saturating_sub(started.elapsed());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        debug!("monitoring unit stopped");
    }

    /// Probe, aggregate, account downtime and evaluate rules once.
    pub async fn tick(&mut self, cancel: &CancellationToken) -> TickReport {
        let ctx = ProbeContext::new(cancel.child_token())
            .with_timeout(self.resources.options.round_timeout);
        let results = self.checker.check(&ctx, &self.hosts, self.port).await;
        self.log_results(&results);

        let stats = GroupStats::from_results(&results);
        let protocol = self.checker.protocol();
        self.resources.metrics.update_group(&GroupMetrics {
            monitor_site: &self.monitor_site,
            site: &self.site,
            group: &self.group,
            port: self.port,
            protocol: protocol.as_str(),
            tags: &self.tags,
            results: &results,
            hosts_up: stats.successful,
            hosts_total: stats.total_hosts,
        });

        let mode = self.resolver.effective();
        let failing = self.resolver.should_trigger(stats.any_down, stats.all_down);
        self.downtime = update_downtime(self.downtime, self.interval, failing);

        let notifications = self.process_rules(&results, &stats, mode).await;

        TickReport {
            results,
            stats,
            mode,
            downtime: self.downtime,
            notifications,
        }
    }

    fn log_results(&self, results: &[HostCheckResult]) {
        let protocol = self.checker.protocol();
        let tags = self.tags.join(",");

        for HostCheckResult { host, result } in results {
            let latency_ms = result.response_time.as_millis() as u64;
            match &result.error {
                Some(e) => warn!(
                    site = %self.site, group = %self.group, %host, port = self.port,
                    %protocol, latency_ms, success = result.success, %tags,
                    "{e}"
                ),
                None => trace!(
                    site = %self.site, group = %self.group, %host, port = self.port,
                    %protocol, latency_ms, success = result.success, %tags,
                    "check succeeded"
                ),
            }
        }
    }

    /// Whether `rule` ran too recently to be evaluated again.
    fn debounced(&self, rule: &Rule, now: Instant) -> bool {
        let Some(window) = self.resources.options.rule_debounce else {
            return false;
        };

        self.last_rule_eval
            .get(&rule.name)
            .is_some_and(|last| now.duration_since(*last) < window)
    }

    async fn process_rules(
        &mut self,
        results: &[HostCheckResult],
        stats: &GroupStats,
        mode: RuleMode,
    ) -> Vec<Notification> {
        let rules = Arc::clone(&self.resources.rules);
        let failing = failing_hosts(results);
        let mut sent = Vec::new();

        for rule in rules.iter() {
            if !tags::has_matching(&self.tags, &rule.tags) {
                continue;
            }

            let now = Instant::now();
            if self.debounced(rule, now) {
                trace!(rule = %rule.name, "rule evaluated recently, skipping");
                continue;
            }
            self.last_rule_eval.insert(rule.name.clone(), now);

            for notification in self.evaluate_rule(rule, results, stats, mode, &failing) {
                // Each failed notifier is already logged during dispatch.
                if let Err(e) =
                    send_rule_notifications(rule, &notification, &self.resources.notifiers).await
                {
                    debug!(rule = %rule.name, delivered = e.delivered, "{e}");
                }
                sent.push(notification);
            }
        }

        sent
    }

    /// Notifications a rule calls for this tick; empty when it is not satisfied.
    fn evaluate_rule(
        &self,
        rule: &Rule,
        results: &[HostCheckResult],
        stats: &GroupStats,
        mode: RuleMode,
        failing: &[String],
    ) -> Vec<Notification> {
        if rule.is_cert() {
            return results
                .iter()
                .filter_map(|host| {
                    let cert = host.result.cert_info()?;
                    let params = EvaluationParams {
                        cert_expiry: Some(cert.expires_at),
                        ..Default::default()
                    };
                    let result = rules::evaluate(rule, &params);
                    result
                        .should_notify()
                        .then(|| self.notification(rule, &result, stats, mode, host.host.clone()))
                })
                .collect();
        }

        let params = EvaluationParams {
            downtime: self.downtime,
            response_time: stats.avg_response_time,
            cert_expiry: None,
        };
        let result = rules::evaluate(rule, &params);
        if !result.should_notify() {
            return Vec::new();
        }

        if let Some(e) = &result.error {
            error!(rule = %rule.name, site = %self.site, group = %self.group, "{e}");
        }

        // Any mode notifies per failing host; nothing is failing, nothing is sent.
        if mode == RuleMode::Any && result.error.is_none() {
            failing
                .iter()
                .map(|host| self.notification(rule, &result, stats, mode, host.clone()))
                .collect()
        } else {
            let hosts = if failing.is_empty() {
                self.hosts.join(",")
            } else {
                failing.join(",")
            };
            vec![self.notification(rule, &result, stats, mode, hosts)]
        }
    }

    fn notification(
        &self,
        rule: &Rule,
        result: &RuleResult,
        stats: &GroupStats,
        mode: RuleMode,
        host: String,
    ) -> Notification {
        Notification {
            message: build_message(rule, result, mode, stats.successful, stats.total_hosts),
            level: level_for(result),
            site: self.monitor_site.clone(),
            group: self.group.clone(),
            host,
            port: self.port,
            protocol: self.checker.protocol().to_string(),
            tags: self.tags.clone(),
        }
    }
}
