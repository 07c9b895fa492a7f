//! Monitoring orchestrator
//!
//! The [`Monitor`] turns the configuration tree into one [`MonitorUnit`] per
//! (site, group, check) and runs each on its own task.
//!
//! ## Key Features
//!
//! 1. **Build before spawn** - every unit is initialised up front; a unit that
//!    cannot start is logged and skipped while the rest run
//! 2. **Shared read-only resources** - registry, rules, notifiers and metrics
//!    sink are built once and shared by all units
//! 3. **Single cancellation scope** - cancelling the handle stops every unit and
//!    every in-flight probe
//!
//! ```text
//! Config ─→ Monitor::build ─→ [MonitorUnit, ...] ─→ spawn ─→ JoinSet
//!                                                              ↑
//!                                       MonitorHandle::shutdown┘ (cancel + join)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::checkers::CheckerRegistry;
use crate::config::Config;
use crate::metrics::MetricsSink;
use crate::notifications::NotifierSet;
use crate::rules::Rule;

pub mod stats;
pub mod unit;

pub use stats::{GroupStats, failing_hosts, update_downtime};
pub use unit::{MIN_INTERVAL, MonitorUnit, SetupError, TickReport};

/// Ceiling for one probe round, independent of the check interval
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    pub round_timeout: Duration,
    /// Skip re-evaluating a rule within this window (off when `None`)
    pub rule_debounce: Option<Duration>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            round_timeout: DEFAULT_ROUND_TIMEOUT,
            rule_debounce: None,
        }
    }
}

impl MonitorOptions {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            rule_debounce: config.debounce()?,
            ..Default::default()
        })
    }
}

/// Everything a unit borrows from the process rather than owns
#[derive(Clone)]
pub struct UnitResources {
    pub monitor_site: String,
    pub registry: CheckerRegistry,
    pub rules: Arc<[Rule]>,
    pub notifiers: Arc<NotifierSet>,
    pub metrics: Arc<dyn MetricsSink>,
    pub options: MonitorOptions,
}

/// A unit that failed to initialise
#[derive(Debug)]
pub struct SkippedUnit {
    pub site: String,
    pub group: String,
    pub protocol: String,
    pub port: u16,
    pub error: SetupError,
}

pub struct Monitor {
    units: Vec<MonitorUnit>,
    skipped: Vec<SkippedUnit>,
}

impl Monitor {
    pub fn build(config: &Config, resources: &UnitResources) -> Self {
        let mut units = Vec::new();
        let mut skipped = Vec::new();

        for site in &config.sites {
            for group in &site.groups {
                for check in &group.checks {
                    match MonitorUnit::new(resources, site, group, check) {
                        Ok(unit) => units.push(unit),
                        Err(e) => {
                            error!(
                                site = %site.name,
                                group = %group.name,
                                protocol = %check.protocol,
                                port = check.port,
                                "skipping check: {e}"
                            );
                            skipped.push(SkippedUnit {
                                site: site.name.clone(),
                                group: group.name.clone(),
                                protocol: check.protocol.clone(),
                                port: check.port,
                                error: e,
                            });
                        }
                    }
                }
            }
        }

        debug!("built {} units, skipped {}", units.len(), skipped.len());
        Self { units, skipped }
    }

    pub fn units(&self) -> &[MonitorUnit] {
        &self.units
    }

    pub fn skipped(&self) -> &[SkippedUnit] {
        &self.skipped
    }

    /// Start every unit under a child of `cancel`.
    pub fn spawn(self, cancel: &CancellationToken) -> MonitorHandle {
        let cancel = cancel.child_token();
        let mut tasks = JoinSet::new();

        for unit in self.units {
            tasks.spawn(unit.run(cancel.clone()));
        }

        info!("started {} monitoring units", tasks.len());
        MonitorHandle { cancel, tasks }
    }
}

pub struct MonitorHandle {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl MonitorHandle {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every unit and wait for all of them to return.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!("monitoring unit ended abnormally: {e}");
            }
        }

        debug!("all monitoring units stopped");
    }
}
