//! Helper functions for integration tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use checkmate::checkers::{
    BaseChecker, CertInfo, CheckMetadata, Checker, CheckerRegistry, HostCheckResult, ProbeContext,
    ProbeError, Protocol, TimeoutBounds, TimeoutError, factory,
};
use checkmate::config::{CheckConfig, GroupConfig, HostConfig, RuleMode, SiteConfig};
use checkmate::metrics::NoopMetrics;
use checkmate::notifications::{Notification, Notifier, NotifierSet, NotifyError};
use checkmate::rules::Rule;
use checkmate::{MonitorOptions, UnitResources};

pub const FAKE: &str = "FAKE";

/// What the scripted checker reports for one host
#[derive(Debug, Clone)]
pub enum Outcome {
    Up(Duration),
    Down,
    Cert(DateTime<Utc>),
}

/// Checker that answers from a fixed script; unknown hosts are down.
#[derive(Debug, Clone)]
pub struct ScriptedChecker {
    base: BaseChecker,
    script: HashMap<String, Outcome>,
}

impl ScriptedChecker {
    pub fn new(script: &[(&str, Outcome)]) -> Self {
        Self {
            base: BaseChecker::new(TimeoutBounds::default()),
            script: script
                .iter()
                .map(|(host, outcome)| (host.to_string(), outcome.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    fn protocol(&self) -> Protocol {
        Protocol::new(FAKE)
    }

    async fn check(&self, ctx: &ProbeContext, hosts: &[String], _port: u16) -> Vec<HostCheckResult> {
        self.base
            .check_all(ctx, hosts, |host| {
                let outcome = self.script.get(&host).cloned();
                async move {
                    match outcome {
                        Some(Outcome::Up(latency)) => {
                            tokio::time::sleep(latency).await;
                            Ok(None)
                        }
                        Some(Outcome::Cert(expires_at)) => {
                            Ok(Some(CheckMetadata::Certificate(CertInfo {
                                issued_by: "Test CA".to_string(),
                                expires_at,
                            })))
                        }
                        Some(Outcome::Down) | None => {
                            Err(ProbeError::Connect(format!("{host}: connection refused")))
                        }
                    }
                }
            })
            .await
    }

    fn timeout(&self) -> Duration {
        self.base.timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TimeoutError> {
        self.base.set_timeout(timeout)
    }
}

pub fn scripted_registry(script: &[(&str, Outcome)]) -> CheckerRegistry {
    let checker = ScriptedChecker::new(script);
    let registry = CheckerRegistry::with_defaults();
    registry.register(FAKE, factory(move || Ok(checker.clone())));
    registry
}

/// Notifier that keeps every notification it is handed
#[derive(Debug, Clone)]
pub struct RecordingNotifier {
    kind: &'static str,
    fail_with: Option<NotifyError>,
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            fail_with: None,
            seen: Arc::default(),
        }
    }

    pub fn failing(kind: &'static str, error: NotifyError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::new(kind)
        }
    }

    pub fn seen(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn kind(&self) -> &str {
        self.kind
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.seen.lock().unwrap().push(notification.clone());
        match &self.fail_with {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

pub fn create_resources(
    registry: CheckerRegistry,
    rules: Vec<Rule>,
    notifiers: NotifierSet,
) -> UnitResources {
    UnitResources {
        monitor_site: "dc-east".to_string(),
        registry,
        rules: rules.into(),
        notifiers: Arc::new(notifiers),
        metrics: Arc::new(NoopMetrics),
        options: MonitorOptions::default(),
    }
}

pub fn create_site(name: &str, tags: &[&str]) -> SiteConfig {
    SiteConfig {
        name: name.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        groups: vec![],
    }
}

pub fn create_group(name: &str, hosts: &[&str], rule_mode: Option<RuleMode>) -> GroupConfig {
    GroupConfig {
        name: name.to_string(),
        rule_mode,
        tags: vec![],
        hosts: hosts
            .iter()
            .map(|host| HostConfig {
                host: host.to_string(),
            })
            .collect(),
        checks: vec![],
    }
}

pub fn create_check(protocol: &str, port: u16, interval: &str) -> CheckConfig {
    CheckConfig {
        protocol: protocol.to_string(),
        port,
        interval: interval.to_string(),
        ..Default::default()
    }
}

/// A local port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
