//! Per-tick metrics reporting
//!
//! Every monitoring tick hands a [`GroupMetrics`] snapshot to a [`MetricsSink`].
//! Sinks are shared by all units and must tolerate concurrent calls.

use chrono::Utc;
use tracing::{debug, trace};

use crate::checkers::HostCheckResult;
use crate::rules::cert::days_until;

/// Snapshot of one probe round for a (site, group, check) unit
#[derive(Debug, Clone, Copy)]
pub struct GroupMetrics<'a> {
    pub monitor_site: &'a str,
    pub site: &'a str,
    pub group: &'a str,
    pub port: u16,
    pub protocol: &'a str,
    pub tags: &'a [String],
    pub results: &'a [HostCheckResult],
    pub hosts_up: usize,
    pub hosts_total: usize,
}

pub trait MetricsSink: Send + Sync {
    fn update_group(&self, metrics: &GroupMetrics<'_>);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn update_group(&self, _metrics: &GroupMetrics<'_>) {}
}

/// Emits metrics as tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn update_group(&self, metrics: &GroupMetrics<'_>) {
        let tags = metrics.tags.join(",");

        for host in metrics.results {
            trace!(
                monitor_site = metrics.monitor_site,
                site = metrics.site,
                group = metrics.group,
                host = %host.host,
                port = metrics.port,
                protocol = metrics.protocol,
                tags = %tags,
                success = host.result.success,
                latency_ms = host.result.response_time.as_millis() as u64,
                "check result"
            );

            if let Some(cert) = host.result.cert_info() {
                debug!(
                    site = metrics.site,
                    group = metrics.group,
                    host = %host.host,
                    issuer = %cert.issued_by,
                    days_remaining = days_until(cert.expires_at, Utc::now()),
                    "certificate expiry"
                );
            }
        }

        debug!(
            monitor_site = metrics.monitor_site,
            site = metrics.site,
            group = metrics.group,
            port = metrics.port,
            protocol = metrics.protocol,
            hosts_up = metrics.hosts_up,
            hosts_total = metrics.hosts_total,
            "group status"
        );
    }
}
