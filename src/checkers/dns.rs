use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::lookup_host;

use super::{
    BaseChecker, CheckMetadata, Checker, HostCheckResult, ProbeContext, ProbeError, Protocol,
    TimeoutBounds, TimeoutError,
};

const DNS_BOUNDS: TimeoutBounds = TimeoutBounds::new(
    Duration::from_millis(500),
    Duration::from_secs(5),
    Duration::from_secs(2),
);

/// Resolves hosts through the system resolver, keeping IPv4 answers only
#[derive(Debug, Clone)]
pub struct DnsChecker {
    base: BaseChecker,
}

impl DnsChecker {
    pub fn new() -> Self {
        Self {
            base: BaseChecker::new(DNS_BOUNDS),
        }
    }

    async fn probe(&self, host: String) -> Result<Option<CheckMetadata>, ProbeError> {
        let resolved = lookup_host((host.as_str(), 0))
            .await
            .map_err(|e| ProbeError::Dns(e.to_string()))?;

        let mut addresses: Vec<Ipv4Addr> = Vec::new();
        for addr in resolved {
            if let IpAddr::V4(ip) = addr.ip() {
                if !addresses.contains(&ip) {
                    addresses.push(ip);
                }
            }
        }

        if addresses.is_empty() {
            return Err(ProbeError::NoAddresses);
        }

        Ok(Some(CheckMetadata::Addresses(addresses)))
    }
}

impl Default for DnsChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Checker for DnsChecker {
    fn protocol(&self) -> Protocol {
        Protocol::DNS
    }

    /// The port is irrelevant to name resolution and ignored.
    async fn check(
        &self,
        ctx: &ProbeContext,
        hosts: &[String],
        _port: u16,
    ) -> Vec<HostCheckResult> {
        self.base.check_all(ctx, hosts, |host| self.probe(host)).await
    }

    fn timeout(&self) -> Duration {
        self.base.timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TimeoutError> {
        self.base.set_timeout(timeout)
    }
}
