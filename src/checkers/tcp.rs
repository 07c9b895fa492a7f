use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::trace;

use super::{
    BaseChecker, CheckMetadata, Checker, HostCheckResult, ProbeContext, ProbeError, Protocol,
    TimeoutBounds, TimeoutError,
};

const TCP_BOUNDS: TimeoutBounds = TimeoutBounds::new(
    Duration::from_secs(1),
    Duration::from_secs(10),
    Duration::from_secs(5),
);

/// Connect-only reachability check
#[derive(Debug, Clone)]
pub struct TcpChecker {
    base: BaseChecker,
}

impl TcpChecker {
    pub fn new() -> Self {
        Self {
            base: BaseChecker::new(TCP_BOUNDS),
        }
    }

    async fn probe(&self, host: String, port: u16) -> Result<Option<CheckMetadata>, ProbeError> {
        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| ProbeError::Connect(e.to_string()))?;
        trace!("connected to {host}:{port} via {:?}", stream.local_addr());
        Ok(None)
    }
}

impl Default for TcpChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Checker for TcpChecker {
    fn protocol(&self) -> Protocol {
        Protocol::TCP
    }

    async fn check(
        &self,
        ctx: &ProbeContext,
        hosts: &[String],
        port: u16,
    ) -> Vec<HostCheckResult> {
        self.base
            .check_all(ctx, hosts, |host| self.probe(host, port))
            .await
    }

    fn timeout(&self) -> Duration {
        self.base.timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TimeoutError> {
        self.base.set_timeout(timeout)
    }
}
