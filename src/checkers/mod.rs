//! Protocol checkers
//!
//! Every protocol probe sits behind the [`Checker`] contract. A checker owns a
//! timeout bounded by its protocol's [`TimeoutBounds`] and probes a list of
//! hosts concurrently, returning one [`HostCheckResult`] per host in input order.
//!
//! ## Probe Round
//!
//! ```text
//! hosts[0] ─┐
//! hosts[1] ─┼─ join_all (one deadline, one cancellation scope) ─→ results[0..n]
//! hosts[n] ─┘
//! ```
//!
//! Network errors, timeouts and protocol rejections are all folded into a failed
//! [`CheckResult`]; nothing a probe does is fatal to the caller.

use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub mod dns;
pub mod http;
pub mod https;
pub mod registry;
pub mod smtp;
pub mod tcp;

pub use dns::DnsChecker;
pub use http::HttpChecker;
pub use https::HttpsChecker;
pub use registry::{CheckerFactory, CheckerRegistry, Protocol, RegistryError, factory};
pub use smtp::SmtpChecker;
pub use tcp::TcpChecker;

pub const GLOBAL_MIN_TIMEOUT: Duration = Duration::from_secs(2);
pub const GLOBAL_MAX_TIMEOUT: Duration = Duration::from_secs(20);
pub const GLOBAL_DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a single host probe failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("tcp connection failed: {0}")]
    Connect(String),

    #[error("http request failed: {0}")]
    Request(String),

    #[error("http status error: {0}")]
    Status(u16),

    #[error("smtp handshake failed: {0}")]
    Smtp(String),

    #[error("dns lookup failed: {0}")]
    Dns(String),

    #[error("no IP addresses found for host")]
    NoAddresses,

    #[error("failed to build client: {0}")]
    Client(String),

    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),

    #[error("check cancelled")]
    Cancelled,
}

/// A requested timeout fell outside the protocol's bounds
///
/// The checker still applies the clamped value; callers may ignore this error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("timeout {requested:?} is less than the minimum allowed ({min:?})")]
    BelowMinimum { requested: Duration, min: Duration },

    #[error("timeout {requested:?} is greater than the maximum allowed ({max:?})")]
    AboveMaximum { requested: Duration, max: Duration },
}

impl TimeoutError {
    /// The bound the requested value was clamped to
    pub fn clamped(&self) -> Duration {
        match self {
            TimeoutError::BelowMinimum { min, .. } => *min,
            TimeoutError::AboveMaximum { max, .. } => *max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutBounds {
    pub min: Duration,
    pub max: Duration,
    pub default: Duration,
}

impl TimeoutBounds {
    /// Zero fields fall back to the global bounds.
    pub const fn new(min: Duration, max: Duration, default: Duration) -> Self {
        Self {
            min: if min.is_zero() { GLOBAL_MIN_TIMEOUT } else { min },
            max: if max.is_zero() { GLOBAL_MAX_TIMEOUT } else { max },
            default: if default.is_zero() {
                GLOBAL_DEFAULT_TIMEOUT
            } else {
                default
            },
        }
    }

    /// Map a requested timeout into `[min, max]`; zero selects the default.
    pub fn validate(&self, requested: Duration) -> Result<Duration, TimeoutError> {
        if requested.is_zero() {
            return Ok(self.default);
        }
        if requested < self.min {
            return Err(TimeoutError::BelowMinimum {
                requested,
                min: self.min,
            });
        }
        if requested > self.max {
            return Err(TimeoutError::AboveMaximum {
                requested,
                max: self.max,
            });
        }
        Ok(requested)
    }
}

impl Default for TimeoutBounds {
    fn default() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }
}

/// Certificate details presented by an HTTPS peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Issuer common name
    pub issued_by: String,

    /// End of the certificate's validity period
    pub expires_at: DateTime<Utc>,
}

/// Protocol-specific data attached to a successful probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckMetadata {
    Certificate(CertInfo),
    Addresses(Vec<Ipv4Addr>),
}

/// Outcome of probing one host
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub success: bool,
    pub response_time: Duration,
    pub error: Option<ProbeError>,
    pub metadata: Option<CheckMetadata>,
}

impl CheckResult {
    pub fn success(response_time: Duration, metadata: Option<CheckMetadata>) -> Self {
        Self {
            success: true,
            response_time,
            error: None,
            metadata,
        }
    }

    pub fn failure(response_time: Duration, error: ProbeError) -> Self {
        Self {
            success: false,
            response_time,
            error: Some(error),
            metadata: None,
        }
    }

    pub fn cert_info(&self) -> Option<&CertInfo> {
        match &self.metadata {
            Some(CheckMetadata::Certificate(info)) => Some(info),
            _ => None,
        }
    }

    pub fn addresses(&self) -> Option<&[Ipv4Addr]> {
        match &self.metadata {
            Some(CheckMetadata::Addresses(addresses)) => Some(addresses),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostCheckResult {
    pub host: String,
    pub result: CheckResult,
}

/// Per-check knobs a checker may honour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOptions {
    /// Verify the peer certificate chain (HTTPS only)
    pub verify_cert: bool,
}

/// Cancellation scope and deadline shared by every probe of one round
#[derive(Debug, Clone, Default)]
pub struct ProbeContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ProbeContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Child scope that additionally expires `timeout` from now.
    ///
    /// Cancelling the parent cancels the child; the earlier deadline wins.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };

        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A protocol-specific prober
#[async_trait]
pub trait Checker: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Probe every host concurrently; results follow the order of `hosts`.
    async fn check(&self, ctx: &ProbeContext, hosts: &[String], port: u16)
    -> Vec<HostCheckResult>;

    fn timeout(&self) -> Duration;

    /// Apply a timeout, clamped to the protocol bounds.
    ///
    /// Out-of-bounds values are clamped *and* reported.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TimeoutError>;

    fn configure(&mut self, _options: &CheckOptions) -> Result<(), ProbeError> {
        Ok(())
    }
}

/// Timeout state and host fan-out shared by all protocol checkers
#[derive(Debug, Clone)]
pub struct BaseChecker {
    timeout: Duration,
    bounds: TimeoutBounds,
}

impl BaseChecker {
    pub fn new(bounds: TimeoutBounds) -> Self {
        Self {
            timeout: bounds.default,
            bounds,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn bounds(&self) -> TimeoutBounds {
        self.bounds
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), TimeoutError> {
        match self.bounds.validate(timeout) {
            Ok(valid) => {
                self.timeout = valid;
                Ok(())
            }
            Err(e) => {
                self.timeout = e.clamped();
                Err(e)
            }
        }
    }

    /// Run `probe` against every host under one deadline.
    ///
    /// The deadline is the earlier of the context's and `now + timeout`.
    pub async fn check_all<F, Fut>(
        &self,
        ctx: &ProbeContext,
        hosts: &[String],
        probe: F,
    ) -> Vec<HostCheckResult>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Option<CheckMetadata>, ProbeError>>,
    {
        let round = ctx.with_timeout(self.timeout);
        let deadline = round.deadline.unwrap_or_else(|| Instant::now() + self.timeout);

        let probes = hosts.iter().map(|host| {
            let fut = probe(host.clone());
            let cancel = round.cancellation();
            async move {
                HostCheckResult {
                    host: host.clone(),
                    result: run_probe(cancel, deadline, fut).await,
                }
            }
        });

        join_all(probes).await
    }
}

async fn run_probe<Fut>(cancel: &CancellationToken, deadline: Instant, probe: Fut) -> CheckResult
where
    Fut: Future<Output = Result<Option<CheckMetadata>, ProbeError>>,
{
    if cancel.is_cancelled() {
        return CheckResult::failure(Duration::ZERO, ProbeError::Cancelled);
    }

    let start = Instant::now();
    let budget = deadline.saturating_duration_since(start);

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProbeError::Cancelled),
        res = tokio::time::timeout_at(deadline, probe) => {
            res.unwrap_or(Err(ProbeError::Timeout(budget)))
        }
    };

    let elapsed = start.elapsed();
    match outcome {
        Ok(metadata) => CheckResult::success(elapsed, metadata),
        Err(e) => CheckResult::failure(elapsed, e),
    }
}
