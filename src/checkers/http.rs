use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};

use super::{
    BaseChecker, CheckMetadata, Checker, HostCheckResult, ProbeContext, ProbeError, Protocol,
    TimeoutBounds, TimeoutError,
};

const HTTP_BOUNDS: TimeoutBounds = TimeoutBounds::new(
    Duration::from_secs(2),
    Duration::from_secs(20),
    Duration::from_secs(10),
);

pub(super) const USER_AGENT: &str = concat!("checkmate/", env!("CARGO_PKG_VERSION"));

/// `GET url`, treating any status `>= 400` as a failure.
pub(super) async fn get(client: &Client, url: &str) -> Result<Response, ProbeError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ProbeError::Request(e.to_string()))?;

    let status = response.status();
    if status.as_u16() >= 400 {
        return Err(ProbeError::Status(status.as_u16()));
    }

    Ok(response)
}

/// `scheme://host:port/`, bracketing IPv6 literals.
pub(super) fn root_url(scheme: &str, host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("{scheme}://[{host}]:{port}/")
    } else {
        format!("{scheme}://{host}:{port}/")
    }
}

/// Plain HTTP `GET /` check
#[derive(Debug, Clone)]
pub struct HttpChecker {
    base: BaseChecker,
    client: Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self, ProbeError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        Ok(Self {
            base: BaseChecker::new(HTTP_BOUNDS),
            client,
        })
    }

    async fn probe(&self, host: String, port: u16) -> Result<Option<CheckMetadata>, ProbeError> {
        let url = root_url("http", &host, port);
        get(&self.client, &url).await?;
        Ok(None)
    }
}

#[async_trait]
impl Checker for HttpChecker {
    fn protocol(&self) -> Protocol {
        Protocol::HTTP
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
