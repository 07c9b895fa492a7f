//! HTTPS check with certificate inspection
//!
//! A successful probe attaches the leaf certificate's issuer and expiry so that
//! certificate rules can act on it. Verification of the chain is opt-in per check.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::tls::TlsInfo;
use tracing::debug;
use x509_parser::parse_x509_certificate;

use super::http::{USER_AGENT, get, root_url};
use super::{
    BaseChecker, CertInfo, CheckMetadata, CheckOptions, Checker, HostCheckResult, ProbeContext,
    ProbeError, Protocol, TimeoutBounds, TimeoutError,
};

// The TLS handshake needs a little more headroom than plain HTTP.
const HTTPS_BOUNDS: TimeoutBounds = TimeoutBounds::new(
    Duration::from_secs(3),
    Duration::from_secs(20),
    Duration::from_secs(12),
);

fn build_client(verify_cert: bool) -> Result<Client, ProbeError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .tls_info(true)
        .danger_accept_invalid_certs(!verify_cert)
        .build()
        .map_err(|e| ProbeError::Client(e.to_string()))
}

/// Extract issuer common name and expiry from a DER encoded certificate.
pub fn cert_info_from_der(der: &[u8]) -> Option<CertInfo> {
    let (_, cert) = parse_x509_certificate(der).ok()?;

    let expires_at = DateTime::<Utc>::from_timestamp(cert.validity().not_after.timestamp(), 0)?;
    let issued_by = cert
        .issuer()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();

    Some(CertInfo {
        issued_by,
        expires_at,
    })
}

#[derive(Debug, Clone)]
pub struct HttpsChecker {
    base: BaseChecker,
    client: Client,
    verify_cert: bool,
}

impl HttpsChecker {
    /// Checker that skips certificate verification until configured otherwise.
    pub fn new() -> Result<Self, ProbeError> {
        Ok(Self {
            base: BaseChecker::new(HTTPS_BOUNDS),
            client: build_client(false)?,
            verify_cert: false,
        })
    }

    pub fn verifies_certificates(&self) -> bool {
        self.verify_cert
    }

    async fn probe(&self, host: String, port: u16) -> Result<Option<CheckMetadata>, ProbeError> {
        let url = root_url("https", &host, port);
        let response = get(&self.client, &url).await?;

        let cert = response
            .extensions()
            .get::<TlsInfo>()
            .and_then(TlsInfo::peer_certificate)
            .and_then(cert_info_from_der);

        if cert.is_none() {
            debug!("{host}:{port} presented no readable certificate");
        }

        Ok(cert.map(CheckMetadata::Certificate))
    }
}

#[async_trait]
impl Checker for HttpsChecker {
    fn protocol(&self) -> Protocol {
        Protocol::HTTPS
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

    fn configure(&mut self, options: &CheckOptions) -> Result<(), ProbeError> {
        if options.verify_cert != self.verify_cert {
            self.client = build_client(options.verify_cert)?;
            self.verify_cert = options.verify_cert;
        }
        Ok(())
    }
}
