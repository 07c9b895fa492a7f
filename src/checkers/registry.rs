//! Protocol name → checker factory lookup
//!
//! The registry is built once at startup and handed to the monitor; it is
//! cheap to clone and safe to read from many tasks.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::{Checker, DnsChecker, HttpChecker, HttpsChecker, ProbeError, SmtpChecker, TcpChecker};

/// Canonical (uppercase) protocol identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Protocol(Cow<'static, str>);

impl Protocol {
    pub const TCP: Protocol = Protocol(Cow::Borrowed("TCP"));
    pub const HTTP: Protocol = Protocol(Cow::Borrowed("HTTP"));
    pub const HTTPS: Protocol = Protocol(Cow::Borrowed("HTTPS"));
    pub const SMTP: Protocol = Protocol(Cow::Borrowed("SMTP"));
    pub const DNS: Protocol = Protocol(Cow::Borrowed("DNS"));

    pub fn new(name: impl AsRef<str>) -> Self {
        Protocol(Cow::Owned(name.as_ref().trim().to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Protocol {
    fn from(value: &str) -> Self {
        Protocol::new(value)
    }
}

impl From<String> for Protocol {
    fn from(value: String) -> Self {
        Protocol::new(value)
    }
}

/// Builds a fresh checker for one monitoring unit
pub type CheckerFactory = Arc<dyn Fn() -> Result<Box<dyn Checker>, ProbeError> + Send + Sync>;

/// Wrap a typed constructor as a [`CheckerFactory`].
pub fn factory<C, F>(build: F) -> CheckerFactory
where
    C: Checker + 'static,
    F: Fn() -> Result<C, ProbeError> + Send + Sync + 'static,
{
    Arc::new(move || build().map(|checker| Box::new(checker) as Box<dyn Checker>))
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no checker registered for protocol: {protocol} (valid protocols: {})", join(.available))]
    UnknownProtocol {
        protocol: Protocol,
        available: Vec<Protocol>,
    },

    #[error("failed to create {protocol} checker: {source}")]
    Construction {
        protocol: Protocol,
        #[source]
        source: ProbeError,
    },
}

fn join(protocols: &[Protocol]) -> String {
    protocols
        .iter()
        .map(Protocol::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Clone, Default)]
pub struct CheckerRegistry {
    factories: Arc<RwLock<HashMap<Protocol, CheckerFactory>>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with TCP, HTTP, HTTPS, SMTP and DNS.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Protocol::TCP, factory(|| Ok(TcpChecker::new())));
        registry.register(Protocol::HTTP, factory(HttpChecker::new));
        registry.register(Protocol::HTTPS, factory(HttpsChecker::new));
        registry.register(Protocol::SMTP, factory(|| Ok(SmtpChecker::new())));
        registry.register(Protocol::DNS, factory(|| Ok(DnsChecker::new())));
        registry
    }

    /// Register a factory; a later registration for the same protocol wins.
    pub fn register(&self, protocol: impl Into<Protocol>, factory: CheckerFactory) {
        let protocol = protocol.into();
        debug!("registering checker for {protocol}");
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(protocol, factory);
    }

    /// Construct a new checker instance for `protocol` (case-insensitive).
    pub fn get(&self, protocol: impl Into<Protocol>) -> Result<Box<dyn Checker>, RegistryError> {
        let protocol = protocol.into();
        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&protocol)
            .cloned();

        match factory {
            Some(factory) => {
                factory().map_err(|source| RegistryError::Construction { protocol, source })
            }
            None => Err(RegistryError::UnknownProtocol {
                protocol,
                available: self.protocols(),
            }),
        }
    }

    /// Registered protocols, sorted.
    pub fn protocols(&self) -> Vec<Protocol> {
        let mut protocols: Vec<Protocol> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        protocols.sort();
        protocols
    }
}

impl fmt::Debug for CheckerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckerRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}
