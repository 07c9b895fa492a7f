//! Host and service availability monitoring.
//!
//! Hosts are grouped into sites and groups; each group declares protocol
//! checks that run on a fixed interval. Results feed a downtime accumulator
//! and a set of rules whose satisfied conditions are sent out as
//! notifications.

pub mod checkers;
pub mod config;
pub mod metrics;
pub mod monitor;
pub mod notifications;
pub mod rules;
pub mod tags;
pub mod util;

pub use checkers::{Checker, CheckerRegistry, Protocol};
pub use config::{Config, read_config_file};
pub use monitor::{Monitor, MonitorHandle, MonitorOptions, UnitResources};
pub use notifications::{Notification, NotifierSet};
pub use rules::Rule;
