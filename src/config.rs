use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::rules::{Rule, RuleType, validate_condition};
use crate::util::{
    normalize_duration_string, opt_string_or_seconds, parse_duration, string_or_seconds,
};

/// When a group's failure condition counts as "down"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    /// Only when every host is down
    #[default]
    All,

    /// As soon as one host is down; notifications go out per failing host
    Any,
}

/// Check-level mode wins over group-level, which wins over [`RuleMode::All`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleModeResolver {
    group: Option<RuleMode>,
    check: Option<RuleMode>,
}

impl RuleModeResolver {
    pub fn new(group: Option<RuleMode>, check: Option<RuleMode>) -> Self {
        Self { group, check }
    }

    pub fn effective(&self) -> RuleMode {
        self.check.or(self.group).unwrap_or_default()
    }

    pub fn should_trigger(&self, any_down: bool, all_down: bool) -> bool {
        match self.effective() {
            RuleMode::Any => any_down,
            RuleMode::All => all_down,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotificationConfig {
    Log,
    Slack { webhook_url: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Name of the site this monitor runs in
    #[serde(default)]
    pub monitor_site: String,

    /// Minimum time between two evaluations of the same rule in one unit
    #[serde(default, deserialize_with = "opt_string_or_seconds")]
    pub rule_debounce: Option<String>,

    #[serde(default)]
    pub notifications: Vec<NotificationConfig>,

    #[serde(default)]
    pub sites: Vec<SiteConfig>,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,

    #[serde(default)]
    pub rule_mode: Option<RuleMode>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub hosts: Vec<HostConfig>,

    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

impl GroupConfig {
    pub fn host_names(&self) -> Vec<String> {
        self.hosts.iter().map(|h| h.host.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub host: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfig {
    pub protocol: String,

    #[serde(default)]
    pub port: u16,

    /// `30`, `"30s"`, `"1m"`...
    #[serde(default, deserialize_with = "string_or_seconds")]
    pub interval: String,

    #[serde(default)]
    pub rule_mode: Option<RuleMode>,

    #[serde(default)]
    pub verify_cert: bool,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl Config {
    /// Parse YAML text, substituting `${VAR}` references through `lookup`.
    pub fn parse_with_env<F>(text: &str, lookup: F) -> anyhow::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = substitute_env(text, lookup)?;
        let mut config: Config =
            serde_yaml::from_str(&expanded).context("Invalid configuration file provided!")?;

        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn parse(text: &str) -> anyhow::Result<Config> {
        Self::parse_with_env(text, |name| std::env::var(name).ok())
    }

    /// Uppercase protocols and give bare-integer intervals a seconds unit.
    pub fn normalize(&mut self) {
        for check in self
            .sites
            .iter_mut()
            .flat_map(|site| site.groups.iter_mut())
            .flat_map(|group| group.checks.iter_mut())
        {
            check.protocol = check.protocol.trim().to_uppercase();
            check.interval = normalize_duration_string(&check.interval);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.monitor_site.trim().is_empty() {
            bail!("monitor_site must be specified");
        }

        for site in &self.sites {
            if site.name.trim().is_empty() {
                bail!("site name cannot be empty");
            }
            for group in &site.groups {
                if group.name.trim().is_empty() {
                    bail!("invalid group in site '{}': group name cannot be empty", site.name);
                }
            }
        }

        for rule in &self.rules {
            let rule_type = rule
                .validate()
                .with_context(|| format!("invalid rule '{}'", rule.name))?;
            if rule_type == RuleType::Standard {
                validate_condition(&rule.condition)
                    .with_context(|| format!("invalid condition in rule '{}'", rule.name))?;
            }
        }

        self.debounce()?;
        Ok(())
    }

    /// The configured rule debounce window; `None` when absent or zero.
    pub fn debounce(&self) -> anyhow::Result<Option<Duration>> {
        let Some(window) = &self.rule_debounce else {
            return Ok(None);
        };

        let window = parse_duration(window)
            .with_context(|| format!("invalid rule_debounce '{window}'"))?;
        Ok((!window.is_zero()).then_some(window))
    }
}

/// Replace `${VAR}` and `${VAR:-default}`; unset variables without a default become empty.
pub fn substitute_env<F>(text: &str, lookup: F) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")?;

    let expanded = pattern.replace_all(text, |caps: &Captures| {
        let value = lookup(&caps[1]).filter(|value| !value.is_empty());
        match (value, caps.get(2)) {
            (Some(value), _) => value,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => String::new(),
        }
    });

    Ok(expanded.into_owned())
}

pub fn read_config_file(path: &Path) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    Config::parse(&text)
        .with_context(|| format!("failed to load config from {}", path.display()))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
