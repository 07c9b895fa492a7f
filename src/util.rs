use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::level_filters::LevelFilter;

const CHECKMATE_CONFIG: &str = "CHECKMATE_CONFIG";

const DEFAULT_CONFIG: &str = "config.yaml";

pub fn get_config_path() -> PathBuf {
    let path_from_env = std::env::var(CHECKMATE_CONFIG);
    path_from_env.map_or(PathBuf::from(DEFAULT_CONFIG), PathBuf::from)
}

const CHECKMATE_LOG: &str = "CHECKMATE_LOG";

const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::INFO;

pub fn get_log_level() -> LevelFilter {
    let level_from_env = std::env::var(CHECKMATE_LOG);
    level_from_env.map_or(DEFAULT_LOG_LEVEL, |res| {
        res.parse().unwrap_or(DEFAULT_LOG_LEVEL)
    })
}

/// Parse a duration written either as a bare number of seconds (`"30"`) or
/// in human form (`"30s"`, `"2m"`, `"1h30m"`, `"500ms"`).
pub fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value)
}

/// Appends the seconds unit to bare integer durations so they read the same
/// as the human form everywhere else.
pub fn normalize_duration_string(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.parse::<u64>().is_ok() {
        format!("{trimmed}s")
    } else {
        trimmed.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

impl From<RawDuration> for String {
    fn from(raw: RawDuration) -> Self {
        match raw {
            RawDuration::Seconds(secs) => secs.to_string(),
            RawDuration::Text(text) => text,
        }
    }
}

/// YAML writes `interval: 30` as an integer; keep it as text until it is parsed.
pub fn string_or_seconds<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawDuration::deserialize(deserializer).map(String::from)
}

pub fn opt_string_or_seconds<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawDuration>::deserialize(deserializer).map(|raw| raw.map(String::from))
}
