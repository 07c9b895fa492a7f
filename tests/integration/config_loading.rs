//! Loading configuration files from disk

use std::io::Write;
use std::time::Duration;

use checkmate::config::{NotificationConfig, RuleMode, read_config_file};
use checkmate::monitor::MonitorOptions;
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"
monitor_site: dc-east
rule_debounce: 1m
notifications:
  - type: log
sites:
  - name: prod
    tags: [prod]
    groups:
      - name: web
        rule_mode: any
        tags: [web]
        hosts:
          - host: web-1.internal
          - host: web-2.internal
        checks:
          - protocol: https
            port: 443
            interval: 30
            verify_cert: true
          - protocol: Tcp
            port: 22
            interval: 2m
            rule_mode: all
rules:
  - name: web-down
    type: standard
    condition: "downtime > 2m and responseTime > 0"
    tags: [web]
    notifications: [log]
  - name: cert-expiring
    type: cert
    min_days_validity: 14
"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_read_full_config() {
    let file = write_config(FULL_CONFIG);
    let config = read_config_file(file.path()).unwrap();

    assert_eq!(config.notifications, vec![NotificationConfig::Log]);
    assert_eq!(config.rules.len(), 2);
    assert_eq!(config.rules[1].min_days_validity, 14);

    let group = &config.sites[0].groups[0];
    assert_eq!(group.rule_mode, Some(RuleMode::Any));
    assert_eq!(group.checks[0].protocol, "HTTPS");
    assert_eq!(group.checks[0].interval, "30s");
    assert_eq!(group.checks[1].protocol, "TCP");
    assert_eq!(group.checks[1].interval, "2m");

    let options = MonitorOptions::from_config(&config).unwrap();
    assert_eq!(options.rule_debounce, Some(Duration::from_secs(60)));
}

#[test]
fn test_missing_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");

    let err = read_config_file(&path).unwrap_err();
    assert!(err.to_string().contains("absent.yaml"));
}

#[test]
fn test_invalid_condition_fails_at_load_time() {
    let file = write_config(
        "monitor_site: dc-east\nrules:\n  - name: broken\n    type: standard\n    condition: '(downtime > 2m'\n",
    );

    let err = read_config_file(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("invalid condition in rule 'broken'"));
}

#[test]
fn test_malformed_yaml_is_rejected() {
    let file = write_config("monitor_site: [unterminated\n");
    assert!(read_config_file(file.path()).is_err());
}
