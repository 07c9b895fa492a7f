//! Notifier construction and dispatch

use assert_matches::assert_matches;
use checkmate::config::NotificationConfig;
use checkmate::notifications::{
    Level, Notification, NotifierSet, NotifyError, SlackNotifier, send_rule_notifications,
};
use checkmate::rules::Rule;
use pretty_assertions::assert_eq;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::RecordingNotifier;

fn create_notification(level: Level) -> Notification {
    Notification {
        message: "Rule condition met: db-down (all hosts down)".to_string(),
        level,
        site: "dc-east".to_string(),
        group: "db".to_string(),
        host: "db-1".to_string(),
        port: 5432,
        protocol: "TCP".to_string(),
        tags: vec!["prod".to_string()],
    }
}

#[test]
fn test_notifier_set_from_config() {
    let set = NotifierSet::from_config(&[
        NotificationConfig::Log,
        NotificationConfig::Slack {
            webhook_url: "https://hooks.slack.com/services/T0/B0/secret".to_string(),
        },
    ])
    .unwrap();

    assert_eq!(set.kinds(), vec!["log", "slack"]);
}

#[test]
fn test_bad_slack_webhook_is_rejected() {
    let err = NotifierSet::from_config(&[NotificationConfig::Slack {
        webhook_url: "http://example.com/hook".to_string(),
    }])
    .unwrap_err();

    assert_eq!(err, NotifyError::InvalidWebhookUrl);
}

#[tokio::test]
async fn test_slack_and_log_delivery() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let set = NotifierSet::from_config(&[NotificationConfig::Log])
        .unwrap()
        .with(SlackNotifier::unchecked(mock_server.uri()).unwrap());

    let delivered = send_rule_notifications(
        &Rule::standard("db-down", "downtime > 1m"),
        &create_notification(Level::Warning),
        &set,
    )
    .await
    .unwrap();

    assert_eq!(delivered, 2);
}

#[tokio::test]
async fn test_dispatch_error_lists_failed_notifiers() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let recorder = RecordingNotifier::new("log");
    let set = NotifierSet::new()
        .with(recorder.clone())
        .with(SlackNotifier::unchecked(mock_server.uri()).unwrap());

    let err = send_rule_notifications(
        &Rule::standard("db-down", "downtime > 1m"),
        &create_notification(Level::Error),
        &set,
    )
    .await
    .unwrap_err();

    assert_eq!(err.delivered, 1);
    assert_eq!(
        err.failures,
        vec![("slack".to_string(), NotifyError::Status(500))]
    );
    assert_eq!(recorder.seen().len(), 1);
}

#[tokio::test]
async fn test_unconfigured_kinds_are_skipped() {
    let recorder = RecordingNotifier::new("log");
    let set = NotifierSet::new().with(recorder.clone());
    let rule = Rule::standard("db-down", "downtime > 1m").with_notifications(&["pagerduty"]);

    let delivered = send_rule_notifications(&rule, &create_notification(Level::Warning), &set)
        .await
        .unwrap();

    assert_eq!(delivered, 0);
    assert!(recorder.seen().is_empty());
}

#[tokio::test]
async fn test_unreachable_slack_endpoint() {
    let port = crate::helpers::closed_port().await;
    let notifier = SlackNotifier::unchecked(format!("http://127.0.0.1:{port}/hook")).unwrap();
    let set = NotifierSet::new().with(notifier);

    let err = send_rule_notifications(
        &Rule::standard("db-down", "downtime > 1m"),
        &create_notification(Level::Error),
        &set,
    )
    .await
    .unwrap_err();

    assert_matches!(err.failures[0].1, NotifyError::Request(_));
}
