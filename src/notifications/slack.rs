//! Slack incoming-webhook notifier

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, instrument};

use super::{Level, Notification, Notifier, NotifyError};

const WEBHOOK_PREFIX: &str = "https://hooks.slack.com/services/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub color: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl Field {
    fn new(title: &str, value: impl ToString, short: bool) -> Self {
        Self {
            title: title.to_string(),
            value: value.to_string(),
            short,
        }
    }
}

pub fn color_for(level: Level) -> &'static str {
    match level {
        Level::Error => "#FF0000",   // Red
        Level::Warning => "#FFA500", // Orange
        Level::Info => "#36a64f",    // Green
    }
}

pub fn build_message(notification: &Notification) -> Message {
    Message {
        text: notification.message.clone(),
        attachments: vec![Attachment {
            color: color_for(notification.level).to_string(),
            fields: vec![
                Field::new("Site", &notification.site, true),
                Field::new("Group", &notification.group, true),
                Field::new("Host", &notification.host, true),
                Field::new("Protocol", &notification.protocol, true),
                Field::new("Port", notification.port, true),
                Field::new("Tags", notification.tags.join(", "), false),
            ],
        }],
    }
}

#[derive(Debug, Clone)]
pub struct SlackNotifier {
    client: Client,
    webhook_url: String,
}

impl SlackNotifier {
    /// Notifier for a `https://hooks.slack.com/services/...` webhook.
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, NotifyError> {
        let webhook_url = webhook_url.into();
        if !webhook_url.starts_with(WEBHOOK_PREFIX) {
            return Err(NotifyError::InvalidWebhookUrl);
        }
        Self::unchecked(webhook_url)
    }

    /// Skips the webhook host check, for proxies and test servers.
    pub fn unchecked(webhook_url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("checkmate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn kind(&self) -> &str {
        "slack"
    }

    #[instrument(skip_all, fields(level = %notification.level, host = %notification.host))]
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = build_message(notification);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(NotifyError::RateLimited);
        }
        if status.as_u16() >= 400 {
            if let Ok(body) = response.text().await {
                debug!("Slack API error response: {body}");
            }
            return Err(NotifyError::Status(status.as_u16()));
        }

        debug!("Successfully sent Slack message");
        Ok(())
    }
}
