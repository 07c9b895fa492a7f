use async_trait::async_trait;
use tracing::{error, info, warn};

use super::{Level, Notification, Notifier, NotifyError};

/// Writes notifications to the tracing log at the matching level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn kind(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let Notification {
            message,
            level,
            site,
            group,
            host,
            port,
            protocol,
            tags,
        } = notification;
        let tags = tags.join(",");

        match level {
            Level::Info => {
                info!(%site, %group, %host, port, %protocol, %tags, "{message}")
            }
            Level::Warning => {
                warn!(%site, %group, %host, port, %protocol, %tags, "{message}")
            }
            Level::Error => {
                error!(%site, %group, %host, port, %protocol, %tags, "{message}")
            }
        }

        Ok(())
    }
}
