//! Notification dispatch: log-only or webhook.

pub mod webhook;

use crate::config::NotifyConfig;
use crate::error::PilotError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

pub use webhook::WebhookNotifier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub plugin: String,
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), PilotError>;
}

/// Writes notifications to the log only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &Notification) -> Result<(), PilotError> {
        info!(plugin = %n.plugin, title = %n.title, "{}", n.body);
        Ok(())
    }
}

/// Send and swallow failures; a broken channel never fails a run.
pub async fn dispatch(notifier: &dyn Notifier, notification: &Notification) {
    if let Err(e) = notifier.notify(notification).await {
        warn!(
            plugin = %notification.plugin,
            error = %e,
            "failed to deliver notification"
        );
    }
}

pub fn from_config(cfg: &NotifyConfig, proxy: Option<&Url>) -> Result<Arc<dyn Notifier>, PilotError> {
    match cfg.webhook_url.clone() {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url, cfg.timeout_secs, proxy)?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
