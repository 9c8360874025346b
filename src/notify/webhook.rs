use super::{Notification, Notifier};
use crate::error::PilotError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// POSTs each notification as JSON (`{plugin, title, body}`).
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: Url, timeout_secs: u64, proxy: Option<&Url>) -> Result<Self, PilotError> {
        let mut builder = reqwest::Client::builder()
            .user_agent("forum-pilot/notify")
            .timeout(Duration::from_secs(timeout_secs.max(1)));
        if let Some(proxy_url) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }
        Ok(Self {
            client: builder.build()?,
            url,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, n: &Notification) -> Result<(), PilotError> {
        let resp = self.client.post(self.url.clone()).json(n).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PilotError::UpstreamStatus(status));
        }
        debug!(plugin = %n.plugin, %status, "webhook notification delivered");
        Ok(())
    }
}
