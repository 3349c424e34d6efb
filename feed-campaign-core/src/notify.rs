use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::NotifyConfig;
use crate::contract::Notifier;
use crate::error::{Error, Result};

const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// Sends push notifications through Pushover.
pub struct PushoverNotifier {
    client: Client,
    config: NotifyConfig,
    endpoint: String,
}

impl PushoverNotifier {
    pub fn new(config: NotifyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("feed-campaign/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config,
            endpoint: PUSHOVER_API_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn notify(&self, title: &str, message: &str) -> Result<()> {
        let form = [
            ("token", self.config.api_token.as_str()),
            ("user", self.config.user_key.as_str()),
            ("message", message),
            ("title", title),
        ];
        let response = self.client.post(&self.endpoint).form(&form).send().await?;
        Error::check_status("send notification", response).await?;
        debug!(title, "Pushover notification delivered");
        Ok(())
    }
}
