//! HTTP client for the Listmonk mailing-list API.
//!
//! Implements [`MailingList`] over three endpoints, authenticated with HTTP
//! basic credentials:
//!
//! - `GET  /api/lists`                  list name -> id
//! - `POST /api/campaigns`              create a draft campaign
//! - `PUT  /api/campaigns/{id}/status`  move it to `scheduled`
//!
//! Send times are sent as UTC (`%Y-%m-%dT%H:%M:%SZ`); the server is assumed to
//! interpret them as such.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ListmonkConfig;
use crate::contract::{CampaignAck, MailingList, MailingListRef, NewCampaign};
use crate::error::{Error, Result};

pub const SEND_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Every Listmonk response wraps its payload in `data`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    results: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CampaignData {
    id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct CreateCampaignRequest<'a> {
    name: &'a str,
    subject: &'a str,
    lists: [i64; 1],
    body: &'a str,
    content_type: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    send_at: String,
}

#[derive(Debug, Serialize)]
struct StatusRequest {
    status: &'static str,
}

pub struct ListmonkClient {
    client: Client,
    config: ListmonkConfig,
}

impl std::fmt::Debug for ListmonkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListmonkClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ListmonkClient {
    pub fn new(config: ListmonkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("feed-campaign/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.host.trim_end_matches('/'), path)
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.config.api_user, Some(&self.config.api_token))
    }
}

fn campaign_ack(envelope: Envelope<CampaignData>) -> CampaignAck {
    CampaignAck {
        id: envelope.data.and_then(|d| d.id),
    }
}

#[async_trait]
impl MailingList for ListmonkClient {
    async fn lists(&self) -> Result<Vec<MailingListRef>> {
        let response = self
            .auth(self.client.get(self.url("/api/lists")))
            .query(&[("per_page", "all")])
            .send()
            .await?;
        let response = Error::check_status("list mailing lists", response).await?;
        let envelope: Envelope<ListPage> = response.json().await?;
        let page = envelope.data.ok_or_else(|| {
            Error::inconsistency("list mailing lists", "response did not contain data")
        })?;
        debug!(count = page.results.len(), "Fetched mailing lists");
        Ok(page
            .results
            .into_iter()
            .map(|l| MailingListRef {
                id: l.id,
                name: l.name,
            })
            .collect())
    }

    async fn create_campaign(&self, campaign: NewCampaign) -> Result<CampaignAck> {
        let request = CreateCampaignRequest {
            name: &campaign.name,
            subject: &campaign.subject,
            lists: [campaign.list_id],
            body: &campaign.body,
            content_type: "markdown",
            kind: "regular",
            send_at: campaign.send_at.format(SEND_AT_FORMAT).to_string(),
        };
        let response = self
            .auth(self.client.post(self.url("/api/campaigns")))
            .json(&request)
            .send()
            .await?;
        let response = Error::check_status("create campaign", response).await?;
        let ack = campaign_ack(response.json().await?);
        info!(campaign_id = ?ack.id, "Create campaign answered");
        Ok(ack)
    }

    async fn schedule_campaign(&self, campaign_id: i64) -> Result<CampaignAck> {
        let response = self
            .auth(
                self.client
                    .put(self.url(&format!("/api/campaigns/{campaign_id}/status"))),
            )
            .json(&StatusRequest {
                status: "scheduled",
            })
            .send()
            .await?;
        let response = Error::check_status("schedule campaign", response).await?;
        let ack = campaign_ack(response.json().await?);
        info!(campaign_id = ?ack.id, "Schedule campaign answered");
        Ok(ack)
    }
}
