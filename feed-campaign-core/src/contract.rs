//! # contract: the seams between a run and the outside world
//!
//! Every remote or durable collaborator of a run sits behind one of the traits
//! below, so the synchronisation and publish logic can be driven by real
//! clients in production and by `mockall` mocks in tests.
//!
//! - [`WatermarkStore`]: load/save the single progress timestamp.
//! - [`FeedSource`]: produce the raw entries of the syndication feed.
//! - [`MetadataFetcher`]: page-preview (`og:*`) attributes for a link.
//! - [`MailingList`]: the three calls of the mailing-list service API.
//! - [`Notifier`]: a best-effort out-of-band message.
//!
//! ## Mocking & Testing
//! Traits are annotated with `automock` under `cfg(test)` or the
//! `test-export-mocks` feature, so integration tests can import `Mock*` types.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::Result;
use crate::watermark::Watermark;

/// One entry as parsed from the feed, before filtering and enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub id: String,
    pub link: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    /// `None` when the entry carries no parseable date.
    pub published: Option<DateTime<Utc>>,
}

/// An entry that passed the watermark filter, with its page-preview data attached.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub id: String,
    pub link: String,
    pub title: String,
    pub summary: String,
    pub published: DateTime<Utc>,
    /// Preview image (`og:image`) of the linked page, if it has one.
    pub image: Option<String>,
    /// All `og:*` attributes of the linked page, keyed without the `og:` prefix.
    pub open_graph: PageMetadata,
}

/// Page-preview attributes, keyed without the `og:` prefix (`image`, `title`, ...).
pub type PageMetadata = BTreeMap<String, String>;

/// A recipient list as returned by the mailing-list service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailingListRef {
    pub id: i64,
    pub name: String,
}

/// Payload of the draft-campaign create call.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCampaign {
    pub name: String,
    pub subject: String,
    pub list_id: i64,
    /// Rendered markdown body.
    pub body: String,
    pub send_at: DateTime<Utc>,
}

/// What the service echoed back for a campaign call. The id is optional on
/// purpose: a 2xx answer without one is an inconsistency the caller must catch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CampaignAck {
    pub id: Option<i64>,
}

/// Durable home of the watermark. Both backends share this contract.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Returns [`Watermark::MIN`] when nothing was ever saved. "Not found" is never an error.
    async fn load(&self) -> Result<Watermark>;

    async fn save(&self, watermark: Watermark) -> Result<()>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// All entries of the feed, in the order the feed lists them.
    async fn entries(&self) -> Result<Vec<FeedEntry>>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PageMetadata>;
}

/// The mailing-list service, addressed by list and campaign identifiers.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MailingList: Send + Sync {
    /// Every list the account owns.
    async fn lists(&self) -> Result<Vec<MailingListRef>>;

    /// Create a draft campaign.
    async fn create_campaign(&self, campaign: NewCampaign) -> Result<CampaignAck>;

    /// Move a draft campaign to the scheduled state.
    async fn schedule_campaign(&self, campaign_id: i64) -> Result<CampaignAck>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, message: &str) -> Result<()>;
}
