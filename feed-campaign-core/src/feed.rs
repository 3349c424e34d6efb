use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use reqwest::Client;
use tracing::info;

use crate::contract::{FeedEntry, FeedSource};
use crate::error::{Error, Result};

/// Fetches and parses a syndication feed (RSS, Atom or JSON Feed) over HTTP.
pub struct HttpFeedSource {
    client: Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("feed-campaign/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn entries(&self) -> Result<Vec<FeedEntry>> {
        let response = self.client.get(&self.url).send().await?;
        let response = Error::check_status("fetch feed", response).await?;
        let bytes = response.bytes().await?;
        let entries = parse_feed(&bytes)?;
        info!(feed_url = %self.url, entries = entries.len(), "Fetched feed");
        Ok(entries)
    }
}

/// Parses a feed document, keeping the feed's own entry order.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedEntry>> {
    let feed = parser::parse(bytes)?;
    Ok(feed.entries.into_iter().map(entry_from_feed).collect())
}

fn entry_from_feed(entry: feed_rs::model::Entry) -> FeedEntry {
    let link = select_link(&entry);
    // Atom feeds may only carry <updated>.
    let published = entry.published.or(entry.updated);
    let summary = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body));

    FeedEntry {
        id: entry.id,
        link,
        title: entry
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled".to_string()),
        summary,
        published,
    }
}

fn select_link(entry: &feed_rs::model::Entry) -> Option<String> {
    let usable = || entry.links.iter().filter(|l| !l.href.trim().is_empty());
    usable()
        .find(|l| {
            l.rel
                .as_deref()
                .map_or(true, |rel| rel.eq_ignore_ascii_case("alternate"))
        })
        .or_else(|| usable().next())
        .map(|l| l.href.trim().to_string())
        .or_else(|| {
            let id = entry.id.trim();
            (id.starts_with("http://") || id.starts_with("https://")).then(|| id.to_string())
        })
}
