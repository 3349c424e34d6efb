use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::contract::{MetadataFetcher, PageMetadata};
use crate::error::Result;

/// Reads Open Graph (`og:*`) meta tags from a linked page.
pub struct OpenGraphFetcher {
    client: Client,
}

impl OpenGraphFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("feed-campaign/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetadataFetcher for OpenGraphFetcher {
    async fn fetch(&self, url: &str) -> Result<PageMetadata> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            // The page is still linked from the newsletter, just without a preview.
            warn!(url, status = response.status().as_u16(), "Page fetch failed, no preview metadata");
            return Ok(PageMetadata::new());
        }
        let html = response.text().await?;
        let metadata = extract_open_graph(&html);
        debug!(url, attributes = metadata.len(), "Extracted page metadata");
        Ok(metadata)
    }
}

/// Collects `<meta property="og:KEY" content="...">` pairs, keyed by `KEY`.
/// A key that appears twice keeps its last value.
pub fn extract_open_graph(html: &str) -> PageMetadata {
    let document = Html::parse_document(html);
    let selector = match Selector::parse("meta[property]") {
        Ok(selector) => selector,
        Err(_) => return PageMetadata::new(),
    };

    let mut metadata = PageMetadata::new();
    for meta in document.select(&selector) {
        let Some(key) = meta
            .value()
            .attr("property")
            .and_then(|p| p.strip_prefix("og:"))
        else {
            continue;
        };
        let content = meta.value().attr("content").unwrap_or_default();
        metadata.insert(key.to_string(), content.to_string());
    }
    metadata
}
