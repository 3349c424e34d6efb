//! Feed synchronisation: decides which feed entries are new and enriches them.
//!
//! Given the watermark of the last successful run, [`synchronise`]:
//!   - Fetches every entry of the feed through a [`FeedSource`]
//!   - Keeps entries whose publish time is strictly after the watermark
//!   - Fetches page-preview metadata for each kept entry through a [`MetadataFetcher`]
//!     and attaches the preview image when the page declares one
//!
//! # Ordering
//! The returned items keep the order of the feed document. Feeds are not
//! required to be chronological and the result is not re-sorted.
//!
//! # Untrusted input
//! Entries without a usable date or link are skipped with a `warn!` diagnostic
//! instead of failing the run. Transport failures of the feed or metadata
//! fetch abort the run.
//!
//! # Empty result
//! An empty vector is a normal outcome meaning "nothing new". Callers stop
//! there without rendering or publishing.

use tracing::{debug, info, warn};

use crate::contract::{FeedItem, FeedSource, MetadataFetcher};
use crate::error::Result;
use crate::watermark::Watermark;

pub async fn synchronise<S, M>(
    source: &S,
    fetcher: &M,
    watermark: Watermark,
) -> Result<Vec<FeedItem>>
where
    S: FeedSource + ?Sized,
    M: MetadataFetcher + ?Sized,
{
    info!(%watermark, "[SYNC] Starting feed synchronisation");

    let entries = source.entries().await?;
    info!(total = entries.len(), "[SYNC] Feed entries fetched");

    let mut items = Vec::new();
    for entry in entries {
        let Some(published) = entry.published else {
            warn!(id = %entry.id, title = %entry.title, "[SYNC] Skipping entry without a publish date");
            continue;
        };
        if !watermark.admits(published) {
            debug!(id = %entry.id, %published, "[SYNC] Entry not newer than watermark");
            continue;
        }
        let Some(link) = entry.link else {
            warn!(id = %entry.id, title = %entry.title, "[SYNC] Skipping entry without a link");
            continue;
        };

        let open_graph = fetcher.fetch(&link).await?;
        let image = open_graph.get("image").filter(|i| !i.is_empty()).cloned();
        debug!(%link, has_image = image.is_some(), "[SYNC] Entry enriched");

        items.push(FeedItem {
            id: entry.id,
            link,
            title: entry.title,
            summary: entry.summary.unwrap_or_default(),
            published,
            image,
            open_graph,
        });
    }

    info!(new_items = items.len(), "[SYNC] Synchronisation complete");
    Ok(items)
}
