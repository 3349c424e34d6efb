//! One end-to-end run: watermark -> synchronise -> render -> publish -> watermark.
//!
//! # Watermark contract
//! - Loaded once at the start, saved at most once at the end.
//! - Saved only after a successful publish. Any error before that leaves the
//!   stored watermark untouched, so the next run picks up the same items.
//! - Not advanced when nothing new was found.
//! - Never advanced in dry-run mode.
//! - The saved value is the run's start time (never earlier than the loaded
//!   watermark), so items published while the run was in flight are seen again.
//! - The campaign send time is taken from the clock at publish time, not from
//!   the start time, so a slow run never schedules into the past.
//!
//! # Concurrency
//! Runs must not overlap. Nothing here locks the watermark; the scheduler that
//! triggers runs is responsible for exclusivity.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::Settings;
use crate::contract::{FeedSource, MailingList, MetadataFetcher, Notifier, WatermarkStore};
use crate::error::{Error, Result};
use crate::publish::{CampaignPublisher, PublishOutcome};
use crate::render::Template;
use crate::synchronise::synchronise;
use crate::watermark::Watermark;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Render and report, but publish nothing and keep the watermark.
    pub dry_run: bool,
}

/// Borrowed collaborators of a run.
pub struct Collaborators<'a> {
    pub store: &'a dyn WatermarkStore,
    pub feed: &'a dyn FeedSource,
    pub metadata: &'a dyn MetadataFetcher,
    /// Only needed when not in dry-run mode.
    pub mailing_list: Option<&'a dyn MailingList>,
    pub notifier: Option<&'a dyn Notifier>,
}

#[derive(Debug)]
pub enum RunOutcome {
    NothingNew {
        watermark: Watermark,
    },
    DryRun {
        items: usize,
        content: String,
    },
    Published {
        items: usize,
        campaign: PublishOutcome,
        watermark: Watermark,
    },
}

pub async fn run_once(
    settings: &Settings,
    template: &Template,
    deps: Collaborators<'_>,
    options: RunOptions,
    started_at: DateTime<Utc>,
) -> Result<RunOutcome> {
    info!(dry_run = options.dry_run, "[RUN] Starting run");

    let loaded = deps.store.load().await?;
    info!(watermark = %loaded, "[RUN] Loaded watermark");

    let items = synchronise(deps.feed, deps.metadata, loaded).await?;
    if items.is_empty() {
        info!(watermark = %loaded, "[RUN] No new items, keeping watermark");
        return Ok(RunOutcome::NothingNew { watermark: loaded });
    }

    let content = template.render(&items)?;
    info!(items = items.len(), bytes = content.len(), "[RUN] Campaign body rendered");

    if options.dry_run {
        info!("[RUN] Dry run, skipping publish and watermark update");
        return Ok(RunOutcome::DryRun {
            items: items.len(),
            content,
        });
    }

    let (Some(service), Some(listmonk)) = (deps.mailing_list, settings.listmonk.as_ref()) else {
        return Err(Error::configuration(
            "mailing-list service settings are required to publish",
        ));
    };
    let campaign = CampaignPublisher::new(service, listmonk.list_name.clone(), settings.campaign.clone())
        .with_notifier(deps.notifier)
        .publish(&content, Utc::now())
        .await?;

    let next = Watermark::new(started_at).max(loaded);
    if next == loaded {
        warn!(watermark = %loaded, "[RUN] Clock is behind the stored watermark, keeping it");
    }
    deps.store.save(next).await?;
    info!(
        campaign_id = campaign.campaign_id,
        watermark = %next,
        "[RUN] Run complete"
    );

    Ok(RunOutcome::Published {
        items: items.len(),
        campaign,
        watermark: next,
    })
}
