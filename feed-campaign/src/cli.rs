//! Command-line interface for feed-campaign: argument parsing and wiring of
//! the real collaborators for a single run.
//!
//! All run logic (watermarking, synchronisation, rendering, publishing) lives
//! in `feed-campaign-core`; this module builds the HTTP clients and stores from
//! [`Settings`](feed_campaign_core::config::Settings), hands them to
//! [`run_once`] and reports the outcome.
//!
//! For programmatic use and integration tests, call [`run`] with a constructed [`Cli`].

use crate::load_config::{load_config, Overrides};
use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use feed_campaign_core::contract::{MailingList, Notifier};
use feed_campaign_core::feed::HttpFeedSource;
use feed_campaign_core::listmonk::ListmonkClient;
use feed_campaign_core::metadata::OpenGraphFetcher;
use feed_campaign_core::notify::PushoverNotifier;
use feed_campaign_core::pipeline::{run_once, Collaborators, RunOptions, RunOutcome};
use feed_campaign_core::render::Template;
use feed_campaign_core::watermark::build_store;
use std::path::PathBuf;

/// Turn new feed items into a scheduled newsletter campaign.
#[derive(Parser, Debug)]
#[clap(
    name = "feed-campaign",
    version,
    about = "Publish new RSS/Atom items as a scheduled Listmonk campaign"
)]
pub struct Cli {
    /// Render the campaign and print it; nothing is sent and the watermark is kept
    #[clap(long)]
    pub dry_run: bool,

    /// Keep the watermark in this JSON file instead of the configured backend
    #[clap(long)]
    pub state_file: Option<PathBuf>,

    /// Template used for the campaign body (default: template.md.j2)
    #[clap(long)]
    pub template: Option<PathBuf>,

    /// Optional YAML file with non-secret settings
    #[clap(long)]
    pub config: Option<PathBuf>,
}

/// Async entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let overrides = Overrides {
        dry_run: cli.dry_run,
        state_file: cli.state_file,
        template: cli.template,
    };
    let settings = load_config(cli.config.as_deref(), &overrides)?;
    settings.trace_loaded();

    let template = Template::load(&settings.template_path).await?;
    let store = build_store(&settings.state)?;
    let feed = HttpFeedSource::new(settings.feed_url.clone())?;
    let metadata = OpenGraphFetcher::new()?;
    let mailing_list = match &settings.listmonk {
        Some(config) if !cli.dry_run => Some(ListmonkClient::new(config.clone())?),
        _ => None,
    };
    let notifier = settings
        .notify
        .clone()
        .map(PushoverNotifier::new)
        .transpose()?;

    let deps = Collaborators {
        store: store.as_ref(),
        feed: &feed,
        metadata: &metadata,
        mailing_list: mailing_list.as_ref().map(|c| c as &dyn MailingList),
        notifier: notifier.as_ref().map(|n| n as &dyn Notifier),
    };
    let options = RunOptions {
        dry_run: cli.dry_run,
    };

    match run_once(&settings, &template, deps, options, Utc::now()).await {
        Ok(RunOutcome::NothingNew { watermark }) => {
            tracing::info!(%watermark, "Run complete, nothing new");
            println!("No new items found since {watermark}.");
            Ok(())
        }
        Ok(RunOutcome::DryRun { items, content }) => {
            tracing::info!(items, "Dry run complete");
            println!("Dry run - would send campaign with {items} item(s) and content:");
            println!("{content}");
            Ok(())
        }
        Ok(RunOutcome::Published {
            items,
            campaign,
            watermark,
        }) => {
            tracing::info!(
                items,
                campaign_id = campaign.campaign_id,
                %watermark,
                "Run complete, campaign scheduled"
            );
            println!(
                "Scheduled campaign {} with {items} item(s) for {}.",
                campaign.campaign_id,
                campaign.send_at.to_rfc3339()
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            Err(e.into())
        }
    }
}
