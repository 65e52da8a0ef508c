//! mark-all-posted command - ledger bulk insert of cache x channels
//!
//! Manual recovery tool for when the back-spam suppression on channel
//! registration could not run.

use anyhow::{Context, Result};

use stobot_adapters::store::SqliteStore;
use stobot_domain::{NewsStore, StoreOptions};

use crate::args::MarkPostedArgs;

pub async fn execute(args: MarkPostedArgs) -> Result<()> {
    tracing::info!(
        database_path = %args.database_path.display(),
        dry_run = args.dry_run,
        "marking all cached news as posted"
    );

    let store = SqliteStore::open(&args.database_path)
        .await
        .context("Failed to initialize database")?;

    let channels = store.registered_channels().await?;
    if channels.is_empty() {
        tracing::info!("no registered channels found");
        return Ok(());
    }

    let articles = store.all_cached_articles().await?;
    if articles.is_empty() {
        tracing::info!("no cached news items found");
        return Ok(());
    }

    tracing::info!(
        articles = articles.len(),
        channels = channels.len(),
        "found cached news and registered channels"
    );

    if args.dry_run {
        tracing::info!(
            operations = articles.len() * channels.len(),
            "DRY RUN: would mark news items as posted"
        );
        return Ok(());
    }

    store
        .mark_many_posted(&articles, &channels, StoreOptions::bulk())
        .await
        .context("Failed to mark news items as posted")?;

    tracing::info!(
        articles = articles.len(),
        channels = channels.len(),
        "successfully marked news items as posted"
    );
    Ok(())
}
