//! populate-db command - seed the cache and ledger from upstream history

use anyhow::{Context, Result};

use stobot_adapters::news::ArcNewsClient;
use stobot_adapters::store::SqliteStore;
use stobot_domain::{FetchOptions, NewsSource, NewsStore, StoreOptions};

use crate::args::PopulateArgs;

pub async fn execute(args: PopulateArgs) -> Result<()> {
    tracing::info!(
        database_path = %args.database_path.display(),
        count = args.count,
        tags = ?args.tags,
        dry_run = args.dry_run,
        "populating database with historical news"
    );

    let store = SqliteStore::open(&args.database_path)
        .await
        .context("Failed to initialize database")?;
    let source = ArcNewsClient::new();

    let mut total_processed = 0usize;
    let mut total_cached = 0usize;

    for tag in &args.tags {
        tracing::info!(tag = %tag, "processing tag");

        let articles = match source.fetch(tag, args.count, FetchOptions::bulk()).await {
            Ok(articles) => articles,
            Err(error) => {
                tracing::error!(tag = %tag, error = %error, "failed to fetch news");
                continue;
            }
        };

        tracing::info!(tag = %tag, count = articles.len(), "fetched news items");

        if args.dry_run {
            tracing::info!(
                tag = %tag,
                count = articles.len(),
                "DRY RUN: would cache news items"
            );
        } else {
            if let Err(error) = store.cache_articles(&articles, StoreOptions::bulk()).await {
                tracing::error!(tag = %tag, error = %error, "failed to cache news items");
                continue;
            }

            let channels = store.registered_channels().await?;
            if channels.is_empty() {
                tracing::warn!("no registered channels found, skipping ledger population");
            } else {
                store
                    .mark_many_posted(&articles, &channels, StoreOptions::bulk())
                    .await
                    .context("Failed to mark news items as posted")?;
                tracing::info!(
                    articles = articles.len(),
                    channels = channels.len(),
                    "marked news items as posted"
                );
            }
            total_cached += articles.len();
        }

        total_processed += articles.len();
    }

    if args.dry_run {
        tracing::info!(total_processed, "DRY RUN COMPLETE");
    } else {
        tracing::info!(total_processed, total_cached, "populate complete");
    }

    Ok(())
}
