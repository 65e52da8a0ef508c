//! import-channels command - load channels.txt records into the store

use anyhow::{Context, Result};

use stobot_adapters::channels_file::read_channels_file;
use stobot_adapters::store::SqliteStore;
use stobot_domain::NewsStore;

use crate::args::ImportArgs;

pub async fn execute(args: ImportArgs) -> Result<()> {
    tracing::info!(
        channels_file = %args.channels_file.display(),
        database_path = %args.database_path.display(),
        "importing channels"
    );

    let store = SqliteStore::open(&args.database_path)
        .await
        .context("Failed to initialize database")?;

    let records = read_channels_file(&args.channels_file)
        .with_context(|| format!("Failed to read {}", args.channels_file.display()))?;

    let mut imported = 0usize;
    let mut skipped = 0usize;

    for record in records {
        let existing = store.channel_platforms(&record.channel_id).await?;
        if !existing.is_empty() {
            tracing::info!(
                channel_id = %record.channel_id,
                platforms = %existing.join(","),
                "channel already exists, skipping"
            );
            skipped += 1;
            continue;
        }

        // Imports insert directly: pre-marking the cache as posted is the
        // registration path's concern, not the bulk import's.
        store.add_channel(&record.channel_id).await?;
        store
            .update_channel_platforms(&record.channel_id, &record.platforms)
            .await?;

        tracing::info!(
            channel_id = %record.channel_id,
            platforms = %record.platforms.join(","),
            "imported channel"
        );
        imported += 1;
    }

    tracing::info!(imported, skipped, "import completed");
    Ok(())
}
