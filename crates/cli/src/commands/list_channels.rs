//! list-channels command

use anyhow::{Context, Result};

use stobot_adapters::store::SqliteStore;
use stobot_domain::NewsStore;

use crate::args::ListArgs;

pub async fn execute(args: ListArgs) -> Result<()> {
    let store = SqliteStore::open(&args.database_path)
        .await
        .context("Failed to initialize database")?;

    let channels = store.registered_channels().await?;
    if channels.is_empty() {
        tracing::info!("no channels registered in database");
        return Ok(());
    }

    tracing::info!(count = channels.len(), "registered channels");
    for channel_id in channels {
        let platforms = store.channel_platforms(&channel_id).await?;
        let environment = store.channel_environment(&channel_id).await?;
        tracing::info!(
            channel_id = %channel_id,
            platforms = %platforms.join(","),
            environment = %environment,
            "channel"
        );
    }

    Ok(())
}
