//! Channel registration with back-spam suppression
//!
//! Registering a channel that the store has never seen immediately marks
//! every currently cached article as posted to it, so the next poll tick
//! does not flood the channel with the whole cache. Failure to pre-mark
//! leaves the registration in place; `mark-all-posted` is the manual
//! recovery.

use crate::model::{Environment, StoreOptions};
use crate::ports::{NewsStore, StoreError};

/// Register `channel_id`, defaulting the environment to PROD when `None`.
/// Returns `true` when the channel was newly created.
pub async fn register_channel<S>(
    store: &S,
    channel_id: &str,
    environment: Option<Environment>,
) -> Result<bool, StoreError>
where
    S: NewsStore + ?Sized,
{
    let was_new = match environment {
        Some(env) => store.add_channel_with_environment(channel_id, env).await?,
        None => store.add_channel(channel_id).await?,
    };

    if !was_new {
        return Ok(false);
    }

    tracing::info!(
        channel_id = %channel_id,
        "new channel registered, marking existing news as posted"
    );

    match store.all_cached_articles().await {
        Ok(articles) if !articles.is_empty() => {
            match store
                .mark_many_posted(&articles, &[channel_id.to_string()], StoreOptions::bulk())
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        channel_id = %channel_id,
                        count = articles.len(),
                        "marked existing news as posted for new channel"
                    );
                }
                Err(error) => {
                    tracing::error!(
                        channel_id = %channel_id,
                        error = %error,
                        "failed to mark existing news as posted for new channel"
                    );
                }
            }
        }
        Ok(_) => {}
        Err(error) => {
            tracing::error!(
                channel_id = %channel_id,
                error = %error,
                "failed to read cached news for new channel"
            );
        }
    }

    Ok(true)
}
