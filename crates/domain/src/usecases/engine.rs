//! Delivery engine - poller ticks, per-channel dispatch, and catch-up
//!
//! Composes the store, the upstream feed, and the chat service. All
//! persistent state lives in the store; the engine itself only holds
//! handles and immutable configuration.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::model::{Article, Environment, FetchOptions, StoreOptions};
use crate::ports::{ChatError, ChatService, Clock, NewsSource, NewsStore};
use crate::usecases::dedup;

/// Tags the startup catch-up pass fetches.
pub const CATCHUP_TAGS: [&str; 2] = ["star-trek-online", "patch-notes"];

/// Days of history the startup catch-up pass covers.
pub const CATCHUP_DAYS: i64 = 7;

/// Immutable engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Articles fetched per poll tick.
    pub poll_count: usize,
    /// Upper bound on `now - updated` for freshness queries.
    pub fresh_window: Duration,
    /// Messages inspected by the duplicate-suppression heuristic.
    pub recent_messages: usize,
    /// When set, only channels in this environment are serviced.
    pub environment: Option<Environment>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_count: 20,
            fresh_window: Duration::from_secs(600),
            recent_messages: 10,
            environment: None,
        }
    }
}

/// The delivery engine.
///
/// One instance is shared by the poller ticker and the startup catch-up
/// task. Cloning is cheap; per-channel workers each get a clone.
pub struct DeliveryEngine<St, So, Ch, Cl>
where
    St: NewsStore + ?Sized,
    So: NewsSource + ?Sized,
    Ch: ChatService + ?Sized,
    Cl: Clock + ?Sized,
{
    store: Arc<St>,
    source: Arc<So>,
    chat: Arc<Ch>,
    clock: Arc<Cl>,
    config: EngineConfig,
}

impl<St, So, Ch, Cl> Clone for DeliveryEngine<St, So, Ch, Cl>
where
    St: NewsStore + ?Sized,
    So: NewsSource + ?Sized,
    Ch: ChatService + ?Sized,
    Cl: Clock + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            source: Arc::clone(&self.source),
            chat: Arc::clone(&self.chat),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<St, So, Ch, Cl> DeliveryEngine<St, So, Ch, Cl>
where
    St: NewsStore + ?Sized + 'static,
    So: NewsSource + ?Sized + 'static,
    Ch: ChatService + ?Sized + 'static,
    Cl: Clock + ?Sized + 'static,
{
    pub fn new(
        store: Arc<St>,
        source: Arc<So>,
        chat: Arc<Ch>,
        clock: Arc<Cl>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            source,
            chat,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One poll tick: enumerate target channels, dispatch one worker per
    /// channel, then purge cache entries past the retention window.
    ///
    /// A failure in one channel's worker never affects the others; the
    /// ledger makes re-attempts on later ticks safe.
    pub async fn poll_once(&self) {
        let channels = match self.config.environment {
            Some(environment) => self.store.channels_for_environment(environment).await,
            None => self.store.registered_channels().await,
        };

        let channels = match channels {
            Ok(channels) => channels,
            Err(error) => {
                tracing::error!(error = %error, "failed to get registered channels");
                return;
            }
        };

        if channels.is_empty() {
            tracing::debug!("no registered channels found");
            return;
        }

        let mut workers = JoinSet::new();
        for channel_id in channels {
            let engine = self.clone();
            workers.spawn(async move {
                engine.process_channel(&channel_id).await;
            });
        }
        while workers.join_next().await.is_some() {}

        match self.store.purge_old_articles().await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "cleaned old cache entries"),
            Err(error) => tracing::error!(error = %error, "failed to clean old cache"),
        }
    }

    /// Per-channel dispatch: fetch the whole feed, cache it, post every
    /// article the ledger does not yet record for this channel.
    ///
    /// Posts preserve upstream order (newest first). Caching is best
    /// effort; a cache failure does not stop posting.
    pub async fn process_channel(&self, channel_id: &str) {
        if let Some(environment) = self.config.environment {
            match self.store.channel_environment(channel_id).await {
                Ok(channel_env) if channel_env != environment => {
                    tracing::debug!(
                        channel_id = %channel_id,
                        channel_env = %channel_env,
                        bot_env = %environment,
                        "skipping channel from other environment"
                    );
                    return;
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::error!(channel_id = %channel_id, error = %error, "failed to get channel environment");
                    return;
                }
            }
        }

        let platforms = match self.store.channel_platforms(channel_id).await {
            Ok(platforms) => platforms,
            Err(error) => {
                tracing::error!(channel_id = %channel_id, error = %error, "failed to get channel platforms");
                return;
            }
        };
        if platforms.is_empty() {
            tracing::debug!(channel_id = %channel_id, "channel not registered");
            return;
        }

        let articles = match self
            .source
            .fetch("", self.config.poll_count, FetchOptions::default())
            .await
        {
            Ok(articles) => articles,
            Err(error) => {
                tracing::error!(error = %error, "failed to fetch news");
                return;
            }
        };

        if let Err(error) = self
            .store
            .cache_articles(&articles, StoreOptions::default())
            .await
        {
            tracing::error!(error = %error, "failed to cache news items");
        }

        for article in &articles {
            match self.store.is_posted(article.id, channel_id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(error) => {
                    tracing::error!(article_id = article.id, error = %error, "failed to check if news is posted");
                    continue;
                }
            }

            if let Err(error) = self.chat.post_article(channel_id, article).await {
                tracing::error!(
                    article_id = article.id,
                    channel_id = %channel_id,
                    error = %error,
                    "failed to post news"
                );
                continue;
            }

            if let Err(error) = self
                .store
                .mark_posted(article.id, channel_id, StoreOptions::default())
                .await
            {
                tracing::error!(article_id = article.id, error = %error, "failed to mark news as posted");
            }

            tracing::info!(
                article_id = article.id,
                title = %article.title,
                channel_id = %channel_id,
                "posted news item"
            );
        }
    }

    /// Startup catch-up: re-attempt recent, still-unposted articles for
    /// every registered channel over a window of `days`.
    ///
    /// Unlike the live path this filters by the channel's platforms and
    /// consults the duplicate heuristic before posting, since the cache
    /// or ledger may have been rebuilt while messages stayed visible.
    pub async fn catch_up(&self, days: i64, tags: &[&str]) {
        let channels = match self.store.registered_channels().await {
            Ok(channels) => channels,
            Err(error) => {
                tracing::error!(error = %error, "catch-up: failed to get registered channels");
                return;
            }
        };
        if channels.is_empty() {
            tracing::info!("catch-up: no registered channels found, skipping");
            return;
        }

        let cutoff = self.clock.now() - time::Duration::days(days);

        for tag in tags {
            let articles = match self
                .source
                .fetch(tag, self.config.poll_count * 10, FetchOptions::bulk())
                .await
            {
                Ok(articles) => articles,
                Err(error) => {
                    tracing::error!(tag = %tag, error = %error, "catch-up: failed to fetch news");
                    continue;
                }
            };

            for channel_id in &channels {
                let platforms = match self.store.channel_platforms(channel_id).await {
                    Ok(platforms) => platforms,
                    Err(error) => {
                        tracing::error!(channel_id = %channel_id, error = %error, "catch-up: failed to get channel platforms");
                        continue;
                    }
                };

                for article in filter_by_platforms(&articles, &platforms) {
                    if article.updated < cutoff {
                        continue;
                    }

                    match self.store.is_posted(article.id, channel_id).await {
                        Ok(true) => continue,
                        Ok(false) => {}
                        Err(error) => {
                            tracing::error!(article_id = article.id, error = %error, "catch-up: failed to check posted");
                            continue;
                        }
                    }

                    if self.is_duplicate(channel_id, article).await {
                        tracing::debug!(
                            article_id = article.id,
                            channel_id = %channel_id,
                            "catch-up: duplicate found in recent messages, skipping"
                        );
                        continue;
                    }

                    if let Err(error) = self.chat.post_article(channel_id, article).await {
                        tracing::error!(
                            article_id = article.id,
                            channel_id = %channel_id,
                            error = %error,
                            "catch-up: failed to post news"
                        );
                        continue;
                    }

                    if let Err(error) = self
                        .store
                        .mark_posted(article.id, channel_id, StoreOptions::default())
                        .await
                    {
                        tracing::error!(article_id = article.id, error = %error, "catch-up: failed to mark news as posted");
                    }

                    tracing::info!(
                        article_id = article.id,
                        title = %article.title,
                        channel_id = %channel_id,
                        "catch-up: posted news item"
                    );
                }
            }
        }
    }

    /// Whether the article already appears in the channel's recent
    /// messages. A missing-access response (or any other read failure)
    /// means "don't know" and never blocks posting.
    async fn is_duplicate(&self, channel_id: &str, article: &Article) -> bool {
        let messages = match self
            .chat
            .recent_own_messages(channel_id, self.config.recent_messages)
            .await
        {
            Ok(messages) => messages,
            Err(ChatError::MissingAccess) => {
                tracing::warn!(
                    channel_id = %channel_id,
                    "missing access to read messages, skipping duplicate check"
                );
                return false;
            }
            Err(error) => {
                tracing::error!(channel_id = %channel_id, error = %error, "failed to get recent messages");
                return false;
            }
        };

        dedup::is_duplicate_title(&article.title, &messages)
    }
}

/// Articles matching any of `platforms` (case-insensitive). An empty
/// platform list matches everything.
fn filter_by_platforms<'a>(articles: &'a [Article], platforms: &[String]) -> Vec<&'a Article> {
    if platforms.is_empty() {
        return articles.iter().collect();
    }
    articles
        .iter()
        .filter(|article| platforms.iter().any(|platform| article.has_platform(platform)))
        .collect()
}
