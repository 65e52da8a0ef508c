//! In-memory store for testing and offline use

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use stobot_domain::{
    Article, Environment, NewsStore, StoreError, StoreOptions, DEFAULT_PLATFORMS,
};

#[derive(Debug, Clone)]
struct ChannelRecord {
    platforms: Vec<String>,
    environment: Environment,
}

/// In-memory [`NewsStore`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    channels: RwLock<HashMap<String, ChannelRecord>>,
    cache: RwLock<HashMap<i64, (Article, OffsetDateTime)>>,
    posted: RwLock<HashSet<(i64, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err<T>(error: std::sync::PoisonError<T>) -> StoreError {
        StoreError::Database(error.to_string())
    }
}

#[async_trait]
impl NewsStore for MemoryStore {
    async fn add_channel(&self, channel_id: &str) -> Result<bool, StoreError> {
        self.add_channel_with_environment(channel_id, Environment::Prod)
            .await
    }

    async fn add_channel_with_environment(
        &self,
        channel_id: &str,
        environment: Environment,
    ) -> Result<bool, StoreError> {
        let mut channels = self.channels.write().map_err(Self::lock_err)?;
        let was_new = !channels.contains_key(channel_id);
        channels.insert(
            channel_id.to_string(),
            ChannelRecord {
                platforms: DEFAULT_PLATFORMS.iter().map(|p| p.to_string()).collect(),
                environment,
            },
        );
        Ok(was_new)
    }

    async fn remove_channel(&self, channel_id: &str) -> Result<(), StoreError> {
        self.channels
            .write()
            .map_err(Self::lock_err)?
            .remove(channel_id);
        self.posted
            .write()
            .map_err(Self::lock_err)?
            .retain(|(_, channel)| channel != channel_id);
        Ok(())
    }

    async fn registered_channels(&self) -> Result<Vec<String>, StoreError> {
        let mut channels: Vec<String> = self
            .channels
            .read()
            .map_err(Self::lock_err)?
            .keys()
            .cloned()
            .collect();
        channels.sort();
        Ok(channels)
    }

    async fn channels_for_environment(
        &self,
        environment: Environment,
    ) -> Result<Vec<String>, StoreError> {
        let mut channels: Vec<String> = self
            .channels
            .read()
            .map_err(Self::lock_err)?
            .iter()
            .filter(|(_, record)| record.environment == environment)
            .map(|(id, _)| id.clone())
            .collect();
        channels.sort();
        Ok(channels)
    }

    async fn channel_platforms(&self, channel_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .channels
            .read()
            .map_err(Self::lock_err)?
            .get(channel_id)
            .map(|record| record.platforms.clone())
            .unwrap_or_default())
    }

    async fn update_channel_platforms(
        &self,
        channel_id: &str,
        platforms: &[String],
    ) -> Result<(), StoreError> {
        if let Some(record) = self
            .channels
            .write()
            .map_err(Self::lock_err)?
            .get_mut(channel_id)
        {
            record.platforms = platforms.to_vec();
        }
        Ok(())
    }

    async fn channel_environment(&self, channel_id: &str) -> Result<Environment, StoreError> {
        Ok(self
            .channels
            .read()
            .map_err(Self::lock_err)?
            .get(channel_id)
            .map(|record| record.environment)
            .unwrap_or_default())
    }

    async fn update_channel_environment(
        &self,
        channel_id: &str,
        environment: Environment,
    ) -> Result<(), StoreError> {
        match self
            .channels
            .write()
            .map_err(Self::lock_err)?
            .get_mut(channel_id)
        {
            Some(record) => {
                record.environment = environment;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "channel {channel_id} not found"
            ))),
        }
    }

    async fn cache_articles(
        &self,
        articles: &[Article],
        _options: StoreOptions,
    ) -> Result<(), StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut cache = self.cache.write().map_err(Self::lock_err)?;
        for article in articles {
            cache.insert(article.id, (article.clone(), now));
        }
        Ok(())
    }

    async fn all_cached_articles(&self) -> Result<Vec<Article>, StoreError> {
        let mut articles: Vec<Article> = self
            .cache
            .read()
            .map_err(Self::lock_err)?
            .values()
            .map(|(article, _)| article.clone())
            .collect();
        articles.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(articles)
    }

    async fn fresh_articles(&self, window: Duration) -> Result<Vec<Article>, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut articles: Vec<Article> = self
            .cache
            .read()
            .map_err(Self::lock_err)?
            .values()
            .map(|(article, _)| article.clone())
            .filter(|article| article.is_fresh(now, window))
            .collect();
        articles.sort_by(|a, b| b.updated.cmp(&a.updated));
        Ok(articles)
    }

    async fn is_posted(&self, article_id: i64, channel_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .posted
            .read()
            .map_err(Self::lock_err)?
            .contains(&(article_id, channel_id.to_string())))
    }

    async fn mark_posted(
        &self,
        article_id: i64,
        channel_id: &str,
        _options: StoreOptions,
    ) -> Result<(), StoreError> {
        self.posted
            .write()
            .map_err(Self::lock_err)?
            .insert((article_id, channel_id.to_string()));
        Ok(())
    }

    async fn mark_many_posted(
        &self,
        articles: &[Article],
        channels: &[String],
        _options: StoreOptions,
    ) -> Result<(), StoreError> {
        let mut posted = self.posted.write().map_err(Self::lock_err)?;
        for article in articles {
            for channel in channels {
                posted.insert((article.id, channel.clone()));
            }
        }
        Ok(())
    }

    async fn purge_old_articles(&self) -> Result<u64, StoreError> {
        let cutoff = OffsetDateTime::now_utc() - time::Duration::days(30);
        let mut cache = self.cache.write().map_err(Self::lock_err)?;
        let before = cache.len();
        cache.retain(|_, (_, fetched_at)| *fetched_at >= cutoff);
        Ok((before - cache.len()) as u64)
    }
}
