//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the delivery engine and the
//! outside world. Adapters implement them against SQLite, the Arc Games
//! feed, and the Discord REST API; tests implement them in memory.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{Article, Environment, FetchOptions, RecentMessage, StoreOptions};

/// Error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Port for the embedded relational store.
///
/// Owns all persistent state: channel registrations, the article cache,
/// and the posted-news ledger. The ledger's `UNIQUE(news_id, channel_id)`
/// constraint is what makes delivery at-most-once; everything else is
/// best effort around it.
#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Register a channel with default platforms and environment PROD.
    /// Returns `true` when the channel did not previously exist.
    async fn add_channel(&self, channel_id: &str) -> Result<bool, StoreError>;

    /// Register a channel with an explicit environment.
    async fn add_channel_with_environment(
        &self,
        channel_id: &str,
        environment: Environment,
    ) -> Result<bool, StoreError>;

    /// Remove a channel and all its ledger rows in one transaction.
    async fn remove_channel(&self, channel_id: &str) -> Result<(), StoreError>;

    /// All registered channel ids.
    async fn registered_channels(&self) -> Result<Vec<String>, StoreError>;

    /// Registered channel ids for one environment.
    async fn channels_for_environment(
        &self,
        environment: Environment,
    ) -> Result<Vec<String>, StoreError>;

    /// Platforms of a channel; empty when the channel is not registered.
    async fn channel_platforms(&self, channel_id: &str) -> Result<Vec<String>, StoreError>;

    /// Replace a channel's platform set.
    async fn update_channel_platforms(
        &self,
        channel_id: &str,
        platforms: &[String],
    ) -> Result<(), StoreError>;

    /// Environment of a channel; PROD when the channel is not registered.
    async fn channel_environment(&self, channel_id: &str) -> Result<Environment, StoreError>;

    /// Replace a channel's environment. Errors when the channel is absent.
    async fn update_channel_environment(
        &self,
        channel_id: &str,
        environment: Environment,
    ) -> Result<(), StoreError>;

    /// Upsert articles into the cache.
    async fn cache_articles(
        &self,
        articles: &[Article],
        options: StoreOptions,
    ) -> Result<(), StoreError>;

    /// All cached articles, newest id first.
    async fn all_cached_articles(&self) -> Result<Vec<Article>, StoreError>;

    /// Cached articles whose upstream `updated` lies within `window` of now.
    async fn fresh_articles(&self, window: Duration) -> Result<Vec<Article>, StoreError>;

    /// Whether the ledger records this article as posted to this channel.
    async fn is_posted(&self, article_id: i64, channel_id: &str) -> Result<bool, StoreError>;

    /// Insert a ledger row; inserting an existing row is a no-op.
    async fn mark_posted(
        &self,
        article_id: i64,
        channel_id: &str,
        options: StoreOptions,
    ) -> Result<(), StoreError>;

    /// Insert ledger rows for the product of `articles` and `channels`.
    async fn mark_many_posted(
        &self,
        articles: &[Article],
        channels: &[String],
        options: StoreOptions,
    ) -> Result<(), StoreError>;

    /// Delete cache entries fetched more than 30 days ago. Ledger rows are
    /// never purged. Returns the number of deleted rows.
    async fn purge_old_articles(&self) -> Result<u64, StoreError>;
}

/// Error type for upstream feed operations
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("API returned status {0}")]
    Api(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Port for the upstream news feed.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Fetch up to `count` articles for `tag` (empty tag = whole feed),
    /// normalized per the ingest pipeline.
    async fn fetch(
        &self,
        tag: &str,
        count: usize,
        options: FetchOptions,
    ) -> Result<Vec<Article>, FetchError>;
}

/// Error type for chat-service operations
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("API error: {0}")]
    Api(String),
    #[error("missing access to channel")]
    MissingAccess,
    #[error("rate limited, retry after: {0:?}")]
    RateLimited(Option<Duration>),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("network error: {0}")]
    Network(String),
}

/// Port for the chat service.
///
/// The adapter enforces the service's rate limits and retries transient
/// failures internally; callers see a single synchronous-looking result.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Post a rendered article embed to a channel.
    async fn post_article(&self, channel_id: &str, article: &Article) -> Result<(), ChatError>;

    /// Up to `limit` most recent messages in the channel authored by this
    /// bot, including embed titles and descriptions.
    async fn recent_own_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<RecentMessage>, ChatError>;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
