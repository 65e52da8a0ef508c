//! SQLite store implementation
//!
//! Owns the three tables behind the delivery engine: `channels`
//! (subscriptions), `news_cache` (articles), and `posted_news` (the
//! delivery ledger). The `UNIQUE(news_id, channel_id)` constraint on the
//! ledger enforces at-most-once delivery; duplicate inserts are ignored.
//!
//! Schema migrations run at open: older databases gain the `tags`,
//! `content`, and `environment` columns, and a legacy ledger keyed by
//! `news_id` alone is rewritten to the composite-unique shape through a
//! backup table inside a single transaction.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use stobot_domain::{
    Article, Environment, NewsStore, StoreError, StoreOptions, DEFAULT_PLATFORMS,
};

/// SQLite-backed [`NewsStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

type ArticleRow = (
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

const ARTICLE_COLUMNS: &str =
    "id, title, summary, content, tags, platforms, updated_at, thumbnail_url";

impl SqliteStore {
    /// Open or create the database at `path` and bring its schema up to
    /// date.
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();

        // The container deployment mounts /data; create it explicitly when
        // the database lives there, otherwise create the parent directory.
        if db_path.starts_with("/data/") {
            std::fs::create_dir_all("/data")?;
        } else if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && parent != Path::new(".") {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Referential integrity between the ledger and channels is managed
        // in code (see remove_channel). Enforcement must stay off so the
        // ledger migration can restore rows for channels that no longer
        // exist.
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self { pool };
        store.create_tables().await?;
        store.migrate().await?;
        store.create_indexes().await?;

        tracing::info!(path = %db_path.display(), "database initialized");
        Ok(store)
    }

    /// In-memory store for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self { pool };
        store.create_tables().await?;
        store.migrate().await?;
        store.create_indexes().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        let queries = [
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                id TEXT PRIMARY KEY,
                platforms TEXT NOT NULL DEFAULT 'pc,xbox,ps',
                environment TEXT NOT NULL DEFAULT 'PROD' CHECK (environment IN ('DEV', 'PROD')),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS posted_news (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                news_id INTEGER NOT NULL,
                channel_id TEXT NOT NULL,
                posted_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(news_id, channel_id),
                FOREIGN KEY (channel_id) REFERENCES channels(id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS news_cache (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                summary TEXT,
                content TEXT,
                tags TEXT,
                platforms TEXT,
                updated_at DATETIME,
                thumbnail_url TEXT,
                fetched_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        ];

        for query in queries {
            sqlx::query(query)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        Ok(())
    }

    /// Index creation runs after column migrations so indexes on migrated
    /// columns succeed against legacy databases.
    async fn create_indexes(&self) -> Result<(), StoreError> {
        let queries = [
            "CREATE INDEX IF NOT EXISTS idx_posted_news_channel ON posted_news(channel_id)",
            "CREATE INDEX IF NOT EXISTS idx_posted_news_id ON posted_news(news_id)",
            "CREATE INDEX IF NOT EXISTS idx_news_cache_tags ON news_cache(tags)",
            "CREATE INDEX IF NOT EXISTS idx_news_cache_updated ON news_cache(updated_at)",
        ];

        for query in queries {
            sqlx::query(query)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        Ok(())
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        if !self.column_exists("news_cache", "tags").await? {
            tracing::info!("adding tags column to news_cache table");
            self.exec("ALTER TABLE news_cache ADD COLUMN tags TEXT").await?;
            self.exec("CREATE INDEX IF NOT EXISTS idx_news_cache_tags ON news_cache(tags)")
                .await?;
        }

        if !self.column_exists("news_cache", "content").await? {
            tracing::info!("adding content column to news_cache table");
            self.exec("ALTER TABLE news_cache ADD COLUMN content TEXT").await?;
        }

        self.migrate_legacy_ledger().await?;

        if !self.column_exists("channels", "environment").await? {
            tracing::info!("adding environment column to channels table");
            self.exec(
                "ALTER TABLE channels ADD COLUMN environment TEXT NOT NULL DEFAULT 'PROD' \
                 CHECK (environment IN ('DEV', 'PROD'))",
            )
            .await?;
        }

        Ok(())
    }

    /// Rewrites a ledger whose primary key is `news_id` alone into the
    /// composite-unique shape, preserving every (news_id, channel_id)
    /// pair. Runs in one transaction so a failure leaves the old table
    /// untouched.
    async fn migrate_legacy_ledger(&self) -> Result<(), StoreError> {
        let schema: Option<(String,)> =
            sqlx::query_as("SELECT sql FROM sqlite_master WHERE type='table' AND name='posted_news'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

        let Some((schema,)) = schema else {
            return Ok(());
        };
        if !schema.contains("news_id INTEGER PRIMARY KEY") {
            return Ok(());
        }

        tracing::info!("migrating posted_news table to composite-unique schema");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query("CREATE TABLE posted_news_backup AS SELECT * FROM posted_news")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query("DROP TABLE posted_news")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE posted_news (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                news_id INTEGER NOT NULL,
                channel_id TEXT NOT NULL,
                posted_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(news_id, channel_id),
                FOREIGN KEY (channel_id) REFERENCES channels(id)
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        let has_posted_at: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM pragma_table_info('posted_news_backup') WHERE name='posted_at'",
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        let restore = if has_posted_at.0 > 0 {
            "INSERT OR IGNORE INTO posted_news (news_id, channel_id, posted_at) \
             SELECT news_id, channel_id, posted_at FROM posted_news_backup"
        } else {
            "INSERT OR IGNORE INTO posted_news (news_id, channel_id) \
             SELECT news_id, channel_id FROM posted_news_backup"
        };
        sqlx::query(restore)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query("DROP TABLE posted_news_backup")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_posted_news_channel ON posted_news(channel_id)",
            "CREATE INDEX IF NOT EXISTS idx_posted_news_id ON posted_news(news_id)",
        ] {
            sqlx::query(index)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!("successfully migrated posted_news table");
        Ok(())
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool, StoreError> {
        let count: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM pragma_table_info('{table}') WHERE name = ?"
        ))
        .bind(column)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(count.0 > 0)
    }

    async fn exec(&self, query: &str) -> Result<(), StoreError> {
        sqlx::query(query)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn channel_exists(&self, channel_id: &str) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM channels WHERE id = ?")
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn insert_channel(
        &self,
        channel_id: &str,
        environment: Environment,
    ) -> Result<bool, StoreError> {
        let was_new = !self.channel_exists(channel_id).await?;

        sqlx::query(
            "INSERT OR REPLACE INTO channels (id, platforms, environment, updated_at) \
             VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
        )
        .bind(channel_id)
        .bind(DEFAULT_PLATFORMS.join(","))
        .bind(environment.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(was_new)
    }

    fn row_to_article(row: ArticleRow) -> Result<Article, StoreError> {
        let (id, title, summary, content, tags, platforms, updated_at, thumbnail_url) = row;

        let updated = match updated_at {
            Some(raw) => parse_sql_datetime(&raw)?,
            None => OffsetDateTime::UNIX_EPOCH,
        };

        Ok(Article {
            id,
            title,
            summary: summary.unwrap_or_default(),
            content: content.unwrap_or_default(),
            tags: split_list(tags.as_deref()),
            platforms: split_list(platforms.as_deref()),
            updated,
            thumbnail_url,
        })
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Formats a timestamp the way SQLite's `datetime('now')` does, so stored
/// values stay comparable with SQL date arithmetic.
fn format_sql_datetime(value: OffsetDateTime) -> Result<String, StoreError> {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    value
        .to_offset(UtcOffset::UTC)
        .format(&fmt)
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn parse_sql_datetime(value: &str) -> Result<OffsetDateTime, StoreError> {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if let Ok(parsed) = PrimitiveDateTime::parse(value, &fmt) {
        return Ok(parsed.assume_utc());
    }
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{value}': {e}")))
}

#[async_trait]
impl NewsStore for SqliteStore {
    async fn add_channel(&self, channel_id: &str) -> Result<bool, StoreError> {
        self.insert_channel(channel_id, Environment::Prod).await
    }

    async fn add_channel_with_environment(
        &self,
        channel_id: &str,
        environment: Environment,
    ) -> Result<bool, StoreError> {
        self.insert_channel(channel_id, environment).await
    }

    async fn remove_channel(&self, channel_id: &str) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM channels WHERE id = ?")
            .bind(channel_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM posted_news WHERE channel_id = ?")
            .bind(channel_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn registered_channels(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM channels")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn channels_for_environment(
        &self,
        environment: Environment,
    ) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM channels WHERE environment = ?")
            .bind(environment.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn channel_platforms(&self, channel_id: &str) -> Result<Vec<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT platforms FROM channels WHERE id = ?")
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(match row {
            Some((platforms,)) => split_list(Some(&platforms)),
            None => Vec::new(),
        })
    }

    async fn update_channel_platforms(
        &self,
        channel_id: &str,
        platforms: &[String],
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE channels SET platforms = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(platforms.join(","))
        .bind(channel_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn channel_environment(&self, channel_id: &str) -> Result<Environment, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT environment FROM channels WHERE id = ?")
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match row {
            Some((environment,)) => environment
                .parse()
                .map_err(|e: stobot_domain::InvalidEnvironment| {
                    StoreError::Serialization(e.to_string())
                }),
            None => Ok(Environment::Prod),
        }
    }

    async fn update_channel_environment(
        &self,
        channel_id: &str,
        environment: Environment,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE channels SET environment = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(environment.as_str())
        .bind(channel_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "channel {channel_id} not found"
            )));
        }
        Ok(())
    }

    async fn cache_articles(
        &self,
        articles: &[Article],
        options: StoreOptions,
    ) -> Result<(), StoreError> {
        if articles.is_empty() {
            return Ok(());
        }

        const QUERY: &str = "INSERT OR REPLACE INTO news_cache \
             (id, title, summary, content, tags, platforms, updated_at, thumbnail_url, fetched_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)";

        if !options.batch {
            for article in articles {
                let updated = format_sql_datetime(article.updated)?;
                let mut result = Ok(());
                for attempt in 0..=options.retry_count {
                    result = sqlx::query(QUERY)
                        .bind(article.id)
                        .bind(&article.title)
                        .bind(&article.summary)
                        .bind(&article.content)
                        .bind(article.tags.join(","))
                        .bind(article.platforms.join(","))
                        .bind(&updated)
                        .bind(&article.thumbnail_url)
                        .execute(&self.pool)
                        .await
                        .map(|_| ())
                        .map_err(|e| StoreError::Database(e.to_string()));
                    if result.is_ok() {
                        break;
                    }
                    if attempt < options.retry_count {
                        tracing::debug!(
                            attempt = attempt + 1,
                            retries = options.retry_count,
                            article_id = article.id,
                            "retrying article cache write"
                        );
                    }
                }
                if let Err(error) = result {
                    if !options.ignore_errors {
                        return Err(error);
                    }
                    tracing::debug!(article_id = article.id, error = %error, "ignoring cache error");
                }
            }
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        for (i, article) in articles.iter().enumerate() {
            let updated = format_sql_datetime(article.updated)?;
            let result = sqlx::query(QUERY)
                .bind(article.id)
                .bind(&article.title)
                .bind(&article.summary)
                .bind(&article.content)
                .bind(article.tags.join(","))
                .bind(article.platforms.join(","))
                .bind(&updated)
                .bind(&article.thumbnail_url)
                .execute(&mut *tx)
                .await;

            if let Err(error) = result {
                if !options.ignore_errors {
                    return Err(StoreError::Database(format!(
                        "failed to cache news item {}: {error}",
                        article.id
                    )));
                }
                tracing::debug!(article_id = article.id, error = %error, "ignoring cache error in batch");
            }

            if options.log_progress && (i + 1) % 100 == 0 {
                tracing::info!(cached = i + 1, total = articles.len(), "caching news items");
            }
        }

        if options.log_progress {
            tracing::info!(total = articles.len(), "completed caching news items");
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn all_cached_articles(&self) -> Result<Vec<Article>, StoreError> {
        let rows: Vec<ArticleRow> = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM news_cache ORDER BY id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_article).collect()
    }

    async fn fresh_articles(&self, window: Duration) -> Result<Vec<Article>, StoreError> {
        let rows: Vec<ArticleRow> = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM news_cache \
             WHERE updated_at > datetime('now', '-' || ? || ' seconds') \
             ORDER BY updated_at DESC"
        ))
        .bind(window.as_secs() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_article).collect()
    }

    async fn is_posted(&self, article_id: i64, channel_id: &str) -> Result<bool, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM posted_news WHERE news_id = ? AND channel_id = ?")
                .bind(article_id)
                .bind(channel_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn mark_posted(
        &self,
        article_id: i64,
        channel_id: &str,
        options: StoreOptions,
    ) -> Result<(), StoreError> {
        let mut last_error = None;
        for attempt in 0..=options.retry_count {
            match sqlx::query(
                "INSERT OR IGNORE INTO posted_news (news_id, channel_id) VALUES (?, ?)",
            )
            .bind(article_id)
            .bind(channel_id)
            .execute(&self.pool)
            .await
            {
                Ok(_) => return Ok(()),
                Err(error) => {
                    if attempt < options.retry_count {
                        tracing::debug!(
                            attempt = attempt + 1,
                            retries = options.retry_count,
                            article_id,
                            error = %error,
                            "retrying ledger insert"
                        );
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(StoreError::Database(format!(
            "failed to mark news as posted after {} retries: {}",
            options.retry_count,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn mark_many_posted(
        &self,
        articles: &[Article],
        channels: &[String],
        options: StoreOptions,
    ) -> Result<(), StoreError> {
        if !options.batch {
            for article in articles {
                for channel_id in channels {
                    if let Err(error) = self.mark_posted(article.id, channel_id, options).await {
                        if !options.ignore_errors {
                            return Err(error);
                        }
                        tracing::debug!(
                            article_id = article.id,
                            channel_id = %channel_id,
                            error = %error,
                            "ignoring ledger error"
                        );
                    }
                }
            }
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let total = articles.len() * channels.len();
        let mut processed = 0usize;

        for article in articles {
            for channel_id in channels {
                let result = sqlx::query(
                    "INSERT OR IGNORE INTO posted_news (news_id, channel_id) VALUES (?, ?)",
                )
                .bind(article.id)
                .bind(channel_id)
                .execute(&mut *tx)
                .await;

                if let Err(error) = result {
                    if !options.ignore_errors {
                        return Err(StoreError::Database(format!(
                            "failed to mark news {} as posted to channel {channel_id}: {error}",
                            article.id
                        )));
                    }
                    tracing::debug!(
                        article_id = article.id,
                        channel_id = %channel_id,
                        error = %error,
                        "ignoring ledger error in batch"
                    );
                }

                processed += 1;
                if options.log_progress && processed % 100 == 0 {
                    tracing::info!(processed, total, "marking news items as posted");
                }
            }
        }

        if options.log_progress && processed > 0 {
            tracing::info!(processed, "completed marking news items as posted");
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn purge_old_articles(&self) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM news_cache WHERE fetched_at < datetime('now', '-30 days')")
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn article(id: i64, title: &str, updated: OffsetDateTime) -> Article {
        Article {
            id,
            title: title.to_string(),
            summary: format!("summary {id}"),
            content: format!("content {id}"),
            tags: vec!["star-trek-online".to_string()],
            platforms: vec!["pc".to_string(), "xbox".to_string()],
            updated,
            thumbnail_url: Some(format!("https://img/{id}.jpg")),
        }
    }

    async fn posted_count(store: &SqliteStore, article_id: i64, channel_id: &str) -> i64 {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM posted_news WHERE news_id = ? AND channel_id = ?",
        )
        .bind(article_id)
        .bind(channel_id)
        .fetch_one(&store.pool)
        .await
        .unwrap();
        row.0
    }

    #[tokio::test]
    async fn add_channel_reports_newness_and_defaults() {
        let store = SqliteStore::in_memory().await.unwrap();

        assert!(store.add_channel("CH1").await.unwrap());
        assert!(!store.add_channel("CH1").await.unwrap());

        let platforms = store.channel_platforms("CH1").await.unwrap();
        assert_eq!(platforms, vec!["pc", "xbox", "ps"]);
        assert_eq!(
            store.channel_environment("CH1").await.unwrap(),
            Environment::Prod
        );
    }

    #[tokio::test]
    async fn unknown_channel_has_no_platforms_and_prod_environment() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.channel_platforms("nope").await.unwrap().is_empty());
        assert_eq!(
            store.channel_environment("nope").await.unwrap(),
            Environment::Prod
        );
    }

    #[tokio::test]
    async fn remove_channel_cascades_to_ledger() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.add_channel("CH1").await.unwrap();
        store
            .mark_posted(1, "CH1", StoreOptions::default())
            .await
            .unwrap();
        store
            .mark_posted(2, "CH1", StoreOptions::default())
            .await
            .unwrap();

        store.remove_channel("CH1").await.unwrap();

        assert!(store.registered_channels().await.unwrap().is_empty());
        assert_eq!(posted_count(&store, 1, "CH1").await, 0);
        assert_eq!(posted_count(&store, 2, "CH1").await, 0);
    }

    #[tokio::test]
    async fn environment_filter_selects_matching_channels() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .add_channel_with_environment("DEV_CH", Environment::Dev)
            .await
            .unwrap();
        store.add_channel("PROD_CH").await.unwrap();

        assert_eq!(
            store
                .channels_for_environment(Environment::Dev)
                .await
                .unwrap(),
            vec!["DEV_CH"]
        );
        assert_eq!(
            store
                .channels_for_environment(Environment::Prod)
                .await
                .unwrap(),
            vec!["PROD_CH"]
        );
    }

    #[tokio::test]
    async fn update_environment_requires_existing_channel() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.add_channel("CH1").await.unwrap();

        store
            .update_channel_environment("CH1", Environment::Dev)
            .await
            .unwrap();
        assert_eq!(
            store.channel_environment("CH1").await.unwrap(),
            Environment::Dev
        );

        let missing = store
            .update_channel_environment("ghost", Environment::Dev)
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_platforms_replaces_the_set() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.add_channel("CH1").await.unwrap();

        store
            .update_channel_platforms("CH1", &["pc".to_string()])
            .await
            .unwrap();

        assert_eq!(store.channel_platforms("CH1").await.unwrap(), vec!["pc"]);
    }

    #[tokio::test]
    async fn cached_articles_round_trip_newest_id_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        let updated = datetime!(2024-01-15 12:00:00 UTC);
        store
            .cache_articles(
                &[article(101, "First", updated), article(103, "Third", updated)],
                StoreOptions::default(),
            )
            .await
            .unwrap();
        store
            .cache_articles(&[article(102, "Second", updated)], StoreOptions::bulk())
            .await
            .unwrap();

        let articles = store.all_cached_articles().await.unwrap();

        let ids: Vec<_> = articles.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![103, 102, 101]);

        let first = articles.iter().find(|a| a.id == 101).unwrap();
        assert_eq!(first.title, "First");
        assert_eq!(first.tags, vec!["star-trek-online"]);
        assert_eq!(first.platforms, vec!["pc", "xbox"]);
        assert_eq!(first.updated, updated);
        assert_eq!(first.thumbnail_url.as_deref(), Some("https://img/101.jpg"));
    }

    #[tokio::test]
    async fn caching_twice_replaces_instead_of_duplicating() {
        let store = SqliteStore::in_memory().await.unwrap();
        let updated = datetime!(2024-01-15 12:00:00 UTC);
        store
            .cache_articles(&[article(7, "Original", updated)], StoreOptions::default())
            .await
            .unwrap();

        let mut revised = article(7, "Revised", updated);
        revised.summary = "new summary".to_string();
        store
            .cache_articles(&[revised], StoreOptions::default())
            .await
            .unwrap();

        let articles = store.all_cached_articles().await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Revised");
        assert_eq!(articles[0].summary, "new summary");
    }

    #[tokio::test]
    async fn fresh_articles_respects_the_window() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        store
            .cache_articles(
                &[
                    article(1, "Fresh", now - time::Duration::minutes(1)),
                    article(2, "Stale", now - time::Duration::hours(2)),
                ],
                StoreOptions::default(),
            )
            .await
            .unwrap();

        let fresh = store
            .fresh_articles(Duration::from_secs(600))
            .await
            .unwrap();

        let ids: Vec<_> = fresh.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn marking_posted_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.add_channel("CH1").await.unwrap();

        for _ in 0..5 {
            store
                .mark_posted(42, "CH1", StoreOptions::default())
                .await
                .unwrap();
        }

        assert!(store.is_posted(42, "CH1").await.unwrap());
        assert_eq!(posted_count(&store, 42, "CH1").await, 1);
    }

    #[tokio::test]
    async fn mark_many_posted_covers_the_product() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.add_channel("CH1").await.unwrap();
        store.add_channel("CH2").await.unwrap();
        let updated = datetime!(2024-01-15 12:00:00 UTC);
        let articles = vec![article(1, "A", updated), article(2, "B", updated)];
        let channels = vec!["CH1".to_string(), "CH2".to_string()];

        store
            .mark_many_posted(&articles, &channels, StoreOptions::bulk())
            .await
            .unwrap();

        for article_id in [1, 2] {
            for channel in &channels {
                assert!(store.is_posted(article_id, channel).await.unwrap());
            }
        }

        // Repeating the bulk mark leaves the ledger unchanged.
        store
            .mark_many_posted(&articles, &channels, StoreOptions::bulk())
            .await
            .unwrap();
        assert_eq!(posted_count(&store, 1, "CH1").await, 1);
    }

    #[tokio::test]
    async fn purge_removes_only_entries_past_the_retention_window() {
        let store = SqliteStore::in_memory().await.unwrap();
        let updated = datetime!(2024-01-15 12:00:00 UTC);
        store
            .cache_articles(
                &[article(1, "Old", updated), article(2, "New", updated)],
                StoreOptions::default(),
            )
            .await
            .unwrap();

        sqlx::query("UPDATE news_cache SET fetched_at = datetime('now', '-40 days') WHERE id = 1")
            .execute(&store.pool)
            .await
            .unwrap();

        let purged = store.purge_old_articles().await.unwrap();

        assert_eq!(purged, 1);
        let ids: Vec<_> = store
            .all_cached_articles()
            .await
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn legacy_ledger_schema_is_migrated_preserving_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("stobot.db");

        // Seed a database with the old single-primary-key ledger shape.
        {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect(&format!("sqlite:{}?mode=rwc", db_path.display()))
                .await
                .unwrap();
            sqlx::query("CREATE TABLE posted_news (news_id INTEGER PRIMARY KEY, channel_id TEXT)")
                .execute(&pool)
                .await
                .unwrap();
            for (news_id, channel) in [(1i64, "A"), (2, "A"), (3, "B")] {
                sqlx::query("INSERT INTO posted_news (news_id, channel_id) VALUES (?, ?)")
                    .bind(news_id)
                    .bind(channel)
                    .execute(&pool)
                    .await
                    .unwrap();
            }
            pool.close().await;
        }

        let store = SqliteStore::open(&db_path).await.unwrap();

        assert!(store.is_posted(1, "A").await.unwrap());
        assert!(store.is_posted(2, "A").await.unwrap());
        assert!(store.is_posted(3, "B").await.unwrap());
        assert!(!store.is_posted(1, "B").await.unwrap());

        // The migrated ledger accepts the composite shape; re-marking an
        // existing pair stays a no-op.
        store
            .mark_posted(1, "A", StoreOptions::default())
            .await
            .unwrap();
        assert_eq!(posted_count(&store, 1, "A").await, 1);

        store
            .mark_posted(1, "B", StoreOptions::default())
            .await
            .unwrap();
        assert!(store.is_posted(1, "B").await.unwrap());
    }

    #[tokio::test]
    async fn missing_article_columns_are_added_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("stobot.db");

        {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect(&format!("sqlite:{}?mode=rwc", db_path.display()))
                .await
                .unwrap();
            sqlx::query(
                "CREATE TABLE news_cache (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL,
                    summary TEXT,
                    platforms TEXT,
                    updated_at DATETIME,
                    thumbnail_url TEXT,
                    fetched_at DATETIME DEFAULT CURRENT_TIMESTAMP
                )",
            )
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query(
                "CREATE TABLE channels (
                    id TEXT PRIMARY KEY,
                    platforms TEXT NOT NULL DEFAULT 'pc,xbox,ps',
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
                )",
            )
            .execute(&pool)
            .await
            .unwrap();
            pool.close().await;
        }

        let store = SqliteStore::open(&db_path).await.unwrap();

        // tags/content columns now exist and accept writes.
        store
            .cache_articles(
                &[article(9, "Migrated", datetime!(2024-01-15 12:00:00 UTC))],
                StoreOptions::default(),
            )
            .await
            .unwrap();
        let articles = store.all_cached_articles().await.unwrap();
        assert_eq!(articles[0].tags, vec!["star-trek-online"]);
        assert_eq!(articles[0].content, "content 9");

        // The environment column got added with a PROD default.
        store.add_channel("CH1").await.unwrap();
        assert_eq!(
            store.channel_environment("CH1").await.unwrap(),
            Environment::Prod
        );
    }
}
