//! Domain entities and value objects

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Default platform set assigned to a channel when none is specified.
pub const DEFAULT_PLATFORMS: [&str; 3] = ["pc", "xbox", "ps"];

/// Deployment environment a channel belongs to.
///
/// A bot instance configured for one environment only services channels
/// tagged with that environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Environment {
    Dev,
    #[default]
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "DEV",
            Environment::Prod => "PROD",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for environment strings outside {DEV, PROD}.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid environment value: {0}. Must be 'DEV' or 'PROD'")]
pub struct InvalidEnvironment(pub String);

impl FromStr for Environment {
    type Err = InvalidEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEV" => Ok(Environment::Dev),
            "PROD" => Ok(Environment::Prod),
            other => Err(InvalidEnvironment(other.to_string())),
        }
    }
}

/// A news article from the upstream feed, normalized for storage and posting.
///
/// `content` is plain text; any HTML in the upstream payload is stripped
/// before an `Article` is constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    /// Upstream-assigned identifier.
    pub id: i64,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub tags: Vec<String>,
    pub platforms: Vec<String>,
    /// Last-update timestamp supplied by the upstream feed.
    pub updated: OffsetDateTime,
    pub thumbnail_url: Option<String>,
}

impl Article {
    /// Reports whether the article has no title and no summary.
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.summary.is_empty()
    }

    /// Case-insensitive platform membership.
    pub fn has_platform(&self, platform: &str) -> bool {
        self.platforms.iter().any(|p| p.eq_ignore_ascii_case(platform))
    }

    /// Case-insensitive tag membership.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Whether `updated` lies within `window` of `now`.
    pub fn is_fresh(&self, now: OffsetDateTime, window: Duration) -> bool {
        now - self.updated <= window
    }
}

/// Controls how the upstream client fetches news.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Whether to page through the feed for counts above `page_size`.
    pub paginate: bool,
    /// Items requested per page when paginating.
    pub page_size: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            paginate: false,
            page_size: 100,
        }
    }
}

impl FetchOptions {
    /// Options for bulk operations such as catch-up and database population.
    pub fn bulk() -> Self {
        Self {
            paginate: true,
            page_size: 100,
        }
    }
}

/// Controls retry and transaction behavior of store write operations.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Run the whole operation in a single transaction.
    pub batch: bool,
    /// Log and continue on per-row failures instead of aborting.
    pub ignore_errors: bool,
    /// Retries per statement; only applies to non-batched operations.
    pub retry_count: u32,
    /// Emit progress logs for large batches.
    pub log_progress: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            batch: false,
            ignore_errors: false,
            retry_count: 3,
            log_progress: false,
        }
    }
}

impl StoreOptions {
    /// Options optimized for bulk writes.
    pub fn bulk() -> Self {
        Self {
            batch: true,
            ignore_errors: true,
            retry_count: 3,
            log_progress: true,
        }
    }
}

/// Title and description text of a single embed in a chat message.
#[derive(Debug, Clone, Default)]
pub struct EmbedText {
    pub title: String,
    pub description: String,
}

/// A recent message authored by this bot, as far as the duplicate check
/// is concerned.
#[derive(Debug, Clone, Default)]
pub struct RecentMessage {
    pub content: String,
    pub embeds: Vec<EmbedText>,
}

/// A rich message rendered from an article, ready for the chat adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    /// RFC3339 timestamp taken from the article's `updated` field.
    pub timestamp: String,
    pub footer_text: String,
    pub fields: Vec<EmbedField>,
    pub thumbnail_url: Option<String>,
}

/// A single name/value field inside an [`Embed`].
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Truncates `text` to at most `max_len` bytes, appending `...` when cut.
///
/// Splits only at char boundaries, so the result may be slightly shorter
/// than `max_len` for multi-byte input.
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let mut cut = max_len - 3;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_article() -> Article {
        Article {
            id: 11816253,
            title: "Patch Notes".to_string(),
            summary: "Details about the latest patch".to_string(),
            content: String::new(),
            tags: vec!["patch-notes".to_string()],
            platforms: vec!["PC".to_string(), "xbox".to_string()],
            updated: datetime!(2024-01-15 12:00:00 UTC),
            thumbnail_url: None,
        }
    }

    #[test]
    fn platform_membership_is_case_insensitive() {
        let article = sample_article();
        assert!(article.has_platform("pc"));
        assert!(article.has_platform("PC"));
        assert!(article.has_platform("Xbox"));
        assert!(!article.has_platform("ps"));
    }

    #[test]
    fn tag_membership_is_case_insensitive() {
        let article = sample_article();
        assert!(article.has_tag("Patch-Notes"));
        assert!(!article.has_tag("star-trek-online"));
    }

    #[test]
    fn is_empty_requires_both_title_and_summary_empty() {
        let mut article = sample_article();
        assert!(!article.is_empty());
        article.title.clear();
        assert!(!article.is_empty());
        article.summary.clear();
        assert!(article.is_empty());
    }

    #[test]
    fn freshness_uses_the_window_bound() {
        let article = sample_article();
        let now = datetime!(2024-01-15 12:05:00 UTC);
        assert!(article.is_fresh(now, Duration::from_secs(600)));
        assert!(!article.is_fresh(now, Duration::from_secs(60)));
    }

    #[test]
    fn environment_parses_only_known_values() {
        assert_eq!("DEV".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert!("dev".parse::<Environment>().is_err());
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn truncate_appends_ellipsis_only_when_cut() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_text("a longer sentence", 10), "a longe...");
        assert_eq!(truncate_text("abcdef", 3), "...");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "ééééé";
        let truncated = truncate_text(text, 8);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 8);
    }
}
