//! Arc Games news API client
//!
//! Materializes normalized [`Article`]s from the upstream JSON feed,
//! optionally paging through the feed for bulk fetches. Normalization
//! appends the requested tag, strips HTML from the content, and tolerates
//! the feed's loose typing (numeric-string ids, several date formats).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use stobot_domain::{Article, FetchError, FetchOptions, NewsSource};

use crate::html;

const DEFAULT_BASE_URL: &str = "https://api.arcgames.com/v1.0/games/sto/news";

/// Fields requested from the feed for every article.
const FIELDS: [&str; 8] = [
    "id",
    "title",
    "summary",
    "tags",
    "platforms",
    "updated",
    "images",
    "content",
];

/// Thumbnail keys in the `images` map, in order of preference.
const THUMBNAIL_KEYS: [&str; 4] = [
    "img_microsite_thumbnail",
    "thumbnail",
    "img_microsite_background",
    "unhighlight_img",
];

/// HTTP client for the Arc Games STO news feed.
pub struct ArcNewsClient {
    client: Client,
    base_url: String,
}

impl ArcNewsClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self { client, base_url }
    }

    /// One GET against the feed. Zero-valued parameters are omitted.
    async fn fetch_page(
        &self,
        tag: &str,
        limit: usize,
        offset: usize,
        platform: &str,
    ) -> Result<Vec<RawArticle>, FetchError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if !tag.is_empty() {
            query.push(("tag", tag.to_string()));
        }
        if limit > 0 {
            query.push(("limit", limit.to_string()));
        }
        if offset > 0 {
            query.push(("offset", offset.to_string()));
        }
        for field in FIELDS {
            query.push(("field[]", field.to_string()));
        }
        if !platform.is_empty() {
            query.push(("platform", platform.to_string()));
        }

        tracing::debug!(tag = %tag, limit, offset, "fetching news page");

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Api(response.status().as_u16()));
        }

        let envelope: NewsEnvelope = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(envelope.news)
    }
}

impl Default for ArcNewsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NewsSource for ArcNewsClient {
    async fn fetch(
        &self,
        tag: &str,
        count: usize,
        options: FetchOptions,
    ) -> Result<Vec<Article>, FetchError> {
        if !options.paginate || count <= options.page_size {
            let raw = self.fetch_page(tag, count, 0, "").await?;
            let articles = normalize_all(raw, tag);
            tracing::info!(count = articles.len(), tag = %tag, "fetched news items");
            return Ok(articles);
        }

        let mut all = Vec::new();
        let mut offset = 0;

        while all.len() < count {
            let remaining = count - all.len();
            let limit = remaining.min(options.page_size);

            let raw = self.fetch_page(tag, limit, offset, "").await?;
            let page_len = raw.len();
            all.extend(normalize_all(raw, tag));

            tracing::info!(
                page = page_len,
                total = all.len(),
                requested = count,
                "fetched news page"
            );

            if page_len == 0 {
                tracing::info!(tag = %tag, "no more news available");
                break;
            }
            offset += page_len;
        }

        Ok(all)
    }
}

#[derive(Deserialize)]
struct NewsEnvelope {
    #[serde(default)]
    news: Vec<RawArticle>,
}

/// An article as it arrives on the wire, before normalization.
#[derive(Deserialize)]
struct RawArticle {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    platforms: Vec<String>,
    #[serde(default)]
    updated: String,
    #[serde(default)]
    images: serde_json::Map<String, serde_json::Value>,
}

/// The feed sends ids as numbers or numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

fn normalize_all(raw: Vec<RawArticle>, requested_tag: &str) -> Vec<Article> {
    raw.into_iter()
        .filter_map(|item| normalize(item, requested_tag))
        .collect()
}

/// Turns a raw feed item into a domain [`Article`]. Items without a
/// usable id are dropped.
fn normalize(raw: RawArticle, requested_tag: &str) -> Option<Article> {
    let id = match raw.id {
        Some(RawId::Number(id)) => id,
        Some(RawId::Text(text)) => match text.parse::<i64>() {
            Ok(id) => id,
            Err(_) => {
                tracing::warn!(id = %text, title = %raw.title, "dropping article with non-numeric id");
                return None;
            }
        },
        None => {
            tracing::warn!(title = %raw.title, "dropping article without an id");
            return None;
        }
    };

    let updated = match parse_updated(&raw.updated) {
        Some(updated) => updated,
        None => {
            tracing::debug!(article_id = id, updated = %raw.updated, "unparseable update time");
            OffsetDateTime::UNIX_EPOCH
        }
    };

    let mut tags = raw.tags;
    if !requested_tag.is_empty() && !tags.iter().any(|t| t == requested_tag) {
        tags.push(requested_tag.to_string());
    }

    let thumbnail_url = THUMBNAIL_KEYS.iter().find_map(|key| {
        raw.images
            .get(*key)
            .and_then(|image| image.get("url"))
            .and_then(|url| url.as_str())
            .map(str::to_string)
    });

    let content = if raw.content.is_empty() {
        String::new()
    } else {
        html::extract_text(&raw.content)
    };

    Some(Article {
        id,
        title: raw.title,
        summary: raw.summary,
        content,
        tags,
        platforms: raw.platforms,
        updated,
        thumbnail_url,
    })
}

/// Parses the feed's update timestamps. Accepts RFC3339 plus the naive
/// `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DDTHH:MM:SS` shapes, taken as UTC.
fn parse_updated(value: &str) -> Option<OffsetDateTime> {
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(parsed);
    }

    let naive_space = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if let Ok(parsed) = PrimitiveDateTime::parse(value, &naive_space) {
        return Some(parsed.assume_utc());
    }

    let naive_t = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    if let Ok(parsed) = PrimitiveDateTime::parse(value, &naive_t) {
        return Some(parsed.assume_utc());
    }

    None
}
