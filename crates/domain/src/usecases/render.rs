//! Rendering - builds the rich embed posted for an article

use crate::model::{truncate_text, Article, Embed, EmbedField};
use time::format_description::well_known::Rfc3339;

/// Accent color of article embeds.
pub const EMBED_COLOR: u32 = 0x00ff00;

/// Base URL articles link back to; the article id is appended.
pub const ARTICLE_URL_BASE: &str = "https://playstartrekonline.com/en/news/article";

const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 2048;

/// Build the embed for an article: truncated title and summary, a link
/// derived from the article id, platform footer, inline tag/platform
/// fields, and the upstream update time as the embed timestamp.
pub fn article_embed(article: &Article) -> Embed {
    let platforms = article.platforms.join(", ");
    let timestamp = article
        .updated
        .format(&Rfc3339)
        .unwrap_or_default();

    Embed {
        title: truncate_text(&article.title, TITLE_LIMIT),
        description: truncate_text(&article.summary, DESCRIPTION_LIMIT),
        url: format!("{}/{}", ARTICLE_URL_BASE, article.id),
        color: EMBED_COLOR,
        timestamp,
        footer_text: format!("Platforms: {}", platforms),
        fields: vec![
            EmbedField {
                name: "Tags".to_string(),
                value: article.tags.join(", "),
                inline: true,
            },
            EmbedField {
                name: "Platforms".to_string(),
                value: platforms,
                inline: true,
            },
        ],
        thumbnail_url: article.thumbnail_url.clone(),
    }
}
