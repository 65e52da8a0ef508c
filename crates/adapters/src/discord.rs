//! Discord REST chat adapter
//!
//! Implements [`ChatService`] against the Discord HTTP API: posting
//! article embeds and reading back the bot's own recent messages for the
//! duplicate check. Rate limits (429) and server errors are retried here
//! with bounded exponential backoff so the engine can treat posting as a
//! single call.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::sleep;

use stobot_domain::usecases::article_embed;
use stobot_domain::{Article, ChatError, ChatService, Embed, EmbedText, RecentMessage};

const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Discord REST implementation of [`ChatService`].
pub struct DiscordChat {
    client: Client,
    token: SecretString,
    base_url: String,
    own_user_id: OnceCell<String>,
}

impl DiscordChat {
    pub fn new(token: SecretString) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(token: SecretString, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            token,
            base_url,
            own_user_id: OnceCell::new(),
        }
    }

    /// The bot's own user id, fetched once from `/users/@me`.
    async fn own_user_id(&self) -> Result<&str, ChatError> {
        self.own_user_id
            .get_or_try_init(|| async {
                let url = format!("{}/users/@me", self.base_url);
                let response = self.execute_with_retry(|| self.client.get(&url)).await?;
                let user: WireUser = response
                    .json()
                    .await
                    .map_err(|e| ChatError::Api(e.to_string()))?;
                tracing::debug!(user_id = %user.id, "resolved own user id");
                Ok(user.id)
            })
            .await
            .map(String::as_str)
    }

    /// Sends a request, retrying rate limits and server errors with
    /// exponential backoff. `build` is invoked once per attempt.
    async fn execute_with_retry<F>(&self, build: F) -> Result<reqwest::Response, ChatError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut delay = INITIAL_BACKOFF;

        for attempt in 0..=MAX_RETRIES {
            let response = build()
                .header(
                    "Authorization",
                    format!("Bot {}", self.token.expose_secret()),
                )
                .send()
                .await
                .map_err(|e| ChatError::Network(e.to_string()))?;

            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                return Err(ChatError::Auth("invalid bot token".to_string()));
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .json::<WireRateLimit>()
                    .await
                    .ok()
                    .map(|body| Duration::from_secs_f64(body.retry_after));
                if attempt == MAX_RETRIES {
                    return Err(ChatError::RateLimited(retry_after));
                }
                let wait = retry_after.unwrap_or(delay);
                tracing::warn!(wait = ?wait, "rate limited by chat service, backing off");
                sleep(wait).await;
            } else if status.is_server_error() {
                if attempt == MAX_RETRIES {
                    return Err(ChatError::Api(format!("server returned status {status}")));
                }
                tracing::warn!(status = %status, wait = ?delay, "chat service error, backing off");
                sleep(delay).await;
            } else if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                if status == StatusCode::FORBIDDEN || is_missing_access_code(&body) {
                    return Err(ChatError::MissingAccess);
                }
                return Err(ChatError::Api(format!("status {status}: {body}")));
            } else {
                return Ok(response);
            }

            delay *= 2;
        }

        unreachable!("retry loop always returns")
    }
}

#[async_trait]
impl ChatService for DiscordChat {
    async fn post_article(&self, channel_id: &str, article: &Article) -> Result<(), ChatError> {
        let embed = WireEmbed::from(article_embed(article));
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        let payload = serde_json::json!({ "embeds": [embed] });

        self.execute_with_retry(|| self.client.post(&url).json(&payload))
            .await?;

        Ok(())
    }

    async fn recent_own_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<RecentMessage>, ChatError> {
        let own_id = self.own_user_id().await?.to_string();

        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        let response = self
            .execute_with_retry(|| self.client.get(&url).query(&[("limit", limit.to_string())]))
            .await?;

        let messages: Vec<WireMessage> = response
            .json()
            .await
            .map_err(|e| ChatError::Api(e.to_string()))?;

        Ok(messages
            .into_iter()
            .filter(|message| message.author.id == own_id)
            .map(|message| RecentMessage {
                content: message.content,
                embeds: message
                    .embeds
                    .into_iter()
                    .map(|embed| EmbedText {
                        title: embed.title,
                        description: embed.description,
                    })
                    .collect(),
            })
            .collect())
    }
}

#[derive(Serialize)]
struct WireEmbed {
    title: String,
    description: String,
    url: String,
    color: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    timestamp: String,
    footer: WireFooter,
    fields: Vec<WireField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<WireThumbnail>,
}

#[derive(Serialize)]
struct WireFooter {
    text: String,
}

#[derive(Serialize)]
struct WireField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Serialize)]
struct WireThumbnail {
    url: String,
}

impl From<Embed> for WireEmbed {
    fn from(embed: Embed) -> Self {
        Self {
            title: embed.title,
            description: embed.description,
            url: embed.url,
            color: embed.color,
            timestamp: embed.timestamp,
            footer: WireFooter {
                text: embed.footer_text,
            },
            fields: embed
                .fields
                .into_iter()
                .map(|field| WireField {
                    name: field.name,
                    value: field.value,
                    inline: field.inline,
                })
                .collect(),
            thumbnail: embed.thumbnail_url.map(|url| WireThumbnail { url }),
        }
    }
}

/// Discord error codes for "Missing Access" and "Missing Permissions".
const MISSING_ACCESS_CODES: [u64; 2] = [50001, 50013];

fn is_missing_access_code(body: &str) -> bool {
    serde_json::from_str::<WireApiError>(body)
        .map(|error| MISSING_ACCESS_CODES.contains(&error.code))
        .unwrap_or(false)
}

#[derive(Deserialize)]
struct WireApiError {
    #[serde(default)]
    code: u64,
}

#[derive(Deserialize)]
struct WireUser {
    id: String,
}

#[derive(Deserialize)]
struct WireRateLimit {
    retry_after: f64,
}

#[derive(Deserialize)]
struct WireMessage {
    author: WireAuthor,
    #[serde(default)]
    content: String,
    #[serde(default)]
    embeds: Vec<WireEmbedText>,
}

#[derive(Deserialize)]
struct WireAuthor {
    id: String,
}

#[derive(Deserialize)]
struct WireEmbedText {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn article() -> Article {
        Article {
            id: 11816253,
            title: "Tholian Assembly Update".to_string(),
            summary: "The Tholians are back.".to_string(),
            content: String::new(),
            tags: vec!["star-trek-online".to_string()],
            platforms: vec!["pc".to_string()],
            updated: datetime!(2024-01-15 12:00:00 UTC),
            thumbnail_url: Some("https://img/thumb.jpg".to_string()),
        }
    }

    fn chat_for(server: &MockServer) -> DiscordChat {
        DiscordChat::with_base_url(SecretString::from("test-token"), server.uri())
    }

    #[tokio::test]
    async fn post_article_sends_the_rendered_embed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/channels/CH1/messages"))
            .and(header("Authorization", "Bot test-token"))
            .and(body_partial_json(json!({
                "embeds": [{
                    "title": "Tholian Assembly Update",
                    "description": "The Tholians are back.",
                    "url": "https://playstartrekonline.com/en/news/article/11816253",
                    "color": 65280,
                    "timestamp": "2024-01-15T12:00:00Z",
                    "footer": {"text": "Platforms: pc"},
                    "fields": [
                        {"name": "Tags", "value": "star-trek-online", "inline": true},
                        {"name": "Platforms", "value": "pc", "inline": true}
                    ],
                    "thumbnail": {"url": "https://img/thumb.jpg"}
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1"})))
            .expect(1)
            .mount(&server)
            .await;

        let chat = chat_for(&server);
        chat.post_article("CH1", &article()).await.unwrap();
    }

    #[tokio::test]
    async fn post_retries_transient_server_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/channels/CH1/messages"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/channels/CH1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1"})))
            .expect(1)
            .mount(&server)
            .await;

        let chat = chat_for(&server);
        chat.post_article("CH1", &article()).await.unwrap();
    }

    #[tokio::test]
    async fn post_honors_rate_limit_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/channels/CH1/messages"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(json!({"retry_after": 0.01})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/channels/CH1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1"})))
            .expect(1)
            .mount(&server)
            .await;

        let chat = chat_for(&server);
        chat.post_article("CH1", &article()).await.unwrap();
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/channels/CH1/messages"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let chat = chat_for(&server);
        let result = chat.post_article("CH1", &article()).await;

        assert!(matches!(result, Err(ChatError::Auth(_))));
    }

    #[tokio::test]
    async fn recent_messages_keeps_only_own_messages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/@me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "BOT42"})))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/channels/CH2/messages"))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "author": {"id": "BOT42"},
                    "content": "",
                    "embeds": [{"title": "Tholian Assembly Update", "description": "Details"}]
                },
                {
                    "author": {"id": "SOMEONE_ELSE"},
                    "content": "unrelated chatter",
                    "embeds": []
                }
            ])))
            .mount(&server)
            .await;

        let chat = chat_for(&server);
        let messages = chat.recent_own_messages("CH2", 10).await.unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].embeds.len(), 1);
        assert_eq!(messages[0].embeds[0].title, "Tholian Assembly Update");
        assert_eq!(messages[0].embeds[0].description, "Details");
    }

    #[tokio::test]
    async fn forbidden_message_read_maps_to_missing_access() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/@me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "BOT42"})))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/channels/CH3/messages"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let chat = chat_for(&server);
        let result = chat.recent_own_messages("CH3", 10).await;

        assert!(matches!(result, Err(ChatError::MissingAccess)));
    }

    #[tokio::test]
    async fn missing_access_error_code_maps_to_missing_access() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/channels/CH4/messages"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "message": "Missing Access",
                "code": 50001
            })))
            .mount(&server)
            .await;

        let chat = chat_for(&server);
        let result = chat.post_article("CH4", &article()).await;

        assert!(matches!(result, Err(ChatError::MissingAccess)));
    }

    #[tokio::test]
    async fn missing_permissions_code_maps_even_without_a_403_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/channels/CH5/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "Missing Permissions",
                "code": 50013
            })))
            .mount(&server)
            .await;

        let chat = chat_for(&server);
        let result = chat.post_article("CH5", &article()).await;

        assert!(matches!(result, Err(ChatError::MissingAccess)));
    }
}
