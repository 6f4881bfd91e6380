use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::feed::VideoRecord;

/// Discord rejects embed titles longer than this.
const MAX_TITLE_CHARS: usize = 256;
const MAX_ERROR_BODY_CHARS: usize = 200;
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum WebhookError {
    /// Network-level error, with the webhook URL stripped
    #[error("webhook request failed: {0}")]
    Network(reqwest::Error),
    #[error("webhook returned status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("webhook request timed out")]
    Timeout,
}

#[derive(Debug, Serialize)]
struct EmbedMessage<'a> {
    embeds: [Embed<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: String,
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedImage<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct TextMessage {
    content: String,
}

fn embed_title(video: &VideoRecord) -> String {
    video.title.trim().chars().take(MAX_TITLE_CHARS).collect()
}

/// One embed per video: title linking to the video, thumbnail as the image.
fn embed_message(video: &VideoRecord) -> EmbedMessage<'_> {
    let image = video
        .thumbnail
        .starts_with("http")
        .then_some(EmbedImage {
            url: &video.thumbnail,
        });

    EmbedMessage {
        embeds: [Embed {
            title: embed_title(video),
            url: &video.link,
            image,
        }],
    }
}

/// Plain-text message for when Discord refuses the embed.
fn text_message(video: &VideoRecord) -> TextMessage {
    TextMessage {
        content: format!("{}\n{}", embed_title(video), video.link),
    }
}

/// A Discord incoming webhook. The URL embeds the webhook token, so it is
/// kept as a secret and never logged.
#[derive(Debug)]
pub struct DiscordWebhook {
    client: reqwest::Client,
    url: SecretString,
    timeout: Duration,
}

impl DiscordWebhook {
    pub fn new(client: reqwest::Client, url: SecretString) -> Self {
        Self {
            client,
            url,
            timeout: WEBHOOK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Posts the video as an embed, falling back to a text message when the
    /// embed is rejected with 400.
    pub async fn send(&self, video: &VideoRecord) -> Result<(), WebhookError> {
        match self.post(&embed_message(video)).await {
            Err(WebhookError::Rejected { status: 400, body }) => {
                tracing::warn!(link = %video.link, body = %body, "Embed rejected, sending text message");
                self.post(&text_message(video)).await
            }
            result => result,
        }
    }

    async fn post<T: Serialize>(&self, payload: &T) -> Result<(), WebhookError> {
        let request = self.client.post(self.url.expose_secret()).json(payload).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| WebhookError::Timeout)?
            .map_err(|e| WebhookError::Network(e.without_url()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(WebhookError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedEntry;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn video(title: &str) -> VideoRecord {
        VideoRecord::from_entry(
            FeedEntry {
                title: Some(title.to_owned()),
                link: Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_owned()),
                ..FeedEntry::default()
            },
            "Chan",
        )
    }

    fn webhook(server: &MockServer) -> DiscordWebhook {
        let url = format!("{}/api/webhooks/1/token", server.uri());
        DiscordWebhook::new(reqwest::Client::new(), SecretString::from(url))
    }

    #[test]
    fn test_embed_payload() {
        let payload = serde_json::to_value(embed_message(&video("  Ownership  "))).unwrap();
        assert_eq!(
            payload,
            json!({
                "embeds": [{
                    "title": "Ownership",
                    "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                    "image": { "url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg" }
                }]
            })
        );
    }

    #[test]
    fn test_embed_without_thumbnail_has_no_image() {
        let v = VideoRecord::from_entry(FeedEntry::default(), "Chan");
        let payload = serde_json::to_value(embed_message(&v)).unwrap();
        assert!(payload["embeds"][0].get("image").is_none());
    }

    #[test]
    fn test_embed_title_is_capped() {
        let long = "é".repeat(300);
        let payload = serde_json::to_value(embed_message(&video(&long))).unwrap();
        let title = payload["embeds"][0]["title"].as_str().unwrap();
        assert_eq!(title.chars().count(), 256);
    }

    #[test]
    fn test_debug_hides_webhook_url() {
        let hook = DiscordWebhook::new(
            reqwest::Client::new(),
            SecretString::from("https://discord.com/api/webhooks/1/very-secret-token".to_owned()),
        );
        assert!(!format!("{:?}", hook).contains("very-secret-token"));
    }

    #[tokio::test]
    async fn test_send_posts_embed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/webhooks/1/token"))
            .and(body_json(embed_message(&video("Hello"))))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        webhook(&server).send(&video("Hello")).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_embed_falls_back_to_text() {
        let server = MockServer::start().await;
        Mock::given(body_string_contains("embeds"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Invalid Form Body"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(body_json(json!({
            "content": "Hello\nhttps://www.youtube.com/watch?v=dQw4w9WgXcQ"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

        webhook(&server).send(&video("Hello")).await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .expect(1)
            .mount(&server)
            .await;

        let err = webhook(&server).send(&video("Hello")).await.unwrap_err();
        match err {
            WebhookError::Rejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "oops");
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_webhook_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let err = webhook(&server)
            .with_timeout(Duration::from_millis(200))
            .send(&video("Hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Timeout));
    }
}
