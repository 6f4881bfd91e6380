use crate::feed::document::{FeedDocument, FeedParseError};
use crate::feed::relay::Relay;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a single relay attempt failed. Every variant is recovered by moving on
/// to the next relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("response too large")]
    ResponseTooLarge,
    /// JSON envelope was unreadable or lacked the expected string field
    #[error("bad relay envelope: {0}")]
    Envelope(String),
    /// Body was not a well-formed feed
    #[error("parse error: {0}")]
    Parse(#[from] FeedParseError),
}

/// Errors returned by [`FeedFetcher::fetch`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every relay failed for this feed.
    #[error("feed unavailable: {url} ({attempts} relay attempts failed)")]
    Unavailable { url: String, attempts: usize },
}

/// How relays are tried for one feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// One relay at a time in configured order; deterministic.
    #[default]
    Sequential,
    /// All relays at once, first success wins and the rest are dropped.
    Race,
}

/// Fetches feeds through an ordered list of relays.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    relays: Vec<Relay>,
    strategy: FetchStrategy,
    timeout: Duration,
}

impl FeedFetcher {
    pub fn new(client: reqwest::Client, relays: Vec<Relay>) -> Self {
        Self {
            client,
            relays,
            strategy: FetchStrategy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetches and parses the feed at `url`.
    ///
    /// Each relay is tried at most once. The first attempt yielding a
    /// well-formed feed wins.
    ///
    /// # Errors
    ///
    /// [`FetchError::Unavailable`] when every relay failed (or none are configured).
    pub async fn fetch(&self, url: &str) -> Result<FeedDocument, FetchError> {
        let result = match self.strategy {
            FetchStrategy::Sequential => self.fetch_sequential(url).await,
            FetchStrategy::Race => self.fetch_race(url).await,
        };

        result.map_err(|attempts| {
            tracing::warn!(url = %url, attempts = attempts, "All relays failed");
            FetchError::Unavailable {
                url: url.to_owned(),
                attempts,
            }
        })
    }

    /// Returns the failed attempt count on exhaustion.
    async fn fetch_sequential(&self, url: &str) -> Result<FeedDocument, usize> {
        for (index, relay) in self.relays.iter().enumerate() {
            match self.attempt(relay, url).await {
                Ok(doc) => {
                    tracing::debug!(relay = %relay.name, url = %url, failed = index, "Feed fetched");
                    return Ok(doc);
                }
                Err(e) => log_failure(relay, url, &e),
            }
        }
        Err(self.relays.len())
    }

    async fn fetch_race(&self, url: &str) -> Result<FeedDocument, usize> {
        let mut attempts: FuturesUnordered<_> = self
            .relays
            .iter()
            .map(|relay| async move { (relay, self.attempt(relay, url).await) })
            .collect();

        let mut failed = 0;
        while let Some((relay, result)) = attempts.next().await {
            match result {
                Ok(doc) => {
                    tracing::debug!(relay = %relay.name, url = %url, "Feed fetched (race winner)");
                    return Ok(doc);
                }
                Err(e) => {
                    log_failure(relay, url, &e);
                    failed += 1;
                }
            }
        }
        Err(failed)
    }

    /// One relay attempt; the timeout covers the request, the body read and parsing.
    async fn attempt(&self, relay: &Relay, url: &str) -> Result<FeedDocument, RelayError> {
        tokio::time::timeout(self.timeout, self.request(relay, url))
            .await
            .map_err(|_| RelayError::Timeout)?
    }

    async fn request(&self, relay: &Relay, url: &str) -> Result<FeedDocument, RelayError> {
        let request_url = relay.request_url(url);
        let response = self.client.get(&request_url).send().await?;

        if !response.status().is_success() {
            return Err(RelayError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;

        let body = match relay.json_field.as_deref() {
            Some(field) => unwrap_envelope(&bytes, field)?,
            None => String::from_utf8_lossy(&bytes).into_owned(),
        };

        Ok(FeedDocument::parse(&body)?)
    }
}

fn log_failure(relay: &Relay, url: &str, error: &RelayError) {
    tracing::debug!(relay = %relay.name, url = %url, error = %error, "Relay attempt failed");
}

/// Pulls the relayed document out of a JSON envelope like `{"contents": "<feed>…"}`.
fn unwrap_envelope(bytes: &[u8], field: &str) -> Result<String, RelayError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| RelayError::Envelope(e.to_string()))?;

    match value.get(field) {
        Some(serde_json::Value::String(contents)) => Ok(contents.clone()),
        Some(other) => Err(RelayError::Envelope(format!(
            "field '{}' is not a string: {}",
            field, other
        ))),
        None => Err(RelayError::Envelope(format!("missing field '{}'", field))),
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, RelayError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(RelayError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(RelayError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TARGET: &str = "https://www.youtube.com/feeds/videos.xml?channel_id=UCtest";

    const VALID_FEED: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>Relay Test</title>
    <entry><title>Only video</title></entry>
</feed>"#;

    fn relay(server: &MockServer, name: &str) -> Relay {
        Relay::new(name, format!("{}/{}?url={{url}}", server.uri(), name))
    }

    fn fetcher(relays: Vec<Relay>) -> FeedFetcher {
        FeedFetcher::new(reqwest::Client::new(), relays)
    }

    #[tokio::test]
    async fn test_fetch_first_relay_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/one"))
            .and(query_param("url", TARGET))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_FEED))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/two"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_FEED))
            .expect(0)
            .mount(&server)
            .await;

        let doc = fetcher(vec![relay(&server, "one"), relay(&server, "two")])
            .fetch(TARGET)
            .await
            .unwrap();
        assert_eq!(doc.title.as_deref(), Some("Relay Test"));
    }

    #[tokio::test]
    async fn test_fallback_to_third_relay() {
        let server = MockServer::start().await;
        Mock::given(path("/one"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/two"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/three"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_FEED))
            .expect(1)
            .mount(&server)
            .await;

        let relays = vec![
            relay(&server, "one"),
            relay(&server, "two"),
            relay(&server, "three"),
        ];
        let doc = fetcher(relays).fetch(TARGET).await.unwrap();
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.entries[0].title.as_deref(), Some("Only video"));
    }

    #[tokio::test]
    async fn test_invalid_xml_falls_through() {
        let server = MockServer::start().await;
        Mock::given(path("/one"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>blocked"))
            .mount(&server)
            .await;
        Mock::given(path("/two"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_FEED))
            .mount(&server)
            .await;

        let doc = fetcher(vec![relay(&server, "one"), relay(&server, "two")])
            .fetch(TARGET)
            .await
            .unwrap();
        assert_eq!(doc.title.as_deref(), Some("Relay Test"));
    }

    #[tokio::test]
    async fn test_json_envelope() {
        let server = MockServer::start().await;
        Mock::given(path("/wrapped"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "contents": VALID_FEED,
                "status": { "http_code": 200 }
            })))
            .mount(&server)
            .await;

        let wrapped = relay(&server, "wrapped").with_json_field("contents");
        let doc = fetcher(vec![wrapped]).fetch(TARGET).await.unwrap();
        assert_eq!(doc.title.as_deref(), Some("Relay Test"));
    }

    #[tokio::test]
    async fn test_envelope_with_null_contents_fails() {
        let server = MockServer::start().await;
        Mock::given(path("/wrapped"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "contents": null })),
            )
            .mount(&server)
            .await;

        let wrapped = relay(&server, "wrapped").with_json_field("contents");
        let err = fetcher(vec![wrapped]).fetch(TARGET).await.unwrap_err();
        match err {
            FetchError::Unavailable { url, attempts } => {
                assert_eq!(url, TARGET);
                assert_eq!(attempts, 1);
            }
        }
    }

    #[tokio::test]
    async fn test_all_relays_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2) // Each relay tried exactly once, no retries
            .mount(&server)
            .await;

        let err = fetcher(vec![relay(&server, "one"), relay(&server, "two")])
            .fetch(TARGET)
            .await
            .unwrap_err();
        assert!(err.to_string().contains(TARGET));
        assert!(matches!(err, FetchError::Unavailable { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_no_relays() {
        let err = fetcher(Vec::new()).fetch(TARGET).await.unwrap_err();
        assert!(matches!(err, FetchError::Unavailable { attempts: 0, .. }));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_FEED)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        Mock::given(path("/fast"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_FEED))
            .mount(&server)
            .await;

        let doc = fetcher(vec![relay(&server, "slow"), relay(&server, "fast")])
            .with_timeout(Duration::from_millis(200))
            .fetch(TARGET)
            .await
            .unwrap();
        assert_eq!(doc.title.as_deref(), Some("Relay Test"));
    }

    #[tokio::test]
    async fn test_timeout_spans_headers_and_body() {
        use tokio::io::AsyncWriteExt;

        // Headers arrive late, then the body stalls halfway
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\n<feed>")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let stalled = Relay::new("stalled", format!("http://{}/?url={{url}}", addr));
        let fetcher = fetcher(vec![stalled.clone()]).with_timeout(Duration::from_millis(400));

        let started = std::time::Instant::now();
        let result = fetcher.attempt(&stalled, TARGET).await;
        assert!(matches!(result, Err(RelayError::Timeout)));
        assert!(started.elapsed() < Duration::from_millis(650));
    }

    #[tokio::test]
    async fn test_race_takes_any_success() {
        let server = MockServer::start().await;
        Mock::given(path("/one"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        Mock::given(path("/two"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_FEED))
            .mount(&server)
            .await;

        let doc = fetcher(vec![relay(&server, "one"), relay(&server, "two")])
            .with_strategy(FetchStrategy::Race)
            .fetch(TARGET)
            .await
            .unwrap();
        assert_eq!(doc.title.as_deref(), Some("Relay Test"));
    }

    #[tokio::test]
    async fn test_race_all_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not xml"))
            .mount(&server)
            .await;

        let err = fetcher(vec![relay(&server, "one"), relay(&server, "two")])
            .with_strategy(FetchStrategy::Race)
            .fetch(TARGET)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unavailable { attempts: 2, .. }));
    }

    #[test]
    fn test_unwrap_envelope_missing_field() {
        let err = unwrap_envelope(br#"{"other": "x"}"#, "contents").unwrap_err();
        assert!(err.to_string().contains("missing field 'contents'"));
    }

    #[test]
    fn test_unwrap_envelope_not_json() {
        assert!(matches!(
            unwrap_envelope(b"<feed/>", "contents"),
            Err(RelayError::Envelope(_))
        ));
    }
}
