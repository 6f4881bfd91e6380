//! Configuration file parser for ~/.config/tubefeed/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`,
//! which carries the built-in channel list and public relays. Unknown keys are
//! ignored by serde, though we log a warning when the file contains potential
//! typos.
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::feed::{
    default_relays, FeedAggregator, FeedFetcher, FetchStrategy, Relay,
    DEFAULT_MAX_CONCURRENT_CHANNELS, DEFAULT_MAX_VIDEOS,
};
use crate::forward::DEFAULT_POLL_INTERVAL;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid relay '{name}': {reason}")]
    InvalidRelay { name: String, reason: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// Defaults
// ============================================================================

/// Channels followed when the config file does not list any.
pub const DEFAULT_CHANNELS: &[&str] = &[
    "UC-kM5kL9CgjN9s9pim089gg",
    "UCaN8DZdc8EHo5y1LsQWMiig",
    "UCYO_jab_esuFRV4b17AJtAw",
    "UC-LM91jkqJdWFvm9B5G-w7Q",
    "UCGzP7puUuNiDRnC6_QksAHA",
    "UCI1XS_GkLGDOgf8YLaaXNRA",
    "UCr3cBLTYmIK9kY0F_OdFWFQ",
    "UCEHCDn_BBnk3uTK1M64ptyw",
    "UC9-y-6csu5WGm29I7JiwpnA",
    "UCNvsIonJdJ5E4EXMa65VYpA",
    "UCHTM9IknXs4ZHzwHqDjakoQ",
    "UCCODtTcd5M1JavPCOr_Uydg",
    "UCuCkxoKLYO_EQ2GeFtbM_bw",
    "UCarEovlrD9QY-fy-Z6apIDQ",
    "UCv_vLHiWVBh_FR9vbeuiY-A",
    "UCN9v4QG3AQEP3zuRvVs2dAg",
    "UC1Zc6_BhPXiCWZlrZP4EsEg",
    "UCbuf70y__Wh3MRxZcbj778Q",
    "UCG1h-Wqjtwz7uUANw6gazRw",
    "UCEeL4jELzooI7cyrouQzoJg",
    "UCPdaxSov0mgwh77JvjQO2jQ",
    "UCpBRZBzWQ_cCc_9zKG08L-g",
    "UCeiYXex_fwgYDonaTcSIk6w",
    "UCUHW94eEFW7hkUMVaZz4eDg",
    "UC0intLFzLaudFG-xAvUEO-A",
    "UCoxcjq-8xIDTYp3uz647V5A",
    "UCodbH5mUeF-m_BsNueRDjcw",
    "UCedsqpl7jaIb8BiaUFuC9KQ",
    "UCdoRUr0SUpfGQC4vsXZeovg",
    "UCP5tjEmvPItGyLhmjdwP7Ww",
    "UCKUm503onGg3NatpBtTWHkQ",
    "UCYIEv9W7RmdpvFkHX7IEmyg",
    "UCaTSjmqzOO-P8HmtVW3t7sA",
    "UCBa659QWEk1AI4Tg--mrJ2A",
    "UCHnyfMqiRRG1u-2MsSQLbXA",
    "UCLXo7UDZvByw2ixzpQCufnA",
    "UCeYy3kNtk_vhVSxZhi1WGJw",
    "UCC8AgO4FbP11n_WBdFai7DA",
    "UCJQEEltSpi8LXqMH8uTrCQQ",
    "UC1YDVwTL5M_TVivEdTbfKrA",
    "UCbPHHOiOY_tA9BSytK0jDYw",
    "UCT754i47sbjkeIFSTvwqPyA",
    "UCsP7Bpw36J666Fct5M8u-ZA",
    "UC4ltK4Ozg9haG9tK8ibz3dQ",
    "UC0xnzXxUoQ5c-sdWuORrkhA",
    "UC2Kyj04yISmHr1V-UlJz4eg",
    "UC2hDF4_VrJ7t-Bvc0v0CZzw",
    "UCCR3xZ8j5Zc0UOgUGB0D6-w",
    "UCJaTzWgaz4r94ZwpT4OscIA",
    "UCsaGKqPZnGp_7N80hcHySGQ",
];

/// True for ids of the form `UC` + 22 URL-safe base64 characters.
pub fn is_valid_channel_id(id: &str) -> bool {
    id.len() == 24
        && id.starts_with("UC")
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Trims, validates and de-duplicates channel ids, keeping first-seen order.
///
/// Malformed ids are dropped with a warning rather than failing the run.
pub fn normalize_channels<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut channels = Vec::new();
    for id in ids {
        let id = id.as_ref().trim();
        if !is_valid_channel_id(id) {
            tracing::warn!(channel = %id, "Skipping malformed channel id");
            continue;
        }
        if seen.insert(id.to_owned()) {
            channels.push(id.to_owned());
        }
    }
    channels
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// YouTube channel ids to aggregate.
    pub channels: Vec<String>,

    /// Relays in attempt order.
    pub relays: Vec<Relay>,

    /// `sequential` (default) or `race`.
    pub strategy: FetchStrategy,

    /// Maximum number of videos in the merged list.
    pub max_videos: usize,

    /// How many channel feeds may be in flight at once.
    pub max_concurrent_channels: usize,

    /// Per-relay-attempt timeout in seconds.
    pub request_timeout_secs: u64,

    /// Seconds between forwarding passes in `--forward --watch` mode.
    pub poll_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channels: DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect(),
            relays: default_relays(),
            strategy: FetchStrategy::Sequential,
            max_videos: DEFAULT_MAX_VIDEOS,
            max_concurrent_channels: DEFAULT_MAX_CONCURRENT_CHANNELS,
            request_timeout_secs: 30,
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "channels",
        "relays",
        "strategy",
        "max_videos",
        "max_concurrent_channels",
        "request_timeout_secs",
        "poll_interval_secs",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Values that cannot work (no relays, template without placeholder,
    ///   zero limits) → `Err(ConfigError::InvalidRelay | Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        Self::from_toml(&content).inspect(|config| {
            tracing::info!(
                path = %path.display(),
                channels = config.channels.len(),
                relays = config.relays.len(),
                "Loaded configuration"
            );
        })
    }

    /// Parses and validates TOML config content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let mut config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks relays and limits, and normalizes the channel list.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.relays.is_empty() {
            return Err(ConfigError::Invalid("at least one relay is required".into()));
        }
        for relay in &self.relays {
            validate_relay(relay)?;
        }
        if self.max_videos == 0 {
            return Err(ConfigError::Invalid("max_videos must be at least 1".into()));
        }
        if self.max_concurrent_channels == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_channels must be at least 1".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be at least 1".into(),
            ));
        }

        self.channels = normalize_channels(&self.channels);
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Builds the fetcher described by this config around a shared client.
    pub fn fetcher(&self, client: reqwest::Client) -> FeedFetcher {
        FeedFetcher::new(client, self.relays.clone())
            .with_strategy(self.strategy)
            .with_timeout(self.request_timeout())
    }

    /// Builds the aggregator described by this config around a shared client.
    pub fn aggregator(&self, client: reqwest::Client) -> FeedAggregator {
        FeedAggregator::new(self.fetcher(client))
            .with_max_videos(self.max_videos)
            .with_max_concurrent(self.max_concurrent_channels)
    }
}

fn validate_relay(relay: &Relay) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidRelay {
        name: relay.name.clone(),
        reason,
    };

    if !relay.has_placeholder() {
        return Err(invalid(
            "template must contain {url} or {raw_url}".to_string(),
        ));
    }

    let sample = relay.request_url("https://www.youtube.com/feeds/videos.xml?channel_id=UC");
    let url = Url::parse(&sample).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!(
            "unsupported scheme: {} (only http/https allowed)",
            url.scheme()
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
