//! Channel feed retrieval and aggregation.
//!
//! YouTube serves channel feeds without cross-origin headers, so every feed is
//! fetched through a third-party relay. This module covers the whole path
//! from a channel id to a merged, recency-ordered list of videos:
//!
//! - [`relay`] - relay templates and the default public relays
//! - [`fetcher`] - tries relays in order (or races them) until one yields a feed
//! - [`document`] - Atom XML to [`FeedDocument`] using `quick-xml`
//! - [`video`] - [`VideoRecord`] and its field fallbacks
//! - [`aggregator`] - concurrent per-channel fetch, merge, sort, truncate
//!
//! # Example
//!
//! ```ignore
//! use tubefeed::feed::{default_relays, FeedAggregator, FeedFetcher};
//!
//! let fetcher = FeedFetcher::new(reqwest::Client::new(), default_relays());
//! let videos = FeedAggregator::new(fetcher).fetch_latest(&channels).await;
//! ```

mod aggregator;
mod document;
mod fetcher;
mod relay;
mod video;

pub use aggregator::{
    channel_feed_url, merge_latest, FeedAggregator, DEFAULT_MAX_CONCURRENT_CHANNELS,
    DEFAULT_MAX_VIDEOS,
};
pub use document::{FeedDocument, FeedEntry, FeedParseError};
pub use fetcher::{FeedFetcher, FetchError, FetchStrategy, RelayError, DEFAULT_TIMEOUT};
pub use relay::{default_relays, Relay};
pub use video::{embed_url, parse_published, thumbnail_url, video_id_from_link, VideoRecord};
