use crate::feed::fetcher::{FeedFetcher, FetchError};
use crate::feed::video::{VideoRecord, UNKNOWN_CHANNEL};
use futures::stream::{self, StreamExt};
use url::form_urlencoded;

pub const DEFAULT_MAX_VIDEOS: usize = 100;
pub const DEFAULT_MAX_CONCURRENT_CHANNELS: usize = 64;

/// Atom feed URL for a YouTube channel id.
pub fn channel_feed_url(channel_id: &str) -> String {
    let id: String = form_urlencoded::byte_serialize(channel_id.as_bytes()).collect();
    format!("https://www.youtube.com/feeds/videos.xml?channel_id={}", id)
}

/// Merges videos from many channels into one recency-ordered page.
#[derive(Debug, Clone)]
pub struct FeedAggregator {
    fetcher: FeedFetcher,
    max_videos: usize,
    max_concurrent: usize,
}

impl FeedAggregator {
    pub fn new(fetcher: FeedFetcher) -> Self {
        Self {
            fetcher,
            max_videos: DEFAULT_MAX_VIDEOS,
            max_concurrent: DEFAULT_MAX_CONCURRENT_CHANNELS,
        }
    }

    pub fn with_max_videos(mut self, max_videos: usize) -> Self {
        self.max_videos = max_videos;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        // buffered(0) would never poll anything
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Fetches one channel's videos in feed order.
    ///
    /// Never fails: a channel whose feed cannot be fetched through any relay
    /// contributes no videos.
    pub async fn fetch_channel(&self, channel_id: &str) -> Vec<VideoRecord> {
        match self.try_fetch_channel(channel_id).await {
            Ok(videos) => videos,
            Err(e) => {
                tracing::warn!(channel = %channel_id, error = %e, "Skipping channel");
                Vec::new()
            }
        }
    }

    async fn try_fetch_channel(&self, channel_id: &str) -> Result<Vec<VideoRecord>, FetchError> {
        let doc = self.fetcher.fetch(&channel_feed_url(channel_id)).await?;

        let source = doc
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNKNOWN_CHANNEL.to_owned());

        let videos: Vec<VideoRecord> = doc
            .entries
            .into_iter()
            .map(|entry| VideoRecord::from_entry(entry, &source))
            .collect();

        tracing::debug!(channel = %channel_id, source = %source, videos = videos.len(), "Channel fetched");
        Ok(videos)
    }

    /// Fetches every channel concurrently, one feed-ordered list per channel id
    /// (empty for unreachable channels), in `channel_ids` order.
    pub async fn fetch_each(&self, channel_ids: &[String]) -> Vec<Vec<VideoRecord>> {
        // buffered (not buffer_unordered) keeps channel order, so equal timestamps merge stably
        stream::iter(channel_ids)
            .map(|id| self.fetch_channel(id))
            .buffered(self.max_concurrent)
            .collect()
            .await
    }

    /// Fetches every channel concurrently and returns the newest videos across all of them.
    ///
    /// Failed channels are skipped. The result holds at most `max_videos`
    /// records, newest first.
    pub async fn fetch_latest(&self, channel_ids: &[String]) -> Vec<VideoRecord> {
        if channel_ids.is_empty() {
            return Vec::new();
        }

        let per_channel = self.fetch_each(channel_ids).await;

        let reachable = per_channel.iter().filter(|v| !v.is_empty()).count();
        tracing::info!(
            channels = channel_ids.len(),
            with_videos = reachable,
            "Channel feeds settled"
        );

        merge_latest(per_channel.into_iter().flatten().collect(), self.max_videos)
    }
}

/// Sorts newest first (undated last, original order kept among ties) and keeps `limit` records.
pub fn merge_latest(mut videos: Vec<VideoRecord>, limit: usize) -> Vec<VideoRecord> {
    // Option orders None < Some, so reversing puts undated videos at the end
    videos.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    videos.truncate(limit);
    videos
}
