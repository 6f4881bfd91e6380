use std::path::PathBuf;
use std::time::Duration;

use crate::feed::{FeedAggregator, VideoRecord};
use crate::forward::discord::DiscordWebhook;
use crate::forward::state::{SeenLinks, StateError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3600);

/// Key under which a channel's delivered links are stored.
pub fn state_key(channel_id: &str) -> String {
    format!("youtube:{}", channel_id)
}

/// Outcome of one pass over all channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardReport {
    /// Videos posted to the webhook.
    pub sent: usize,
    /// Short-form videos recorded as seen without posting.
    pub skipped_shorts: usize,
    /// Videos the webhook refused; they stay unseen and are retried next pass.
    pub failed: usize,
}

/// Posts videos the state file has not seen yet to a Discord webhook.
#[derive(Debug)]
pub struct Forwarder {
    aggregator: FeedAggregator,
    webhook: DiscordWebhook,
    state_path: PathBuf,
    seen: SeenLinks,
}

impl Forwarder {
    /// Loads the seen-link state from `state_path` (missing means nothing seen yet).
    pub fn new(
        aggregator: FeedAggregator,
        webhook: DiscordWebhook,
        state_path: impl Into<PathBuf>,
    ) -> Result<Self, StateError> {
        let state_path = state_path.into();
        let seen = SeenLinks::load(&state_path)?;
        Ok(Self {
            aggregator,
            webhook,
            state_path,
            seen,
        })
    }

    pub fn seen(&self) -> &SeenLinks {
        &self.seen
    }

    /// Fetches every channel, then posts each unseen video oldest first.
    ///
    /// Channels are fetched concurrently but delivered one after another in
    /// `channel_ids` order, so the webhook receives each channel's uploads
    /// chronologically.
    pub async fn forward_once(&mut self, channel_ids: &[String]) -> ForwardReport {
        let per_channel = self.aggregator.fetch_each(channel_ids).await;

        let mut report = ForwardReport::default();
        for (channel_id, videos) in channel_ids.iter().zip(per_channel) {
            self.forward_channel(&state_key(channel_id), videos, &mut report)
                .await;
        }

        tracing::info!(
            sent = report.sent,
            skipped_shorts = report.skipped_shorts,
            failed = report.failed,
            "Forwarding pass finished"
        );
        report
    }

    async fn forward_channel(
        &mut self,
        feed: &str,
        videos: Vec<VideoRecord>,
        report: &mut ForwardReport,
    ) {
        // Feeds list newest first
        for video in videos.into_iter().rev() {
            if !video.link.starts_with("http") || self.seen.contains(feed, &video.link) {
                continue;
            }

            if video.is_short {
                tracing::info!(link = %video.link, "Skipping short");
                report.skipped_shorts += 1;
                self.remember(feed, &video.link);
                continue;
            }

            match self.webhook.send(&video).await {
                Ok(()) => {
                    tracing::info!(feed = %feed, title = %video.title, "Sent to Discord");
                    report.sent += 1;
                    self.remember(feed, &video.link);
                }
                Err(e) => {
                    tracing::warn!(link = %video.link, error = %e, "Will retry this video later");
                    report.failed += 1;
                }
            }
        }
    }

    /// Records a link and persists the state right away, so an interrupted
    /// pass never re-posts what it already delivered.
    fn remember(&mut self, feed: &str, link: &str) {
        self.seen.insert(feed, link);
        if let Err(e) = self.seen.save(&self.state_path) {
            tracing::warn!(path = %self.state_path.display(), error = %e, "Failed to save state");
        }
    }

    /// Runs a pass every `every`, forever. Passes that overrun the interval
    /// skip the missed ticks instead of running back to back.
    pub async fn run(&mut self, channel_ids: &[String], every: Duration) {
        tracing::info!(
            channels = channel_ids.len(),
            interval_secs = every.as_secs(),
            "Starting forwarder"
        );
        let mut timer = tokio::time::interval(every);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            timer.tick().await;
            self.forward_once(channel_ids).await;
        }
    }
}
