use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use url::Url;

use super::document::FeedEntry;

pub const UNKNOWN_CHANNEL: &str = "Unknown Channel";
pub const UNTITLED: &str = "No title";
pub const MISSING_LINK: &str = "#";

/// Base used to resolve relative entry links before reading query parameters.
const LINK_BASE: &str = "https://youtube.com";
const SHORTS_SEGMENT: &str = "/shorts/";
/// Path segments followed by a video id, in lookup order.
const ID_SEGMENTS: [&str; 3] = [SHORTS_SEGMENT, "/embed/", "/videos/"];

/// A single video, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoRecord {
    pub title: String,
    pub link: String,
    /// Publish timestamp exactly as it appeared in the feed (possibly empty).
    pub published: String,
    /// Parsed form of `published`; `None` sorts as the oldest.
    pub published_at: Option<DateTime<Utc>>,
    /// Channel display name.
    pub source: String,
    pub video_id: String,
    pub is_short: bool,
    pub thumbnail: String,
}

impl VideoRecord {
    /// Resolves a raw feed entry into a record, applying the field defaults.
    pub fn from_entry(entry: FeedEntry, source: &str) -> Self {
        let link = present(entry.link).unwrap_or_else(|| MISSING_LINK.to_owned());
        let video_id = present(entry.video_id)
            .or_else(|| video_id_from_link(&link))
            .unwrap_or_default();
        let thumbnail = present(entry.thumbnail).unwrap_or_else(|| thumbnail_url(&video_id));
        let published = present(entry.published).unwrap_or_default();

        Self {
            title: present(entry.title).unwrap_or_else(|| UNTITLED.to_owned()),
            is_short: is_short_link(&link),
            published_at: parse_published(&published),
            published,
            source: source.to_owned(),
            link,
            video_id,
            thumbnail,
        }
    }

    pub fn embed_url(&self) -> String {
        embed_url(&self.video_id)
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Extracts a video id from a watch, shorts, embed or `/videos/` link.
///
/// The `v` query parameter wins over path segments, which are tried as
/// `/shorts/<id>`, `/embed/<id>`, then `/videos/<id>`.
pub fn video_id_from_link(link: &str) -> Option<String> {
    let base = Url::parse(LINK_BASE).ok()?;
    let url = base.join(link).ok()?;

    if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        if !v.is_empty() {
            return Some(v.into_owned());
        }
    }

    ID_SEGMENTS.iter().find_map(|segment| {
        let (_, rest) = url.path().split_once(*segment)?;
        let id = rest.split('/').next().unwrap_or_default();
        (!id.is_empty()).then(|| id.to_owned())
    })
}

/// True if the link points at short-form content.
pub fn is_short_link(link: &str) -> bool {
    match Url::parse(LINK_BASE).and_then(|base| base.join(link)) {
        Ok(url) => url.path().contains(SHORTS_SEGMENT),
        Err(_) => link.contains(SHORTS_SEGMENT),
    }
}

/// Thumbnail derived from a video id; empty when the id is empty.
pub fn thumbnail_url(video_id: &str) -> String {
    if video_id.is_empty() {
        String::new()
    } else {
        format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", video_id)
    }
}

/// Privacy-enhanced player URL for a video id.
pub fn embed_url(video_id: &str) -> String {
    format!("https://www.youtube-nocookie.com/embed/{}", video_id)
}

/// Parses feed timestamps: RFC 3339, RFC 2822, naive date-times and bare dates (as UTC).
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
