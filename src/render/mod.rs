//! Output formats for a merged video list.
//!
//! - [`html`] - standalone page of thumbnail cards with click-to-embed playback
//! - [`listing`] - one line per video for the terminal
//!
//! JSON output needs no module of its own: [`VideoRecord`](crate::feed::VideoRecord)
//! derives `Serialize`.

mod html;
mod listing;

pub use html::{escape_html, render_page, render_video};
pub use listing::render_listing;

use chrono::{DateTime, Utc};

/// Human-readable publish date, e.g. `Jun 1, 2024, 14:05` (UTC).
///
/// Undated videos render as an empty string.
pub fn format_date(published_at: Option<DateTime<Utc>>) -> String {
    published_at
        .map(|dt| dt.format("%b %-d, %Y, %H:%M").to_string())
        .unwrap_or_default()
}
