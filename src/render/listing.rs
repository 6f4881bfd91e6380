use std::borrow::Cow;
use std::fmt::Write;

use crate::feed::VideoRecord;
use crate::util::{display_width, strip_control_chars, truncate_to_width};

const DATE_COLUMN: usize = 16; // "2024-06-01 14:05"
const SOURCE_COLUMN: usize = 20;
const SHORT_MARKER: &str = " [SHORT]";

/// Renders videos as aligned terminal lines: date, channel, title.
///
/// Feed text is stripped of control sequences before it reaches the terminal,
/// and each line fits within `width` display columns (when `width` leaves room
/// for the title column at all).
pub fn render_listing(videos: &[VideoRecord], width: usize) -> String {
    let title_width = width.saturating_sub(DATE_COLUMN + SOURCE_COLUMN + 4);
    let mut out = String::new();

    for video in videos {
        let date = video
            .published_at
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();

        let source = single_line(&video.source);
        let source = truncate_to_width(&source, SOURCE_COLUMN);

        let mut title = single_line(&video.title).into_owned();
        if video.is_short {
            title.push_str(SHORT_MARKER);
        }
        let title = truncate_to_width(&title, title_width);

        let _ = writeln!(
            out,
            "{}  {}  {}",
            pad(&date, DATE_COLUMN),
            pad(&source, SOURCE_COLUMN),
            title
        );
    }
    out
}

/// Control sequences removed and line breaks/tabs flattened to spaces, so a
/// feed value can never start a new row or rewind the current one.
fn single_line(s: &str) -> Cow<'_, str> {
    match strip_control_chars(s) {
        Cow::Borrowed(b) if !b.contains(['\n', '\r', '\t']) => Cow::Borrowed(b),
        stripped => Cow::Owned(stripped.replace(['\n', '\r', '\t'], " ")),
    }
}

/// Pads to `width` display columns; `format!("{:w$}")` counts chars, not columns.
fn pad(s: &str, width: usize) -> String {
    let fill = width.saturating_sub(display_width(s));
    format!("{}{}", s, " ".repeat(fill))
}
