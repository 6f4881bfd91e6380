use std::borrow::Cow;
use std::fmt::Write;

use crate::feed::VideoRecord;
use crate::render::format_date;

/// Escapes text for interpolation into HTML element content or quoted attributes.
///
/// Returns `Cow::Borrowed` when nothing needs escaping.
pub fn escape_html(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Renders one video card.
///
/// The thumbnail carries its player URL in `data-embed`; the page script
/// swaps it for an iframe on click.
pub fn render_video(video: &VideoRecord) -> String {
    let title = escape_html(&video.title);
    let date = format_date(video.published_at);

    let mut html = String::with_capacity(512);
    html.push_str("<div class=\"feed-item\">\n");
    let _ = writeln!(
        html,
        "  <div class=\"thumb\"><img src=\"{}\" alt=\"{}\" data-embed=\"{}\" loading=\"lazy\"></div>",
        escape_html(&video.thumbnail),
        title,
        escape_html(&video.embed_url()),
    );
    html.push_str("  <div class=\"meta\">\n");
    let _ = write!(
        html,
        "    <h2><a href=\"{}\" target=\"_blank\" rel=\"noopener\">{}</a>",
        escape_html(&video.link),
        title,
    );
    if video.is_short {
        html.push_str(" <span class=\"shorts-badge\">SHORT</span>");
    }
    html.push_str("</h2>\n");
    let _ = writeln!(
        html,
        "    <div class=\"source\">Channel: {}</div>",
        escape_html(&video.source)
    );
    if !date.is_empty() {
        let _ = writeln!(html, "    <small>{}</small>", escape_html(&date));
    }
    html.push_str("  </div>\n</div>\n");
    html
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Latest videos</title>
<style>
  body { font-family: sans-serif; max-width: 900px; margin: 2em auto; }
  .feed-item { display: flex; align-items: flex-start; gap: 12px; margin-bottom: 12px; }
  .thumb { flex-shrink: 0; width: 160px; height: 90px; overflow: hidden; border-radius: 6px; background: #ddd; }
  .thumb img { width: 100%; height: 100%; object-fit: cover; cursor: pointer; }
  .meta { flex: 1; }
  .meta h2 { margin: 0 0 4px; font-size: 1.1em; }
  .shorts-badge { background: #c00; color: #fff; font-size: 0.7em; padding: 1px 5px; border-radius: 3px; }
</style>
</head>
<body>
"#;

const PAGE_TAIL: &str = r#"<script>
document.querySelectorAll(".thumb img[data-embed]").forEach(function (img) {
  img.addEventListener("click", function () {
    var box = img.parentElement;
    var frame = document.createElement("iframe");
    frame.width = "320";
    frame.height = "180";
    frame.frameBorder = "0";
    frame.allow = "accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; picture-in-picture";
    frame.allowFullscreen = true;
    frame.loading = "lazy";
    frame.src = img.dataset.embed;
    box.style.width = "320px";
    box.style.height = "180px";
    box.replaceChildren(frame);
  });
});
</script>
</body>
</html>
"#;

/// Renders a standalone page with every card and the click-to-embed script.
pub fn render_page(videos: &[VideoRecord]) -> String {
    let mut html = String::from(PAGE_HEAD);
    if videos.is_empty() {
        html.push_str("<p class=\"empty\">No videos could be loaded.</p>\n");
    }
    for video in videos {
        html.push_str(&render_video(video));
    }
    html.push_str(PAGE_TAIL);
    html
}
