use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Errors produced while turning relay output into a [`FeedDocument`].
#[derive(Debug, Error)]
pub enum FeedParseError {
    /// The XML reader rejected the input (bad syntax, mismatched tags, unknown entity).
    #[error("malformed XML: {0}")]
    Malformed(String),
    /// Input ended while elements were still open.
    #[error("unexpected end of document inside <{0}>")]
    Unclosed(String),
    /// Input contained no element at all (empty body, plain text).
    #[error("document has no root element")]
    Empty,
    /// Well-formed XML, but not an Atom feed (e.g. an HTML error page from a relay).
    #[error("expected <feed> root element, found <{0}>")]
    NotAFeed(String),
}

impl From<quick_xml::Error> for FeedParseError {
    fn from(e: quick_xml::Error) -> Self {
        FeedParseError::Malformed(e.to_string())
    }
}

/// One `<entry>` of an Atom feed, holding the first occurrence of each field verbatim.
///
/// Values may be empty strings; deciding what counts as "missing" is left to
/// [`VideoRecord`](super::VideoRecord) construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<String>,
    /// `<yt:videoId>` (or an unprefixed `<videoId>`).
    pub video_id: Option<String>,
    /// `url` attribute of `<media:thumbnail>`.
    pub thumbnail: Option<String>,
}

/// Parsed channel feed: the channel title plus its entries in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    /// `<title>` that is a direct child of the root `<feed>`.
    pub title: Option<String>,
    pub entries: Vec<FeedEntry>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    FeedTitle,
    Title,
    Published,
    VideoId,
}

/// Text collection for an element whose content we want (including descendants' text).
struct Capture {
    field: Field,
    depth: usize,
    text: String,
}

#[derive(Default)]
struct Builder {
    doc: FeedDocument,
    /// Depth of the open `<entry>` and the entry being filled.
    entry: Option<(usize, FeedEntry)>,
    capture: Option<Capture>,
}

impl Builder {
    fn open(
        &mut self,
        name: &str,
        e: &BytesStart<'_>,
        reader: &Reader<&[u8]>,
        depth: usize,
    ) -> Result<(), FeedParseError> {
        if self.capture.is_some() {
            return Ok(());
        }

        let atom = atom_name(name);
        let Some((_, entry)) = self.entry.as_mut() else {
            if atom == Some("entry") {
                self.entry = Some((depth, FeedEntry::default()));
            } else if atom == Some("title") && depth == 2 && self.doc.title.is_none() {
                self.start_capture(Field::FeedTitle, depth);
            }
            return Ok(());
        };

        read_attributes(name, e, reader, entry)?;
        let field = match (atom, split_prefix(name).1) {
            (Some("title"), _) if entry.title.is_none() => Field::Title,
            (Some("published"), _) if entry.published.is_none() => Field::Published,
            (_, "videoId") if entry.video_id.is_none() => Field::VideoId,
            _ => return Ok(()),
        };
        self.start_capture(field, depth);
        Ok(())
    }

    fn empty(
        &mut self,
        name: &str,
        e: &BytesStart<'_>,
        reader: &Reader<&[u8]>,
    ) -> Result<(), FeedParseError> {
        match self.entry.as_mut() {
            Some((_, entry)) => read_attributes(name, e, reader, entry),
            None if atom_name(name) == Some("entry") => {
                self.doc.entries.push(FeedEntry::default());
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn start_capture(&mut self, field: Field, depth: usize) {
        self.capture = Some(Capture {
            field,
            depth,
            text: String::new(),
        });
    }

    fn text(&mut self, text: &str) {
        if let Some(capture) = self.capture.as_mut() {
            capture.text.push_str(text);
        }
    }

    fn close(&mut self, depth: usize) {
        if self.capture.as_ref().is_some_and(|c| c.depth == depth) {
            if let Some(Capture { field, text, .. }) = self.capture.take() {
                self.store(field, text);
            }
        }

        if self.entry.as_ref().is_some_and(|(d, _)| *d == depth) {
            if let Some((_, entry)) = self.entry.take() {
                self.doc.entries.push(entry);
            }
        }
    }

    fn store(&mut self, field: Field, text: String) {
        if let Field::FeedTitle = field {
            self.doc.title = Some(text);
            return;
        }
        let Some((_, entry)) = self.entry.as_mut() else {
            return;
        };
        match field {
            Field::Title => entry.title = Some(text),
            Field::Published => entry.published = Some(text),
            Field::VideoId => entry.video_id = Some(text),
            Field::FeedTitle => {}
        }
    }
}

fn read_attributes(
    name: &str,
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
    entry: &mut FeedEntry,
) -> Result<(), FeedParseError> {
    let (slot, key): (&mut Option<String>, &[u8]) = match (atom_name(name), split_prefix(name)) {
        (Some("link"), _) if entry.link.is_none() => (&mut entry.link, &b"href"[..]),
        (_, (Some("media"), "thumbnail")) if entry.thumbnail.is_none() => {
            (&mut entry.thumbnail, &b"url"[..])
        }
        _ => return Ok(()),
    };

    for attr in e.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(e) => {
                tracing::debug!(element = name, error = %e, "Skipping malformed attribute");
                continue;
            }
        };
        if attr.key.as_ref() == key {
            *slot = Some(attr.decode_and_unescape_value(reader.decoder())?.into_owned());
            break;
        }
    }
    Ok(())
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Prefixes of the YouTube and Media RSS extensions. Any other prefix (or
/// none) is read as Atom, so `<atom:entry>` and `<entry>` are the same element.
const EXTENSION_PREFIXES: [&str; 2] = ["yt", "media"];

fn split_prefix(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// Local name of an Atom element; `None` for extension elements such as `media:title`.
fn atom_name(name: &str) -> Option<&str> {
    match split_prefix(name) {
        (Some(prefix), _) if EXTENSION_PREFIXES.contains(&prefix) => None,
        (_, local) => Some(local),
    }
}

fn check_root(name: &str) -> Result<(), FeedParseError> {
    if atom_name(name) == Some("feed") {
        Ok(())
    } else {
        Err(FeedParseError::NotAFeed(name.to_owned()))
    }
}

impl FeedDocument {
    /// Parses an Atom channel feed.
    ///
    /// Any syntax error fails the whole document, matching how a relay that
    /// returns a truncated or non-XML body is treated as a failed attempt.
    /// quick-xml never expands `<!ENTITY>` declarations, so custom entities
    /// surface as [`FeedParseError::Malformed`].
    pub fn parse(xml: &str) -> Result<Self, FeedParseError> {
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();
        let mut stack: Vec<String> = Vec::new();
        let mut root_seen = false;
        let mut builder = Builder::default();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let name = element_name(&e);
                    if stack.is_empty() {
                        check_root(&name)?;
                        root_seen = true;
                    }
                    stack.push(name);
                    let depth = stack.len();
                    builder.open(&stack[depth - 1], &e, &reader, depth)?;
                }
                Event::Empty(e) => {
                    let name = element_name(&e);
                    if stack.is_empty() {
                        check_root(&name)?;
                        root_seen = true;
                    }
                    builder.empty(&name, &e, &reader)?;
                }
                Event::End(_) => {
                    builder.close(stack.len());
                    stack.pop();
                }
                Event::Text(e) => builder.text(&e.unescape()?),
                Event::CData(e) => builder.text(&String::from_utf8_lossy(&e.into_inner())),
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.pop() {
            return Err(FeedParseError::Unclosed(open));
        }
        if !root_seen {
            return Err(FeedParseError::Empty);
        }
        Ok(builder.doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CHANNEL_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom">
 <link rel="self" href="http://www.youtube.com/feeds/videos.xml?channel_id=UCabc"/>
 <id>yt:channel:UCabc</id>
 <yt:channelId>UCabc</yt:channelId>
 <title>Rust &amp; Friends</title>
 <author><name>Rust &amp; Friends</name></author>
 <entry>
  <id>yt:video:dQw4w9WgXcQ</id>
  <yt:videoId>dQw4w9WgXcQ</yt:videoId>
  <title>Ownership explained</title>
  <link rel="alternate" href="https://www.youtube.com/watch?v=dQw4w9WgXcQ"/>
  <published>2024-06-01T12:00:00+00:00</published>
  <media:group>
   <media:title>Ownership explained (media)</media:title>
   <media:thumbnail url="https://i1.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg" width="480" height="360"/>
  </media:group>
 </entry>
 <entry>
  <title><![CDATA[Borrowing <fast>]]></title>
  <link rel="alternate" href="https://www.youtube.com/shorts/abcdefghijk"/>
 </entry>
</feed>"#;

    #[test]
    fn test_parse_channel_feed() {
        let doc = FeedDocument::parse(CHANNEL_FEED).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Rust & Friends"));
        assert_eq!(doc.entries.len(), 2);

        assert_eq!(
            doc.entries[0],
            FeedEntry {
                title: Some("Ownership explained".into()),
                link: Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ".into()),
                published: Some("2024-06-01T12:00:00+00:00".into()),
                video_id: Some("dQw4w9WgXcQ".into()),
                thumbnail: Some("https://i1.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg".into()),
            }
        );
    }

    #[test]
    fn test_cdata_and_missing_fields() {
        let doc = FeedDocument::parse(CHANNEL_FEED).unwrap();
        let short = &doc.entries[1];
        assert_eq!(short.title.as_deref(), Some("Borrowing <fast>"));
        assert_eq!(short.published, None);
        assert_eq!(short.video_id, None);
        assert_eq!(short.thumbnail, None);
    }

    #[test]
    fn test_entry_title_does_not_leak_into_feed_title() {
        let xml = r#"<feed><entry><title>Video</title></entry><title>Channel</title></feed>"#;
        let doc = FeedDocument::parse(xml).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Channel"));
        assert_eq!(doc.entries[0].title.as_deref(), Some("Video"));
    }

    #[test]
    fn test_prefixed_atom_elements() {
        let xml = r#"<atom:feed xmlns:atom="http://www.w3.org/2005/Atom">
 <atom:title>Chan</atom:title>
 <atom:entry>
  <atom:title>Video</atom:title>
  <atom:link rel="alternate" href="https://www.youtube.com/watch?v=prefixed123"/>
  <atom:published>2024-06-01T12:00:00+00:00</atom:published>
 </atom:entry>
</atom:feed>"#;
        let doc = FeedDocument::parse(xml).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Chan"));
        assert_eq!(
            doc.entries,
            vec![FeedEntry {
                title: Some("Video".into()),
                link: Some("https://www.youtube.com/watch?v=prefixed123".into()),
                published: Some("2024-06-01T12:00:00+00:00".into()),
                ..FeedEntry::default()
            }]
        );
    }

    #[test]
    fn test_media_title_is_not_the_entry_title() {
        let xml = r#"<feed><entry>
  <media:group><media:title>Media</media:title></media:group>
  <title>Atom</title>
</entry></feed>"#;
        let doc = FeedDocument::parse(xml).unwrap();
        assert_eq!(doc.entries[0].title.as_deref(), Some("Atom"));
    }

    #[test]
    fn test_extension_root_is_not_a_feed() {
        assert!(matches!(
            FeedDocument::parse("<media:feed></media:feed>"),
            Err(FeedParseError::NotAFeed(_))
        ));
    }

    #[test]
    fn test_missing_feed_title() {
        let doc = FeedDocument::parse("<feed><entry/></feed>").unwrap();
        assert_eq!(doc.title, None);
        assert_eq!(doc.entries, vec![FeedEntry::default()]);
    }

    #[test]
    fn test_empty_feed() {
        let doc = FeedDocument::parse(r#"<?xml version="1.0"?><feed></feed>"#).unwrap();
        assert!(doc.entries.is_empty());
    }

    #[test]
    fn test_malformed_xml_error() {
        assert!(FeedDocument::parse("<not valid xml").is_err());
    }

    #[test]
    fn test_mismatched_tags_error() {
        let result = FeedDocument::parse("<feed><entry></feed>");
        assert!(result.is_err());
    }

    #[test]
    fn test_truncated_document_error() {
        let result = FeedDocument::parse("<feed><entry><title>cut off");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_body_error() {
        assert!(matches!(FeedDocument::parse(""), Err(FeedParseError::Empty)));
        assert!(matches!(
            FeedDocument::parse("Service Unavailable"),
            Err(FeedParseError::Empty)
        ));
    }

    #[test]
    fn test_html_error_page_rejected() {
        let html = "<html><body><h1>Too many requests</h1></body></html>";
        match FeedDocument::parse(html) {
            Err(FeedParseError::NotAFeed(root)) => assert_eq!(root, "html"),
            other => panic!("Expected NotAFeed, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_entity_not_expanded() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE feed [<!ENTITY injected "EXPANDED_VALUE">]>
<feed><title>&injected;</title></feed>"#;

        match FeedDocument::parse(xml) {
            Ok(doc) => assert!(!doc.title.unwrap_or_default().contains("EXPANDED_VALUE")),
            Err(_) => {} // Rejecting the document is also fine
        }
    }
}
