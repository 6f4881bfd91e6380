use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Placeholder replaced with the percent-encoded target URL.
pub const ENCODED_PLACEHOLDER: &str = "{url}";
/// Placeholder replaced with the target URL as-is.
pub const RAW_PLACEHOLDER: &str = "{raw_url}";

/// A third-party relay that fetches a feed on our behalf.
///
/// Relays exist because the feed host does not serve cross-origin headers;
/// each one wraps the target URL in its own request format. Some relays
/// return the upstream body verbatim, others wrap it in a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relay {
    /// Short name used in logs.
    pub name: String,
    /// Request URL template containing `{url}` or `{raw_url}`.
    pub template: String,
    /// When set, the body is a JSON object and this string field holds the feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_field: Option<String>,
}

impl Relay {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            json_field: None,
        }
    }

    pub fn with_json_field(mut self, field: impl Into<String>) -> Self {
        self.json_field = Some(field.into());
        self
    }

    /// Builds the relay request URL for `target`.
    ///
    /// Pure function of the template and the target; no validation happens here
    /// (templates are checked once when the config is loaded).
    pub fn request_url(&self, target: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(target.as_bytes()).collect();
        self.template
            .replace(ENCODED_PLACEHOLDER, &encoded)
            .replace(RAW_PLACEHOLDER, target)
    }

    /// True if the template has somewhere to put the target URL.
    pub fn has_placeholder(&self) -> bool {
        self.template.contains(ENCODED_PLACEHOLDER) || self.template.contains(RAW_PLACEHOLDER)
    }
}

/// The public relays used when no configuration overrides them, in attempt order.
pub fn default_relays() -> Vec<Relay> {
    vec![
        Relay::new("allorigins", "https://api.allorigins.win/get?url={url}")
            .with_json_field("contents"),
        Relay::new("corsproxy", "https://corsproxy.io/?{url}"),
        Relay::new("thingproxy", "https://thingproxy.freeboard.io/fetch/{raw_url}"),
    ]
}
