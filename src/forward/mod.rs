//! Forwarding newly published videos to a Discord webhook.
//!
//! Each pass fetches every channel through the same relays as the page
//! output, then posts the videos it has not delivered before:
//!
//! - [`state`] - delivered links per channel, persisted as JSON between runs
//! - [`discord`] - embed payloads, text fallback, webhook delivery
//! - [`forwarder`] - one pass (or a polling loop) over all channels
//!
//! Short-form videos are never posted; they are recorded as seen so later
//! passes skip them without another check.

mod discord;
mod forwarder;
mod state;

pub use discord::{DiscordWebhook, WebhookError, WEBHOOK_TIMEOUT};
pub use forwarder::{state_key, ForwardReport, Forwarder, DEFAULT_POLL_INTERVAL};
pub use state::{SeenLinks, StateError};
