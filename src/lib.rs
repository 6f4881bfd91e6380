//! Aggregates YouTube channel feeds fetched through CORS relays.
//!
//! - [`config`] - TOML configuration: channels, relays, limits
//! - [`feed`] - relay fetching, Atom parsing, merging across channels
//! - [`forward`] - delivering new videos to a Discord webhook
//! - [`render`] - HTML page, terminal listing
//! - [`util`] - terminal text helpers, atomic file writes

pub mod config;
pub mod feed;
pub mod forward;
pub mod render;
pub mod util;
