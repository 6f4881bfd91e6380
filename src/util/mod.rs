//! Terminal text helpers and file output.
//!
//! # Examples
//!
//! ```
//! use tubefeed::util::{display_width, strip_control_chars, truncate_to_width};
//!
//! assert_eq!(display_width("Hello"), 5);
//! assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
//! assert_eq!(strip_control_chars("\x1b[1mbold\x1b[0m"), "bold");
//! ```

mod fs;
mod text;

pub use fs::atomic_write;
pub use text::{display_width, strip_control_chars, truncate_to_width};
