use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

use crate::util::atomic_write;

/// Maximum state file size (16 MB).
const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to access state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("State file too large: {0} bytes (max 16 MB)")]
    TooLarge(u64),
}

/// Links already delivered (or deliberately skipped), grouped by feed key.
///
/// Stored as `{"feeds": {"youtube:<channel id>": ["<link>", ...]}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenLinks {
    #[serde(default)]
    feeds: BTreeMap<String, BTreeSet<String>>,
}

impl SeenLinks {
    /// Reads the state file.
    ///
    /// A missing file is a fresh start. So is an unreadable JSON document,
    /// which is logged and later overwritten.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > MAX_FILE_SIZE => return Err(StateError::TooLarge(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No state file, starting fresh");
                return Ok(Self::default());
            }
            Err(e) => return Err(StateError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read(path)?;
        match serde_json::from_slice(&content) {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read state file, starting fresh");
                Ok(Self::default())
            }
        }
    }

    /// Writes the state atomically, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        atomic_write(path, &json)?;
        Ok(())
    }

    pub fn contains(&self, feed: &str, link: &str) -> bool {
        self.feeds.get(feed).is_some_and(|links| links.contains(link))
    }

    /// Records a link; returns false if it was already known.
    pub fn insert(&mut self, feed: &str, link: &str) -> bool {
        self.feeds
            .entry(feed.to_owned())
            .or_default()
            .insert(link.to_owned())
    }

    /// Number of links recorded for `feed`.
    pub fn count(&self, feed: &str) -> usize {
        self.feeds.get(feed).map_or(0, BTreeSet::len)
    }
}
