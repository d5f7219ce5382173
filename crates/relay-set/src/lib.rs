//! Relay list provider.
//!
//! The relay list is a JSON array of websocket URLs kept in `relays.json`.
//! Loading never fails: a missing, unreadable or malformed file logs a
//! warning and yields [`DEFAULT_RELAYS`]. An explicit empty array is honoured
//! and means "publish nowhere".

use scheduler_config_and_utils::CoreResult;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Relays used when no usable list is on disk.
pub const DEFAULT_RELAYS: [&str; 6] = [
    "wss://relay.damus.io",
    "wss://nostr-pub.wellorder.net",
    "wss://nos.lol",
    "wss://relay.snort.social",
    "wss://offchain.pub",
    "wss://nostr.mom",
];

/// Owned copy of [`DEFAULT_RELAYS`].
pub fn default_relays() -> Vec<String> {
    DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect()
}

/// Something that can tell the worker where to publish.
///
/// Called once per publish cycle, so edits to the list take effect without a
/// restart.
pub trait RelaySource: Send + Sync {
    fn load(&self) -> Vec<String>;
}

/// Relay list backed by a JSON file.
#[derive(Debug, Clone)]
pub struct RelaySet {
    path: PathBuf,
}

impl RelaySet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the relay list, falling back to the defaults.
    pub fn load(&self) -> Vec<String> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not read relay list, using defaults"
                );
                return default_relays();
            }
        };

        match parse_relay_list(&raw) {
            Ok(relays) => {
                debug!(
                    path = %self.path.display(),
                    relay_count = relays.len(),
                    "Loaded relay list"
                );
                relays
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Malformed relay list, using defaults"
                );
                default_relays()
            }
        }
    }

    /// Write the default list when no file exists yet.
    ///
    /// Returns whether a file was created. An existing file is left alone,
    /// even if it is malformed.
    pub fn ensure_file(&self) -> CoreResult<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        self.save(&default_relays())?;
        info!(path = %self.path.display(), "Created relay list with defaults");
        Ok(true)
    }

    /// Replace the list on disk.
    pub fn save(&self, relays: &[String]) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(relays)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl RelaySource for RelaySet {
    fn load(&self) -> Vec<String> {
        RelaySet::load(self)
    }
}

/// Fixed relay list, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRelays(pub Vec<String>);

impl RelaySource for StaticRelays {
    fn load(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Parse a JSON array of relay URLs.
///
/// Entries are trimmed; blanks and repeats are dropped, order is kept.
fn parse_relay_list(raw: &str) -> Result<Vec<String>, serde_json::Error> {
    let entries: Vec<String> = serde_json::from_str(raw)?;

    let mut relays: Vec<String> = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() || relays.iter().any(|r| r == entry) {
            continue;
        }
        relays.push(entry.to_string());
    }
    Ok(relays)
}
