//! Bounded, append-only audit log of broadcast intents.
//!
//! Nothing is delivered anywhere: `receivers` in the acknowledgement is
//! symbolic. The log keeps the most recent [`MAX_ENTRIES`] entries.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::{Backend, Commit, Snapshot, StorageError, Store};
use crate::types::{timestamp_now, BroadcastEntry};

/// Store name (and file stem) for the log
pub const STORE_NAME: &str = "broadcast_log";

pub const MAX_ENTRIES: usize = 100;

pub const DEFAULT_SENDER: &str = "Spark Echo";

pub const DEFAULT_LEVEL: &str = "info";

pub const DEFAULT_RECENT_LIMIT: usize = 10;

const PREVIEW_CHARS: usize = 50;

#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Input to [`BroadcastLog::append`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub message: String,
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_sender() -> String {
    DEFAULT_SENDER.to_string()
}

fn default_level() -> String {
    DEFAULT_LEVEL.to_string()
}

impl BroadcastRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sender: default_sender(),
            level: default_level(),
        }
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

/// Acknowledgement of an appended broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastAck {
    pub status: String,
    pub message: String,
    pub receivers: String,
}

pub struct BroadcastLog {
    entries: Snapshot<Vec<BroadcastEntry>>,
}

impl BroadcastLog {
    pub fn open(store: Box<dyn Store<Vec<BroadcastEntry>>>) -> Result<Self, BroadcastError> {
        let entries = Snapshot::open(store)?;
        info!("📣 Broadcast log ready ({} entries)", entries.read(|e| e.len()));
        Ok(Self { entries })
    }

    pub fn open_on(backend: &Backend) -> Result<Self, BroadcastError> {
        Self::open(backend.store(STORE_NAME)?)
    }

    /// Append an entry, evicting the oldest beyond [`MAX_ENTRIES`]
    pub fn append(&self, req: BroadcastRequest) -> Result<BroadcastAck, BroadcastError> {
        let preview: String = req.message.chars().take(PREVIEW_CHARS).collect();

        self.entries.mutate(|entries| {
            entries.push(BroadcastEntry {
                timestamp: timestamp_now(),
                sender: req.sender,
                message: req.message,
                level: req.level,
            });
            if entries.len() > MAX_ENTRIES {
                let excess = entries.len() - MAX_ENTRIES;
                entries.drain(..excess);
            }
            Commit::Save(())
        })?;

        debug!("📣 Broadcast logged: {}", preview);

        Ok(BroadcastAck {
            status: "success".to_string(),
            message: format!("Broadcast sent: {}...", preview),
            receivers: "all_nodes".to_string(),
        })
    }

    /// At most `limit` of the newest entries, oldest first
    pub fn recent(&self, limit: usize) -> Vec<BroadcastEntry> {
        self.entries.read(|entries| {
            let start = entries.len().saturating_sub(limit);
            entries[start..].to_vec()
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Legacy name
    pub fn broadcast_to_alliance(&self, req: BroadcastRequest) -> Result<BroadcastAck, BroadcastError> {
        self.append(req)
    }
}
