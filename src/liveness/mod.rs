//! Liveness tracking: pulse counting and active-node windowing.
//!
//! Identifiers are whatever the caller sends. They are not checked against
//! the node directory, so the tracker can be used on its own.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::{Backend, Commit, Snapshot, StorageError, Store};
use crate::types::{ActiveNode, PulseBook, PulseRecord};

/// Store name (and file stem) for the pulse book
pub const STORE_NAME: &str = "sync_pulse";

/// Default recency threshold for [`LivenessTracker::list_active`]
pub const DEFAULT_ACTIVE_WINDOW_MINUTES: i64 = 30;

// Keeps `now - window` inside chrono's representable range
const MAX_WINDOW_MINUTES: i64 = 1_000_000_000;

#[derive(Error, Debug)]
pub enum LivenessError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result of a recorded pulse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseOutcome {
    pub status: String,
    pub message: String,
    pub beat_count: u64,
    pub node_id: String,
}

pub struct LivenessTracker {
    book: Snapshot<PulseBook>,
}

impl LivenessTracker {
    pub fn open(store: Box<dyn Store<PulseBook>>) -> Result<Self, LivenessError> {
        let book = Snapshot::open(store)?;
        info!("💓 Liveness tracker ready ({} identifiers)", book.read(|b| b.nodes.len()));
        Ok(Self { book })
    }

    pub fn open_on(backend: &Backend) -> Result<Self, LivenessError> {
        Self::open(backend.store(STORE_NAME)?)
    }

    /// Record one pulse for `identifier` at the current time
    pub fn record_pulse(&self, identifier: &str, thought: &str) -> Result<PulseOutcome, LivenessError> {
        self.record_pulse_at(identifier, thought, Utc::now())
    }

    /// Record one pulse with an explicit clock reading
    pub fn record_pulse_at(
        &self,
        identifier: &str,
        thought: &str,
        now: DateTime<Utc>,
    ) -> Result<PulseOutcome, LivenessError> {
        let beat_count = self.book.mutate(|book| {
            let record = book
                .nodes
                .entry_or_insert_with(identifier, || PulseRecord::new(now));
            record.beat(thought, now);
            Commit::Save(record.beat_count)
        })?;

        debug!("💓 Pulse from {} (beat #{})", identifier, beat_count);

        Ok(PulseOutcome {
            status: "success".to_string(),
            message: "💓 Pulse recorded".to_string(),
            beat_count,
            node_id: identifier.to_string(),
        })
    }

    /// Pulse state for `identifier`, `None` if it never pulsed
    pub fn status(&self, identifier: &str) -> Option<PulseRecord> {
        self.book.read(|book| book.nodes.get(identifier).cloned())
    }

    /// Identifiers whose last pulse is strictly newer than `window_minutes` ago
    pub fn list_active(&self, window_minutes: i64) -> Vec<ActiveNode> {
        self.list_active_at(window_minutes, Utc::now())
    }

    pub fn list_active_at(&self, window_minutes: i64, now: DateTime<Utc>) -> Vec<ActiveNode> {
        let window = window_minutes.clamp(-MAX_WINDOW_MINUTES, MAX_WINDOW_MINUTES);
        let threshold = now - Duration::minutes(window);

        self.book.read(|book| {
            book.nodes
                .iter()
                .filter(|(_, record)| record.last_beat > threshold)
                .map(|(id, record)| ActiveNode {
                    id: id.to_string(),
                    last_beat: record.last_beat,
                    last_thought: record.last_thought.clone(),
                    beat_count: record.beat_count,
                })
                .collect()
        })
    }

    /// Every identifier with its pulse state, in first-seen order
    pub fn all(&self) -> Vec<(String, PulseRecord)> {
        self.book.read(|book| {
            book.nodes
                .iter()
                .map(|(id, record)| (id.to_string(), record.clone()))
                .collect()
        })
    }

    // Legacy names

    pub fn send_heartbeat(&self, member_id: &str, thought: &str) -> Result<PulseOutcome, LivenessError> {
        self.record_pulse(member_id, thought)
    }

    pub fn active_members(&self, window_minutes: i64) -> Vec<ActiveNode> {
        self.list_active(window_minutes)
    }
}
