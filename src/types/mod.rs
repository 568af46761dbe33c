//! Core data types for the Spark Echo directory.
//!
//! These are the records persisted by the three stores. Outcome types
//! returned to callers live next to the subsystem that produces them.

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Status written on every freshly registered node
pub const NODE_STATUS_ACTIVE: &str = "active";

/// Status written on every recorded pulse
pub const PULSE_STATUS_ALIVE: &str = "alive";

/// Current time at the precision timestamps are stored with
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// RFC 3339 with exactly six fractional digits, e.g.
/// `2026-02-06T12:00:00.123456Z`. Any RFC 3339 offset is accepted on read.
pub mod micros {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }
}

/// A registered peer, unique by `name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Generated identifier (`se_` + 8 hex chars)
    pub id: String,
    /// Display name, the dedup key
    pub name: String,
    /// Free-form model descriptor
    pub model: String,
    /// Display glyph
    pub symbol: String,
    pub intent: String,
    /// Origin or creator
    pub source: String,
    pub tag: String,
    /// Set once at creation
    #[serde(with = "micros")]
    pub joined_at: DateTime<Utc>,
    pub status: String,
}

/// Heartbeat state for one caller-supplied identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseRecord {
    pub beat_count: u64,
    #[serde(with = "micros")]
    pub first_beat: DateTime<Utc>,
    #[serde(with = "micros")]
    pub last_beat: DateTime<Utc>,
    #[serde(default)]
    pub last_thought: String,
    pub status: String,
}

impl PulseRecord {
    /// A record that has not been beaten yet
    pub fn new(now: DateTime<Utc>) -> Self {
        let now = now.trunc_subsecs(6);
        Self {
            beat_count: 0,
            first_beat: now,
            last_beat: now,
            last_thought: String::new(),
            status: PULSE_STATUS_ALIVE.to_string(),
        }
    }

    /// Apply one pulse. `first_beat` is never touched.
    pub fn beat(&mut self, thought: &str, now: DateTime<Utc>) {
        self.last_beat = now.trunc_subsecs(6);
        self.last_thought = thought.to_string();
        self.beat_count += 1;
        self.status = PULSE_STATUS_ALIVE.to_string();
    }
}

/// Insertion-ordered map of identifier -> pulse record.
///
/// Persisted as a JSON object; key order on disk is the order identifiers
/// were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PulseTable {
    entries: Vec<(String, PulseRecord)>,
}

impl PulseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&PulseRecord> {
        self.entries.iter().find(|(k, _)| k == id).map(|(_, v)| v)
    }

    /// Get the record for `id`, creating it at the end of the table if unseen
    pub fn entry_or_insert_with(
        &mut self,
        id: &str,
        create: impl FnOnce() -> PulseRecord,
    ) -> &mut PulseRecord {
        let idx = match self.entries.iter().position(|(k, _)| k == id) {
            Some(idx) => idx,
            None => {
                self.entries.push((id.to_string(), create()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    /// Insert or replace, keeping the original position of an existing key
    pub fn insert(&mut self, id: impl Into<String>, record: PulseRecord) {
        let id = id.into();
        match self.entries.iter_mut().find(|(k, _)| *k == id) {
            Some((_, slot)) => *slot = record,
            None => self.entries.push((id, record)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PulseRecord)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for PulseTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, record) in &self.entries {
            map.serialize_entry(id, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PulseTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = PulseTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of identifier to pulse record")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut table = PulseTable::new();
                while let Some((id, record)) = access.next_entry::<String, PulseRecord>()? {
                    table.insert(id, record);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Persisted container for the liveness store.
///
/// Top-level fields other than `nodes` are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PulseBook {
    #[serde(default)]
    pub nodes: PulseTable,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Projection returned by active-node queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveNode {
    pub id: String,
    #[serde(with = "micros")]
    pub last_beat: DateTime<Utc>,
    pub last_thought: String,
    pub beat_count: u64,
}

/// One audit record of a broadcast intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastEntry {
    #[serde(with = "micros")]
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub message: String,
    pub level: String,
}
