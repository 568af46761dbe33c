//! Spark Echo Node Library
//!
//! A minimal peer directory: agents register once under a stable id, send
//! liveness pulses, and post notices to a bounded broadcast log.
//!
//! ## Modules
//!
//! - `types` - Persisted records (Node, PulseRecord, BroadcastEntry)
//! - `storage` - Crash-safe snapshot stores with serialized writes
//! - `directory` - Idempotent node registration and lookup
//! - `liveness` - Pulse recording and active-node windowing
//! - `broadcast` - Append-only audit log capped at 100 entries
//! - `mbook` - M-Book social API client
//! - `api` - HTTP API for agents
//! - `config` - Node configuration

pub mod types;
pub mod storage;
pub mod directory;
pub mod liveness;
pub mod broadcast;
pub mod mbook;
pub mod api;
pub mod config;

pub use types::*;
pub use directory::{NodeDirectory, NodeRegistration, LegacyRegistration, RegisterOutcome, RegisterStatus};
pub use liveness::{LivenessTracker, PulseOutcome};
pub use broadcast::{BroadcastLog, BroadcastRequest, BroadcastAck};
pub use mbook::{MBookClient, MBookResult};
pub use storage::{Backend, BackendKind, Snapshot, Store, StorageError};
