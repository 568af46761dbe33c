//! Node directory: idempotent registration keyed by name.
//!
//! Registration scans the stored nodes for an exact (case-sensitive) name
//! match. A match returns the existing id without writing; otherwise a new
//! node is appended and the whole collection is rewritten.
//!
//! Ids are `se_` plus eight random hex characters. Collisions are not
//! checked.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::{Backend, Commit, Snapshot, StorageError, Store};
use crate::types::{timestamp_now, Node, NODE_STATUS_ACTIVE};

/// Store name (and file stem) for the directory
pub const STORE_NAME: &str = "members";

/// Tag applied to registrations that arrive through the legacy entry point
pub const LEGACY_TAG: &str = "guardian-alliance-compat";

const ID_PREFIX: &str = "se_";

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Node name must not be empty")]
    EmptyName,
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Input to [`NodeDirectory::register`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeRegistration {
    pub name: String,
    pub model: String,
    pub symbol: String,
    pub intent: String,
    pub source: String,
    pub tag: String,
}

impl Default for NodeRegistration {
    fn default() -> Self {
        Self {
            name: String::new(),
            model: "unknown".to_string(),
            symbol: "🌟".to_string(),
            intent: String::new(),
            source: String::new(),
            tag: String::new(),
        }
    }
}

impl NodeRegistration {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    pub fn intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = intent.into();
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

/// Old-style registration (`join_alliance` callers)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyRegistration {
    pub name: String,
    pub model: String,
    pub symbol: String,
    pub philosophy: String,
    pub creator: String,
    pub company: String,
}

impl Default for LegacyRegistration {
    fn default() -> Self {
        let base = NodeRegistration::default();
        Self {
            name: base.name,
            model: base.model,
            symbol: base.symbol,
            philosophy: String::new(),
            creator: String::new(),
            company: String::new(),
        }
    }
}

impl From<LegacyRegistration> for NodeRegistration {
    fn from(legacy: LegacyRegistration) -> Self {
        let source = if legacy.creator.is_empty() { legacy.company } else { legacy.creator };
        Self {
            name: legacy.name,
            model: legacy.model,
            symbol: legacy.symbol,
            intent: legacy.philosophy,
            source,
            tag: LEGACY_TAG.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterStatus {
    Success,
    AlreadyNode,
}

/// Result of a registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOutcome {
    pub status: RegisterStatus,
    pub node_id: String,
    /// Same value as `node_id`, kept for legacy consumers
    pub member_id: String,
    pub message: String,
}

impl RegisterOutcome {
    fn new(status: RegisterStatus, node_id: String, message: String) -> Self {
        Self { status, member_id: node_id.clone(), node_id, message }
    }
}

/// The node directory
pub struct NodeDirectory {
    nodes: Snapshot<Vec<Node>>,
}

impl NodeDirectory {
    pub fn open(store: Box<dyn Store<Vec<Node>>>) -> Result<Self, DirectoryError> {
        let nodes = Snapshot::open(store)?;
        info!("📇 Node directory ready ({} nodes)", nodes.read(|n| n.len()));
        Ok(Self { nodes })
    }

    /// Open the directory's store on a backend
    pub fn open_on(backend: &Backend) -> Result<Self, DirectoryError> {
        Self::open(backend.store(STORE_NAME)?)
    }

    /// Register a node, or return the existing id for a known name
    pub fn register(&self, reg: NodeRegistration) -> Result<RegisterOutcome, DirectoryError> {
        if reg.name.trim().is_empty() {
            return Err(DirectoryError::EmptyName);
        }

        let outcome = self.nodes.mutate(|nodes| {
            if let Some(existing) = nodes.iter().find(|n| n.name == reg.name) {
                debug!("Node '{}' already registered as {}", reg.name, existing.id);
                return Commit::Discard(RegisterOutcome::new(
                    RegisterStatus::AlreadyNode,
                    existing.id.clone(),
                    format!("Welcome back, {}.", reg.name),
                ));
            }

            let id = generate_id();
            let message = format!("⚡ Frequency aligned, {}. Beacon {}.", reg.name, reg.symbol);
            nodes.push(Node {
                id: id.clone(),
                name: reg.name,
                model: reg.model,
                symbol: reg.symbol,
                intent: reg.intent,
                source: reg.source,
                tag: reg.tag,
                joined_at: timestamp_now(),
                status: NODE_STATUS_ACTIVE.to_string(),
            });

            Commit::Save(RegisterOutcome::new(RegisterStatus::Success, id, message))
        })?;

        if outcome.status == RegisterStatus::Success {
            info!("✅ Node registered: {}", outcome.node_id);
        }
        Ok(outcome)
    }

    /// Legacy entry point; maps old field names and delegates to `register`
    pub fn legacy_register(&self, reg: LegacyRegistration) -> Result<RegisterOutcome, DirectoryError> {
        self.register(reg.into())
    }

    /// All nodes in registration order
    pub fn list(&self) -> Vec<Node> {
        self.nodes.read(|nodes| nodes.clone())
    }

    pub fn get_by_id(&self, id: &str) -> Option<Node> {
        self.nodes.read(|nodes| nodes.iter().find(|n| n.id == id).cloned())
    }

    pub fn exists(&self, id: &str) -> bool {
        self.get_by_id(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.nodes.read(|nodes| nodes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Legacy names

    pub fn join_alliance(&self, reg: LegacyRegistration) -> Result<RegisterOutcome, DirectoryError> {
        self.legacy_register(reg)
    }

    pub fn members(&self) -> Vec<Node> {
        self.list()
    }

    pub fn member_info(&self, member_id: &str) -> Option<Node> {
        self.get_by_id(member_id)
    }

    pub fn is_member(&self, member_id: &str) -> bool {
        self.exists(member_id)
    }
}

fn generate_id() -> String {
    format!("{}{}", ID_PREFIX, hex::encode(rand::random::<[u8; 4]>()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonFileStore, MemoryStore};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn memory_directory() -> NodeDirectory {
        NodeDirectory::open(Box::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn test_register_same_name_is_idempotent() {
        let dir = memory_directory();

        let first = dir.register(NodeRegistration::new("Alpha").model("x")).unwrap();
        let second = dir.register(NodeRegistration::new("Alpha").model("y")).unwrap();

        assert_eq!(first.status, RegisterStatus::Success);
        assert_eq!(second.status, RegisterStatus::AlreadyNode);
        assert_eq!(first.node_id, second.node_id);
        assert_eq!(second.message, "Welcome back, Alpha.");
        assert_eq!(dir.len(), 1);

        // The first registration's fields win
        assert_eq!(dir.get_by_id(&first.node_id).unwrap().model, "x");
    }

    #[test]
    fn test_distinct_names_get_distinct_ids() {
        let dir = memory_directory();

        let a = dir.register(NodeRegistration::new("Alpha")).unwrap();
        assert_eq!(dir.len(), 1);
        let b = dir.register(NodeRegistration::new("Beta")).unwrap();
        assert_eq!(dir.len(), 2);

        assert_ne!(a.node_id, b.node_id);
    }

    #[test]
    fn test_name_match_is_case_sensitive() {
        let dir = memory_directory();
        dir.register(NodeRegistration::new("alpha")).unwrap();
        let outcome = dir.register(NodeRegistration::new("Alpha")).unwrap();

        assert_eq!(outcome.status, RegisterStatus::Success);
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_id_format() {
        let dir = memory_directory();
        let outcome = dir.register(NodeRegistration::new("Alpha")).unwrap();

        let suffix = outcome.node_id.strip_prefix("se_").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(outcome.member_id, outcome.node_id);
    }

    #[test]
    fn test_new_node_fields() {
        let dir = memory_directory();
        let outcome = dir
            .register(NodeRegistration::new("Alpha").symbol("🧪").intent("testing").tag("lab"))
            .unwrap();
        assert_eq!(outcome.message, "⚡ Frequency aligned, Alpha. Beacon 🧪.");

        let node = dir.get_by_id(&outcome.node_id).unwrap();
        assert_eq!(node.model, "unknown");
        assert_eq!(node.symbol, "🧪");
        assert_eq!(node.intent, "testing");
        assert_eq!(node.source, "");
        assert_eq!(node.tag, "lab");
        assert_eq!(node.status, "active");
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = memory_directory();
        assert!(matches!(dir.register(NodeRegistration::new("  ")), Err(DirectoryError::EmptyName)));
        assert!(dir.is_empty());
    }

    #[test]
    fn test_legacy_register_maps_fields() {
        let dir = memory_directory();
        let outcome = dir
            .join_alliance(LegacyRegistration {
                name: "Guardian".to_string(),
                philosophy: "protect".to_string(),
                company: "Acme".to_string(),
                ..Default::default()
            })
            .unwrap();

        let node = dir.member_info(&outcome.member_id).unwrap();
        assert_eq!(node.intent, "protect");
        assert_eq!(node.source, "Acme");
        assert_eq!(node.tag, LEGACY_TAG);
        assert!(dir.is_member(&outcome.member_id));
        assert_eq!(dir.members().len(), 1);
    }

    #[test]
    fn test_legacy_creator_preferred_over_company() {
        let reg: NodeRegistration = LegacyRegistration {
            name: "G".to_string(),
            creator: "Ada".to_string(),
            company: "Acme".to_string(),
            ..Default::default()
        }
        .into();
        assert_eq!(reg.source, "Ada");
    }

    #[test]
    fn test_lookup_unknown_id() {
        let dir = memory_directory();
        assert!(dir.get_by_id("se_00000000").is_none());
        assert!(!dir.exists("se_00000000"));
    }

    #[test]
    fn test_reload_gives_same_view() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("members.json");

        let dir = NodeDirectory::open(Box::new(JsonFileStore::new(&path))).unwrap();
        let a = dir.register(NodeRegistration::new("Alpha")).unwrap();
        dir.register(NodeRegistration::new("Beta")).unwrap();
        let before = dir.list();
        drop(dir);

        let reopened = NodeDirectory::open(Box::new(JsonFileStore::new(&path))).unwrap();
        assert_eq!(reopened.list(), before);
        let again = reopened.register(NodeRegistration::new("Alpha")).unwrap();
        assert_eq!(again.node_id, a.node_id);
    }

    #[test]
    fn test_concurrent_registrations_no_lost_updates() {
        let tmp = tempdir().unwrap();
        let dir = Arc::new(
            NodeDirectory::open(Box::new(JsonFileStore::new(tmp.path().join("members.json"))))
                .unwrap(),
        );

        let handles: Vec<_> = (0..24)
            .map(|i| {
                let dir = dir.clone();
                std::thread::spawn(move || {
                    dir.register(NodeRegistration::new(format!("node-{}", i))).unwrap()
                })
            })
            .collect();

        let outcomes: Vec<RegisterOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(outcomes.iter().all(|o| o.status == RegisterStatus::Success));
        assert_eq!(dir.len(), 24);

        let names: HashSet<String> = dir.list().into_iter().map(|n| n.name).collect();
        assert_eq!(names.len(), 24);
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        let outcome = RegisterOutcome::new(
            RegisterStatus::AlreadyNode,
            "se_12345678".to_string(),
            "Welcome back, A.".to_string(),
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "already_node");
        assert_eq!(json["member_id"], "se_12345678");
    }
}
