//! Node-store abstraction the registry persists into.

use cairn_core::{RegistryResult, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a stored node. Only meaningful to the session (and
/// backend) that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef(u64);

impl NodeRef {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// A node property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Strings(Vec<String>),
    Integer(i64),
    Boolean(bool),
    Date(Timestamp),
    Binary(Vec<u8>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Value::Strings(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<Timestamp> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }
}

/// A named, directed link between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub name: String,
    pub target: NodeRef,
}

/// A store of sessions.
pub trait StorageBackend: Send + Sync {
    type Session: BackendSession;

    /// Open an isolated session; its writes are invisible to other
    /// sessions until committed.
    fn open_session(&self) -> RegistryResult<Self::Session>;
}

/// A unit of isolated reads and writes against the node tree.
///
/// Every method fails with `StorageError::SessionClosed` after `close`.
/// Trashed nodes are invisible to `find_by_uuid`, `find_nodes` and
/// `incoming_edges`.
pub trait BackendSession {
    /// Create a node. Fails with `PathExists` if the path is taken. The node
    /// becomes a child of the node at its parent path, when there is one.
    fn create_node(&mut self, path: &str, kind: &str) -> RegistryResult<NodeRef>;

    fn node_at(&self, path: &str) -> RegistryResult<Option<NodeRef>>;

    fn path_of(&self, node: NodeRef) -> RegistryResult<String>;

    fn kind_of(&self, node: NodeRef) -> RegistryResult<String>;

    fn get_property(&self, node: NodeRef, name: &str) -> RegistryResult<Option<Value>>;

    fn set_property(&mut self, node: NodeRef, name: &str, value: Value) -> RegistryResult<()>;

    fn remove_property(&mut self, node: NodeRef, name: &str) -> RegistryResult<()>;

    fn property_names(&self, node: NodeRef) -> RegistryResult<Vec<String>>;

    fn add_edge(&mut self, source: NodeRef, name: &str, target: NodeRef) -> RegistryResult<()>;

    /// Remove outgoing edges, all of them or only those named `name`.
    fn remove_edges(&mut self, source: NodeRef, name: Option<&str>) -> RegistryResult<()>;

    fn edges(&self, source: NodeRef) -> RegistryResult<Vec<Edge>>;

    /// `(source, edge)` pairs pointing at `target` from live nodes.
    fn incoming_edges(&self, target: NodeRef) -> RegistryResult<Vec<(NodeRef, Edge)>>;

    /// Live node whose `sys:uuid` property equals `uuid`.
    fn find_by_uuid(&self, uuid: &str) -> RegistryResult<Option<NodeRef>>;

    /// Live nodes of one kind, in creation order.
    fn find_nodes(&self, kind: &str) -> RegistryResult<Vec<NodeRef>>;

    fn children(&self, node: NodeRef) -> RegistryResult<Vec<NodeRef>>;

    /// Move a node and its subtree under `trash_root`, at a path no other
    /// node holds. Returns the new path.
    fn move_to_trash(&mut self, node: NodeRef, trash_root: &str) -> RegistryResult<String>;

    /// Remove a node, its subtree and every edge touching them.
    fn remove_node(&mut self, node: NodeRef) -> RegistryResult<()>;

    fn commit(&mut self) -> RegistryResult<()>;

    fn rollback(&mut self) -> RegistryResult<()>;

    fn close(&mut self) -> RegistryResult<()>;

    fn is_closed(&self) -> bool;
}
