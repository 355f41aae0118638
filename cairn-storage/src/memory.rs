//! In-memory node store.
//!
//! Every session works on a private copy of the committed tree and records
//! its writes in a journal. Commit replays the journal onto the current
//! shared tree, so changes committed by other sessions in the meantime are
//! kept; a replayed `create_node` on a path someone else took fails the
//! whole commit with `PathExists`.

use crate::backend::{BackendSession, Edge, NodeRef, StorageBackend, Value};
use cairn_core::{RegistryResult, StorageError};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

const UUID_PROPERTY: &str = "sys:uuid";

// ============================================================================
// TREE
// ============================================================================

#[derive(Debug, Clone)]
struct Node {
    path: String,
    kind: String,
    parent: Option<u64>,
    properties: BTreeMap<String, Value>,
    edges: Vec<Edge>,
    trashed: bool,
}

#[derive(Debug, Clone, Default)]
struct Tree {
    nodes: BTreeMap<u64, Node>,
    paths: BTreeMap<String, u64>,
}

/// A single journaled write.
#[derive(Debug, Clone)]
enum Op {
    CreateNode { id: u64, path: String, kind: String },
    SetProperty { node: u64, name: String, value: Value },
    RemoveProperty { node: u64, name: String },
    AddEdge { source: u64, edge: Edge },
    RemoveEdges { source: u64, name: Option<String> },
    Move { node: u64, path: String },
    RemoveNode { node: u64 },
}

fn parent_path(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(&path[..idx]),
    }
}

impl Tree {
    fn node(&self, id: u64) -> RegistryResult<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| StorageError::UnknownNode { node: id }.into())
    }

    fn node_mut(&mut self, id: u64) -> RegistryResult<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| StorageError::UnknownNode { node: id }.into())
    }

    /// Node ids of `id` and everything below it.
    fn subtree(&self, id: u64) -> Vec<u64> {
        let mut ids = vec![id];
        let mut idx = 0;
        while idx < ids.len() {
            let current = ids[idx];
            ids.extend(
                self.nodes
                    .iter()
                    .filter(|(_, n)| n.parent == Some(current))
                    .map(|(child, _)| *child),
            );
            idx += 1;
        }
        ids
    }

    fn apply(&mut self, op: &Op) -> RegistryResult<()> {
        match op {
            Op::CreateNode { id, path, kind } => {
                if self.paths.contains_key(path) {
                    return Err(StorageError::PathExists { path: path.clone() }.into());
                }
                let parent = parent_path(path).and_then(|p| self.paths.get(p).copied());
                self.paths.insert(path.clone(), *id);
                self.nodes.insert(
                    *id,
                    Node {
                        path: path.clone(),
                        kind: kind.clone(),
                        parent,
                        properties: BTreeMap::new(),
                        edges: Vec::new(),
                        trashed: false,
                    },
                );
            }
            Op::SetProperty { node, name, value } => {
                self.node_mut(*node)?
                    .properties
                    .insert(name.clone(), value.clone());
            }
            Op::RemoveProperty { node, name } => {
                self.node_mut(*node)?.properties.remove(name);
            }
            Op::AddEdge { source, edge } => {
                self.node(edge.target.id())?;
                self.node_mut(*source)?.edges.push(edge.clone());
            }
            Op::RemoveEdges { source, name } => {
                let node = self.node_mut(*source)?;
                match name {
                    Some(name) => node.edges.retain(|e| &e.name != name),
                    None => node.edges.clear(),
                }
            }
            Op::Move { node, path } => {
                if self.paths.contains_key(path) {
                    return Err(StorageError::PathExists { path: path.clone() }.into());
                }
                let old_path = self.node(*node)?.path.clone();
                for id in self.subtree(*node) {
                    let entry = self.node_mut(id)?;
                    let suffix = entry.path[old_path.len()..].to_string();
                    let new_path = format!("{}{}", path, suffix);
                    let previous = std::mem::replace(&mut entry.path, new_path.clone());
                    entry.trashed = true;
                    self.paths.remove(&previous);
                    self.paths.insert(new_path, id);
                }
                // The moved root hangs off no live parent.
                self.node_mut(*node)?.parent = None;
            }
            Op::RemoveNode { node } => {
                self.node(*node)?;
                let removed = self.subtree(*node);
                for id in &removed {
                    if let Some(entry) = self.nodes.remove(id) {
                        self.paths.remove(&entry.path);
                    }
                }
                for entry in self.nodes.values_mut() {
                    entry.edges.retain(|e| !removed.contains(&e.target.id()));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// BACKEND
// ============================================================================

/// Shared, thread-safe in-memory backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tree: Arc<RwLock<Tree>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed nodes, trashed ones included.
    pub fn node_count(&self) -> RegistryResult<usize> {
        let tree = self.tree.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tree.nodes.len())
    }
}

impl StorageBackend for MemoryBackend {
    type Session = MemorySession;

    fn open_session(&self) -> RegistryResult<MemorySession> {
        let working = self
            .tree
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .clone();
        Ok(MemorySession {
            shared: Arc::clone(&self.tree),
            next_id: Arc::clone(&self.next_id),
            working,
            journal: Vec::new(),
            closed: false,
        })
    }
}

/// A session over a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemorySession {
    shared: Arc<RwLock<Tree>>,
    next_id: Arc<AtomicU64>,
    working: Tree,
    journal: Vec<Op>,
    closed: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> RegistryResult<()> {
        if self.closed {
            return Err(StorageError::SessionClosed.into());
        }
        Ok(())
    }

    fn record(&mut self, op: Op) -> RegistryResult<()> {
        self.ensure_open()?;
        self.working.apply(&op)?;
        self.journal.push(op);
        Ok(())
    }

    fn live(&self, id: u64) -> bool {
        self.working.nodes.get(&id).is_some_and(|n| !n.trashed)
    }

    fn refresh(&mut self) -> RegistryResult<()> {
        self.working = self
            .shared
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .clone();
        self.journal.clear();
        Ok(())
    }

    /// Writes recorded since the last commit or rollback.
    pub fn pending_writes(&self) -> usize {
        self.journal.len()
    }
}

impl BackendSession for MemorySession {
    fn create_node(&mut self, path: &str, kind: &str) -> RegistryResult<NodeRef> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(Op::CreateNode {
            id,
            path: path.to_string(),
            kind: kind.to_string(),
        })?;
        Ok(NodeRef::new(id))
    }

    fn node_at(&self, path: &str) -> RegistryResult<Option<NodeRef>> {
        self.ensure_open()?;
        Ok(self.working.paths.get(path).copied().map(NodeRef::new))
    }

    fn path_of(&self, node: NodeRef) -> RegistryResult<String> {
        self.ensure_open()?;
        Ok(self.working.node(node.id())?.path.clone())
    }

    fn kind_of(&self, node: NodeRef) -> RegistryResult<String> {
        self.ensure_open()?;
        Ok(self.working.node(node.id())?.kind.clone())
    }

    fn get_property(&self, node: NodeRef, name: &str) -> RegistryResult<Option<Value>> {
        self.ensure_open()?;
        Ok(self.working.node(node.id())?.properties.get(name).cloned())
    }

    fn set_property(&mut self, node: NodeRef, name: &str, value: Value) -> RegistryResult<()> {
        self.record(Op::SetProperty {
            node: node.id(),
            name: name.to_string(),
            value,
        })
    }

    fn remove_property(&mut self, node: NodeRef, name: &str) -> RegistryResult<()> {
        self.record(Op::RemoveProperty {
            node: node.id(),
            name: name.to_string(),
        })
    }

    fn property_names(&self, node: NodeRef) -> RegistryResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self
            .working
            .node(node.id())?
            .properties
            .keys()
            .cloned()
            .collect())
    }

    fn add_edge(&mut self, source: NodeRef, name: &str, target: NodeRef) -> RegistryResult<()> {
        self.record(Op::AddEdge {
            source: source.id(),
            edge: Edge {
                name: name.to_string(),
                target,
            },
        })
    }

    fn remove_edges(&mut self, source: NodeRef, name: Option<&str>) -> RegistryResult<()> {
        self.record(Op::RemoveEdges {
            source: source.id(),
            name: name.map(str::to_string),
        })
    }

    fn edges(&self, source: NodeRef) -> RegistryResult<Vec<Edge>> {
        self.ensure_open()?;
        Ok(self.working.node(source.id())?.edges.clone())
    }

    fn incoming_edges(&self, target: NodeRef) -> RegistryResult<Vec<(NodeRef, Edge)>> {
        self.ensure_open()?;
        self.working.node(target.id())?;
        Ok(self
            .working
            .nodes
            .iter()
            .filter(|(_, n)| !n.trashed)
            .flat_map(|(id, n)| {
                n.edges
                    .iter()
                    .filter(|e| e.target == target)
                    .map(move |e| (NodeRef::new(*id), e.clone()))
            })
            .collect())
    }

    fn find_by_uuid(&self, uuid: &str) -> RegistryResult<Option<NodeRef>> {
        self.ensure_open()?;
        Ok(self
            .working
            .nodes
            .iter()
            .find(|(_, n)| {
                !n.trashed
                    && n.properties.get(UUID_PROPERTY).and_then(Value::as_str) == Some(uuid)
            })
            .map(|(id, _)| NodeRef::new(*id)))
    }

    fn find_nodes(&self, kind: &str) -> RegistryResult<Vec<NodeRef>> {
        self.ensure_open()?;
        Ok(self
            .working
            .nodes
            .iter()
            .filter(|(_, n)| !n.trashed && n.kind == kind)
            .map(|(id, _)| NodeRef::new(*id))
            .collect())
    }

    fn children(&self, node: NodeRef) -> RegistryResult<Vec<NodeRef>> {
        self.ensure_open()?;
        self.working.node(node.id())?;
        Ok(self
            .working
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == Some(node.id()))
            .map(|(id, _)| NodeRef::new(*id))
            .collect())
    }

    fn move_to_trash(&mut self, node: NodeRef, trash_root: &str) -> RegistryResult<String> {
        self.ensure_open()?;
        if !self.live(node.id()) {
            return Err(StorageError::UnknownNode { node: node.id() }.into());
        }
        let old_path = self.path_of(node)?;
        let base = format!(
            "{}{}/{}",
            trash_root.trim_end_matches('/'),
            old_path,
            Utc::now().timestamp_millis()
        );
        let mut path = base.clone();
        let mut attempt = 1;
        while self.working.paths.contains_key(&path) {
            path = format!("{}-{}", base, attempt);
            attempt += 1;
        }
        self.record(Op::Move {
            node: node.id(),
            path: path.clone(),
        })?;
        Ok(path)
    }

    fn remove_node(&mut self, node: NodeRef) -> RegistryResult<()> {
        self.record(Op::RemoveNode { node: node.id() })
    }

    fn commit(&mut self) -> RegistryResult<()> {
        self.ensure_open()?;
        if self.journal.is_empty() {
            return self.refresh();
        }
        {
            let mut shared = self.shared.write().map_err(|_| StorageError::LockPoisoned)?;
            let mut next = shared.clone();
            for op in &self.journal {
                next.apply(op)?;
            }
            *shared = next;
        }
        tracing::debug!(writes = self.journal.len(), "Session committed");
        self.refresh()
    }

    fn rollback(&mut self) -> RegistryResult<()> {
        self.ensure_open()?;
        if !self.journal.is_empty() {
            tracing::debug!(writes = self.journal.len(), "Session rolled back");
        }
        self.refresh()
    }

    fn close(&mut self) -> RegistryResult<()> {
        self.ensure_open()?;
        self.journal.clear();
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

// =============================================================================
// TESTS
// =============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_committed_nodes_visible_to_new_sessions(names in prop::collection::btree_set("[a-z]{1,8}", 1..10)) {
            let backend = MemoryBackend::new();
            let mut s = backend.open_session().unwrap();
            for name in &names {
                let node = s.create_node(&format!("/{}", name), "artifact").unwrap();
                s.set_property(node, "sys:uuid", Value::String(name.clone())).unwrap();
            }
            s.commit().unwrap();

            let reader = backend.open_session().unwrap();
            prop_assert_eq!(reader.find_nodes("artifact").unwrap().len(), names.len());
            for name in &names {
                prop_assert!(reader.find_by_uuid(name).unwrap().is_some());
            }
        }
    }
}
