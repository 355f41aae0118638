//! Unit of work: one backend session, one UUID->node arena, one principal.

use crate::backend::{BackendSession, NodeRef};
use crate::codec::ARTIFACT_NODE;
use cairn_core::{EntityType, RegistryError, RegistryResult, StorageError};
use std::collections::HashMap;

/// Where a unit of work is in its write sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Building,
    NodesPersisted,
    RelationshipsPersisted,
    Committed,
    Failed,
}

/// Owns a session for the length of one coordinator operation.
///
/// The session is rolled back and closed on drop unless the unit reached
/// `Committed`.
#[derive(Debug)]
pub struct UnitOfWork<S: BackendSession> {
    session: S,
    state: UnitState,
    nodes: HashMap<String, NodeRef>,
    principal: String,
}

impl<S: BackendSession> UnitOfWork<S> {
    pub fn new(session: S, principal: impl Into<String>) -> Self {
        Self {
            session,
            state: UnitState::Building,
            nodes: HashMap::new(),
            principal: principal.into(),
        }
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    // === Reference resolution ===

    /// Remember the node created for `uuid` in this unit.
    pub fn track(&mut self, uuid: impl Into<String>, node: NodeRef) {
        self.nodes.insert(uuid.into(), node);
    }

    pub fn forget(&mut self, uuid: &str) {
        self.nodes.remove(uuid);
    }

    /// Resolve an artifact UUID to a node, looking at this unit's own nodes
    /// before asking the backend. Only live artifact nodes qualify.
    pub fn create_reference(&self, uuid: &str) -> RegistryResult<NodeRef> {
        if let Some(node) = self.nodes.get(uuid) {
            return Ok(*node);
        }
        match self.session.find_by_uuid(uuid)? {
            Some(node) if self.session.kind_of(node)? == ARTIFACT_NODE => Ok(node),
            _ => Err(RegistryError::not_found(EntityType::RelationshipTarget, uuid)),
        }
    }

    // === State transitions ===

    fn advance(&mut self, to: UnitState) -> RegistryResult<()> {
        match self.session.commit() {
            Ok(()) => {
                tracing::debug!(from = ?self.state, to = ?to, "Unit of work advanced");
                self.state = to;
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Commit the node phase.
    pub fn nodes_persisted(&mut self) -> RegistryResult<()> {
        self.advance(UnitState::NodesPersisted)
    }

    /// Commit the relationship phase.
    pub fn relationships_persisted(&mut self) -> RegistryResult<()> {
        self.advance(UnitState::RelationshipsPersisted)
    }

    /// Commit whatever is pending and release the session.
    pub fn commit(mut self) -> RegistryResult<()> {
        self.advance(UnitState::Committed)?;
        if let Err(e) = self.session.close() {
            tracing::warn!(error = %e, "Failed to close session after commit");
        }
        Ok(())
    }

    /// Roll back pending writes; earlier committed phases stay committed.
    pub fn fail(&mut self, error: &RegistryError) {
        tracing::warn!(state = ?self.state, error = %error, "Unit of work failed, rolling back");
        self.state = UnitState::Failed;
        if let Err(e) = self.session.rollback() {
            tracing::warn!(error = %e, "Rollback failed");
        }
    }
}

impl<S: BackendSession> Drop for UnitOfWork<S> {
    fn drop(&mut self) {
        if self.session.is_closed() {
            return;
        }
        if self.state != UnitState::Committed && self.state != UnitState::Failed {
            tracing::warn!(state = ?self.state, "Unit of work dropped before commit, rolling back");
            if let Err(e) = self.session.rollback() {
                tracing::warn!(error = %e, "Rollback on drop failed");
            }
        }
        if let Err(e) = self.session.close() {
            if e != RegistryError::Storage(StorageError::SessionClosed) {
                tracing::warn!(error = %e, "Failed to close session");
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
