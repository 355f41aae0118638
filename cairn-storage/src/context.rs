//! Relationship lookups against a live session.

use crate::backend::BackendSession;
use crate::codec::{read_artifact, read_kind, read_uuid, ARTIFACT_NODE};
use cairn_builders::{ReferenceLookup, RelationshipContext};
use cairn_core::RegistryResult;

/// Resolves deferred references against every artifact the session can
/// see, committed or written earlier in the same unit of work.
pub struct SessionContext<'a, S: BackendSession> {
    session: &'a S,
}

impl<'a, S: BackendSession> SessionContext<'a, S> {
    pub fn new(session: &'a S) -> Self {
        Self { session }
    }
}

impl<S: BackendSession> RelationshipContext for SessionContext<'_, S> {
    fn find(&self, lookup: &ReferenceLookup) -> RegistryResult<Vec<String>> {
        let mut found = Vec::new();
        for node in self.session.find_nodes(ARTIFACT_NODE)? {
            // Cheap kind filter before decoding the whole node.
            if !lookup.kinds().contains(&read_kind(self.session, node)?) {
                continue;
            }
            if lookup.matches(&read_artifact(self.session, node)?) {
                found.push(read_uuid(self.session, node)?);
            }
        }
        Ok(found)
    }
}
