//! Read-only snapshot access for query evaluation.

use crate::backend::{BackendSession, StorageBackend};
use crate::codec::{read_artifact, ARTIFACT_NODE};
use crate::ontologies::load_ontologies;
use crate::registry::{artifact_node, Registry};
use crate::stored_queries::load_stored_query;
use cairn_core::{Artifact, ErrorKind, Ontology, RegistryResult, StoredQuery};

/// A read session pinned to the state committed when it was opened.
///
/// Closed on drop.
pub struct ArtifactReader<S: BackendSession> {
    session: S,
}

impl<S: BackendSession> ArtifactReader<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    /// Every live artifact, primaries and derived, in creation order.
    pub fn artifacts(&self) -> RegistryResult<Vec<Artifact>> {
        self.session
            .find_nodes(ARTIFACT_NODE)?
            .into_iter()
            .map(|node| read_artifact(&self.session, node))
            .collect()
    }

    /// A live artifact by UUID, or `None` when absent or trashed.
    pub fn artifact(&self, uuid: &str) -> RegistryResult<Option<Artifact>> {
        match artifact_node(&self.session, uuid) {
            Ok(node) => read_artifact(&self.session, node).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn ontologies(&self) -> RegistryResult<Vec<Ontology>> {
        load_ontologies(&self.session)
    }

    pub fn stored_query(&self, name: &str) -> RegistryResult<StoredQuery> {
        load_stored_query(&self.session, name)
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    pub fn close(&mut self) -> RegistryResult<()> {
        if self.session.is_closed() {
            return Ok(());
        }
        self.session.close()
    }
}

impl<S: BackendSession> Drop for ArtifactReader<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to close reader session");
        }
    }
}

impl<B: StorageBackend> Registry<B> {
    /// Open a reader over the currently committed graph.
    pub fn reader(&self) -> RegistryResult<ArtifactReader<B::Session>> {
        Ok(ArtifactReader::new(self.backend().open_session()?))
    }
}
