//! Persistence coordinator for artifacts.
//!
//! Writes run in two committed phases. The node phase validates, runs the
//! derivation pipeline and writes the primary, its derived artifacts and an
//! audit entry. The relationship phase resolves every target (including
//! references the builders deferred) and mirrors each one as an edge. When
//! the relationship phase fails after the node phase committed, the created
//! nodes are removed again so no half-linked artifact survives.

use crate::backend::{BackendSession, NodeRef, StorageBackend};
use crate::codec::{
    artifact_path, clear_content, read_artifact, read_audit_entry, read_content, write_artifact,
    write_audit_entry, write_comments, write_relationships, audit_artifact_uuid, ARTIFACT_NODE,
    AUDIT_NODE, AUDIT_ROOT,
};
use crate::context::SessionContext;
use crate::memory::MemoryBackend;
use crate::ontologies::load_ontologies;
use crate::unit_of_work::UnitOfWork;
use cairn_builders::{resolve_deferred, DeferredReference, DerivationPipeline, ResolvedReference};
use cairn_core::{
    compute_content_hash, diff, new_entity_id, verify_derived_relationships, verify_model,
    verify_names, Artifact, ArtifactSnapshot, ArtifactType, AuditEntry, AuditEntryType,
    Classifier, Comment, ContentInfo, EntityType, HasDocumentContent, KindPayload, Ontology,
    RegistryConfig, RegistryError, RegistryResult, Relationship, RelationshipKind, StorageError,
    Target, TypeRegistry, ValidationError,
};
use chrono::Utc;
use std::collections::BTreeSet;

/// Principal recorded when none is configured.
pub const DEFAULT_PRINCIPAL: &str = "anonymous";

// ============================================================================
// BATCH TYPES
// ============================================================================

/// One artifact to create as part of a batch.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub expected: ArtifactType,
    pub artifact: Artifact,
    pub content: Option<Vec<u8>>,
}

impl BatchItem {
    /// Item whose expected type is the artifact's own.
    pub fn new(artifact: Artifact) -> Self {
        Self {
            expected: artifact.artifact_type.clone(),
            artifact,
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// A primary and its derived set between the two phases.
#[derive(Debug)]
struct PendingArtifact {
    primary: Artifact,
    derived: Vec<Artifact>,
    deferred: Vec<DeferredReference>,
    node: NodeRef,
    audit_node: Option<NodeRef>,
}

impl PendingArtifact {
    fn uuid(&self) -> &str {
        self.primary.uuid_str()
    }

    fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        std::iter::once(&self.primary).chain(self.derived.iter())
    }

    fn artifact_mut(&mut self, uuid: &str) -> Option<&mut Artifact> {
        if self.primary.uuid_str() == uuid {
            return Some(&mut self.primary);
        }
        self.derived.iter_mut().find(|a| a.uuid_str() == uuid)
    }
}

/// Edges to write for one pending artifact, resolved but not yet applied.
#[derive(Debug, Default)]
struct RelationshipPlan {
    resolved: Vec<ResolvedReference>,
    edges: Vec<(NodeRef, String, NodeRef)>,
}

enum Slot {
    Pending(PendingArtifact),
    Done(RegistryResult<Artifact>),
}

/// Outcome of one batch pass.
enum Attempt {
    Settled,
    /// Some slots lost their UUIDs at commit; the rest need another pass.
    Retry,
}

/// Write per-slot results; `error` replaces every still-pending success.
fn settle(
    results: &mut [Option<RegistryResult<Artifact>>],
    slots: Vec<(usize, Slot)>,
    error: Option<&RegistryError>,
) {
    for (idx, slot) in slots {
        results[idx] = Some(match (slot, error) {
            (Slot::Done(result), _) => result,
            (Slot::Pending(_), Some(e)) => Err(e.clone()),
            (Slot::Pending(pending), None) => Ok(pending.primary),
        });
    }
}

fn is_derived_relationship(artifact: &Artifact, relationship: &Relationship) -> bool {
    relationship.kind == RelationshipKind::Derived
        || artifact
            .kind()
            .derived_relationships()
            .contains(&relationship.name.as_str())
}

fn content_info(content: &[u8]) -> ContentInfo {
    ContentInfo {
        size: content.len() as u64,
        hash: compute_content_hash(content),
        encoding: None,
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// The registry coordinator.
///
/// Every public operation runs in its own [`UnitOfWork`] and releases its
/// session before returning, on success and on failure.
pub struct Registry<B: StorageBackend> {
    backend: B,
    types: TypeRegistry,
    pipeline: DerivationPipeline,
    config: RegistryConfig,
    principal: String,
}

impl Registry<MemoryBackend> {
    /// Registry over a fresh in-memory backend with default settings.
    pub fn in_memory() -> Self {
        Self {
            backend: MemoryBackend::new(),
            types: TypeRegistry::default(),
            pipeline: DerivationPipeline::standard(),
            config: RegistryConfig::default(),
            principal: DEFAULT_PRINCIPAL.to_string(),
        }
    }
}

impl<B: StorageBackend> Registry<B> {
    pub fn new(backend: B, config: RegistryConfig) -> RegistryResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            types: TypeRegistry::default(),
            pipeline: DerivationPipeline::standard(),
            config,
            principal: DEFAULT_PRINCIPAL.to_string(),
        })
    }

    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    pub fn with_pipeline(mut self, pipeline: DerivationPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = principal.into();
        self
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub(crate) fn begin(&self) -> RegistryResult<UnitOfWork<B::Session>> {
        Ok(UnitOfWork::new(self.backend.open_session()?, self.principal.clone()))
    }

    /// Run a read against a throwaway session.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&B::Session) -> RegistryResult<T>) -> RegistryResult<T> {
        let mut session = self.backend.open_session()?;
        let result = f(&session);
        session.close()?;
        result
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn get_artifact(&self, expected: &ArtifactType, uuid: &str) -> RegistryResult<Artifact> {
        self.read(|session| {
            let artifact = read_artifact(session, artifact_node(session, uuid)?)?;
            verify_model(expected, &artifact)?;
            Ok(artifact)
        })
    }

    pub fn get_content(&self, expected: &ArtifactType, uuid: &str) -> RegistryResult<Vec<u8>> {
        self.read(|session| {
            let node = artifact_node(session, uuid)?;
            let artifact = read_artifact(session, node)?;
            verify_model(expected, &artifact)?;
            match read_content(session, node)? {
                Some(bytes) if artifact.is_document() => Ok(bytes),
                _ => Err(ValidationError::NoContent {
                    id: uuid.to_string(),
                    artifact_type: artifact.artifact_type.type_name().to_string(),
                }
                .into()),
            }
        })
    }

    /// Audit entries for an artifact, oldest first. Deleted artifacts keep
    /// their trail.
    pub fn audit_trail(&self, uuid: &str) -> RegistryResult<Vec<AuditEntry>> {
        self.read(|session| {
            let mut entries = Vec::new();
            for node in session.find_nodes(AUDIT_NODE)? {
                if audit_artifact_uuid(session, node)? == uuid {
                    entries.push(read_audit_entry(session, node)?);
                }
            }
            if entries.is_empty() {
                artifact_node(session, uuid)?;
            }
            entries.sort_by(|a, b| a.sort_id.cmp(&b.sort_id).then_with(|| a.uuid.cmp(&b.uuid)));
            Ok(entries)
        })
    }

    // ========================================================================
    // CREATE
    // ========================================================================

    /// Create a primary artifact, deriving sub-artifacts from `content`.
    pub fn create(
        &self,
        expected: &ArtifactType,
        artifact: Artifact,
        content: Option<&[u8]>,
    ) -> RegistryResult<Artifact> {
        let mut uow = self.begin()?;
        let mut pending = match load_ontologies(uow.session())
            .and_then(|ontologies| self.persist_nodes(&mut uow, expected, artifact, content, &ontologies))
        {
            Ok(pending) => pending,
            Err(e) => {
                uow.fail(&e);
                return Err(e);
            }
        };
        uow.nodes_persisted()?;

        let linked = self
            .plan_relationships(&uow, &pending, true)
            .and_then(|plan| self.apply_relationships(&mut uow, &mut pending, plan));
        if let Err(e) = linked {
            uow.fail(&e);
            self.compensate(&mut uow, &pending)?;
            uow.commit()?;
            return Err(e);
        }
        uow.relationships_persisted()?;
        uow.commit()?;

        tracing::info!(
            uuid = %pending.uuid(),
            artifact_type = %pending.primary.artifact_type.type_name(),
            derived = pending.derived.len(),
            "Artifact created"
        );
        Ok(pending.primary)
    }

    /// Create a document, typing it from its file name.
    pub fn upload(&self, file_name: &str, content: &[u8]) -> RegistryResult<Artifact> {
        let artifact_type = self.types.from_file_name(file_name);
        let artifact = Artifact::new(artifact_type.clone(), file_name);
        self.create(&artifact_type, artifact, Some(content))
    }

    /// Create every item, isolating failures per slot.
    ///
    /// The result has one entry per item, in submission order. A failing
    /// item never removes or blocks another's success. When another writer
    /// takes an item's UUID before the node phase commits, that item fails
    /// with `Conflict` and the remaining items are persisted again.
    pub fn persist_batch(&self, items: Vec<BatchItem>) -> Vec<RegistryResult<Artifact>> {
        let total = items.len();
        let mut results: Vec<Option<RegistryResult<Artifact>>> = (0..total).map(|_| None).collect();

        loop {
            let open: Vec<usize> = (0..total).filter(|&idx| results[idx].is_none()).collect();
            if open.is_empty() {
                break;
            }
            match self.batch_attempt(&items, &open, &mut results) {
                Ok(Attempt::Settled) => break,
                Ok(Attempt::Retry) => {
                    tracing::debug!(remaining = open.len(), "Retrying batch after commit conflict");
                }
                Err(e) => {
                    for idx in open {
                        results[idx] = Some(Err(e.clone()));
                    }
                    break;
                }
            }
        }

        let results: Vec<RegistryResult<Artifact>> = results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(StorageError::TransactionFailed {
                        reason: "batch item left unsettled".to_string(),
                    }
                    .into())
                })
            })
            .collect();
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        tracing::info!(
            total,
            succeeded,
            failed = total - succeeded,
            "Batch persisted"
        );
        results
    }

    /// One pass over the `open` slots in a single unit of work.
    fn batch_attempt(
        &self,
        items: &[BatchItem],
        open: &[usize],
        results: &mut [Option<RegistryResult<Artifact>>],
    ) -> RegistryResult<Attempt> {
        let mut uow = self.begin()?;
        let ontologies = load_ontologies(uow.session())?;

        // Node phase.
        let mut slots: Vec<(usize, Slot)> = open
            .iter()
            .map(|&idx| {
                let item = &items[idx];
                match self.persist_nodes(
                    &mut uow,
                    &item.expected,
                    item.artifact.clone(),
                    item.content.as_deref(),
                    &ontologies,
                ) {
                    Ok(pending) => (idx, Slot::Pending(pending)),
                    Err(e) => {
                        tracing::warn!(item = idx, error = %e, "Batch item failed in node phase");
                        (idx, Slot::Done(Err(e)))
                    }
                }
            })
            .collect();

        if let Err(e) = uow.nodes_persisted() {
            drop(uow);
            let taken = self.taken_slots(&slots)?;
            if taken.is_empty() {
                settle(results, slots, Some(&e));
                return Ok(Attempt::Settled);
            }
            for (idx, uuid) in taken {
                tracing::warn!(item = idx, uuid = %uuid, "Batch item lost its UUID to a concurrent writer");
                results[idx] = Some(Err(RegistryError::already_exists(EntityType::Artifact, uuid)));
            }
            return Ok(Attempt::Retry);
        }

        // Relationship phase. Removing a failed item can invalidate an item
        // that targets it, so plan until a full pass fails nothing.
        let mut plans: Vec<Option<RelationshipPlan>> = Vec::new();
        loop {
            plans.clear();
            let mut failed = false;
            for (idx, slot) in slots.iter_mut() {
                let Slot::Pending(pending) = slot else {
                    plans.push(None);
                    continue;
                };
                match self.plan_relationships(&uow, pending, true) {
                    Ok(plan) => plans.push(Some(plan)),
                    Err(e) => {
                        tracing::warn!(item = *idx, error = %e, "Batch item failed in relationship phase");
                        self.compensate(&mut uow, pending)?;
                        *slot = Slot::Done(Err(e));
                        plans.push(None);
                        failed = true;
                    }
                }
            }
            if !failed {
                break;
            }
        }

        for ((_, slot), plan) in slots.iter_mut().zip(plans) {
            let (Slot::Pending(pending), Some(plan)) = (&mut *slot, plan) else {
                continue;
            };
            if let Err(e) = self.apply_relationships(&mut uow, pending, plan) {
                self.compensate(&mut uow, pending)?;
                *slot = Slot::Done(Err(e));
            }
        }

        let committed = uow.relationships_persisted().and_then(|()| uow.commit());
        if let Err(e) = committed {
            // The node phase is already committed; take those nodes back out.
            self.discard_pending(&slots)?;
            settle(results, slots, Some(&e));
            return Ok(Attempt::Settled);
        }
        settle(results, slots, None);
        Ok(Attempt::Settled)
    }

    /// Pending slots with a primary or derived UUID now held by a committed
    /// node, paired with the first such UUID.
    fn taken_slots(&self, slots: &[(usize, Slot)]) -> RegistryResult<Vec<(usize, String)>> {
        self.read(|session| {
            let mut taken = Vec::new();
            for (idx, slot) in slots {
                let Slot::Pending(pending) = slot else {
                    continue;
                };
                for artifact in pending.artifacts() {
                    if session.find_by_uuid(artifact.uuid_str())?.is_some() {
                        taken.push((*idx, artifact.uuid_str().to_string()));
                        break;
                    }
                }
            }
            Ok(taken)
        })
    }

    /// Remove the committed nodes of every still-pending slot.
    fn discard_pending(&self, slots: &[(usize, Slot)]) -> RegistryResult<()> {
        let mut uow = self.begin()?;
        for (_, slot) in slots {
            if let Slot::Pending(pending) = slot {
                self.compensate(&mut uow, pending)?;
            }
        }
        uow.commit()
    }

    // ========================================================================
    // UPDATE
    // ========================================================================

    /// Replace an artifact's descriptive metadata, custom properties,
    /// classifiers and generic relationships.
    ///
    /// Derived relationships must come back unchanged; content, payload and
    /// creation stamps are kept from the stored version.
    pub fn update_metadata(&self, expected: &ArtifactType, artifact: Artifact) -> RegistryResult<Artifact> {
        let uuid = artifact
            .uuid
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ValidationError::RequiredFieldMissing {
                field: "uuid".to_string(),
            })?;

        let mut uow = self.begin()?;
        match self.apply_metadata_update(&mut uow, expected, &uuid, artifact) {
            Ok(updated) => {
                uow.commit()?;
                tracing::info!(uuid = %uuid, "Artifact metadata updated");
                Ok(updated)
            }
            Err(e) => {
                uow.fail(&e);
                Err(e)
            }
        }
    }

    fn apply_metadata_update(
        &self,
        uow: &mut UnitOfWork<B::Session>,
        expected: &ArtifactType,
        uuid: &str,
        artifact: Artifact,
    ) -> RegistryResult<Artifact> {
        let node = artifact_node(uow.session(), uuid)?;
        let stored = read_artifact(uow.session(), node)?;
        verify_model(expected, &stored)?;
        verify_model(expected, &artifact)?;
        verify_names(&artifact)?;
        verify_derived_relationships(&artifact, Some(&stored))?;

        let ontologies = load_ontologies(uow.session())?;
        let classified_by = Classifier::new(&ontologies).resolve_all(&artifact.classified_by)?;

        let mut updated = stored.clone();
        updated.name = artifact.name.clone();
        updated.description = artifact.description.clone();
        updated.version = artifact.version.clone();
        updated.properties = artifact.properties.clone();
        updated.classified_by = classified_by.into_iter().collect();
        updated.relationships = stored
            .relationships
            .iter()
            .filter(|r| is_derived_relationship(&stored, r))
            .cloned()
            .chain(
                artifact
                    .relationships
                    .iter()
                    .filter(|r| !is_derived_relationship(&artifact, r))
                    .cloned(),
            )
            .collect();
        updated.last_modified_by = Some(uow.principal().to_string());
        updated.last_modified_timestamp = Some(Utc::now());

        // Generic edges are rebuilt from scratch.
        for rel in stored.relationships.iter().filter(|r| !is_derived_relationship(&stored, r)) {
            uow.session_mut().remove_edges(node, Some(&rel.name))?;
        }
        for rel in updated.relationships.iter().filter(|r| !is_derived_relationship(&updated, r)) {
            for target in &rel.targets {
                let target_node = uow.create_reference(&target.uuid)?;
                uow.session_mut().add_edge(node, &rel.name, target_node)?;
            }
        }
        write_artifact(uow.session_mut(), node, &updated, None)?;

        if self.config.audit_enabled {
            self.record_audit(uow, uuid, AuditEntryType::ArtifactUpdate, Some(&stored), Some(&updated))?;
        }
        Ok(updated)
    }

    /// Replace a document's content and, with it, its whole derived set.
    ///
    /// Removal of the old set, the new nodes and their links commit
    /// together; a failure anywhere leaves the stored document untouched.
    pub fn update_content(
        &self,
        expected: &ArtifactType,
        uuid: &str,
        content: &[u8],
    ) -> RegistryResult<Artifact> {
        let mut uow = self.begin()?;
        let replaced = self
            .replace_content(&mut uow, expected, uuid, Some(content))
            .and_then(|mut pending| {
                let plan = self.plan_relationships(&uow, &pending, false)?;
                self.apply_relationships(&mut uow, &mut pending, plan)?;
                Ok(pending)
            });
        let pending = match replaced {
            Ok(pending) => pending,
            Err(e) => {
                uow.fail(&e);
                return Err(e);
            }
        };
        uow.commit()?;

        tracing::info!(uuid = %uuid, derived = pending.derived.len(), "Artifact content updated");
        Ok(pending.primary)
    }

    /// Drop a document's content and derived set; size becomes 0 and the
    /// hash empty.
    pub fn delete_content(&self, expected: &ArtifactType, uuid: &str) -> RegistryResult<Artifact> {
        let mut uow = self.begin()?;
        match self.replace_content(&mut uow, expected, uuid, None) {
            Ok(pending) => {
                uow.commit()?;
                tracing::info!(uuid = %uuid, "Artifact content deleted");
                Ok(pending.primary)
            }
            Err(e) => {
                uow.fail(&e);
                Err(e)
            }
        }
    }

    fn replace_content(
        &self,
        uow: &mut UnitOfWork<B::Session>,
        expected: &ArtifactType,
        uuid: &str,
        content: Option<&[u8]>,
    ) -> RegistryResult<PendingArtifact> {
        let node = artifact_node(uow.session(), uuid)?;
        let stored = read_artifact(uow.session(), node)?;
        verify_model(expected, &stored)?;
        if !stored.is_document() {
            return Err(ValidationError::NoContent {
                id: uuid.to_string(),
                artifact_type: stored.artifact_type.type_name().to_string(),
            }
            .into());
        }

        let children = derived_children(uow.session(), node)?;
        check_derived_constraints(uow.session(), node, uuid, &children)?;

        // The old derived set goes entirely before the new one is built.
        for child in &children {
            uow.session_mut().remove_node(*child)?;
        }
        let mut primary = stored.clone();
        for rel in stored.relationships.iter().filter(|r| is_derived_relationship(&stored, r)) {
            uow.session_mut().remove_edges(node, Some(&rel.name))?;
        }
        primary.relationships.retain(|r| !is_derived_relationship(&stored, r));
        primary.payload = KindPayload::Plain;
        primary.last_modified_by = Some(uow.principal().to_string());
        primary.last_modified_timestamp = Some(Utc::now());

        match content {
            Some(bytes) => primary.content = Some(content_info(bytes)),
            None => {
                primary.content = Some(ContentInfo {
                    size: 0,
                    hash: String::new(),
                    encoding: None,
                });
                clear_content(uow.session_mut(), node)?;
            }
        }

        let out = self.pipeline.build(&mut primary, content)?;
        let derived = self.stamp_derived(uow, out.derived)?;
        for artifact in &derived {
            let child = uow
                .session_mut()
                .create_node(&artifact_path(artifact), ARTIFACT_NODE)?;
            write_artifact(uow.session_mut(), child, artifact, None)?;
            uow.track(artifact.uuid_str(), child);
        }
        write_artifact(uow.session_mut(), node, &primary, content)?;
        uow.track(uuid, node);

        let audit_node = self.record_audit(uow, uuid, AuditEntryType::ContentUpdate, Some(&stored), Some(&primary))?;
        Ok(PendingArtifact {
            primary,
            derived,
            deferred: out.deferred,
            node,
            audit_node: Some(audit_node),
        })
    }

    // ========================================================================
    // DELETE & COMMENTS
    // ========================================================================

    /// Soft-delete a primary and its derived set into the trash.
    pub fn delete(&self, expected: &ArtifactType, uuid: &str) -> RegistryResult<()> {
        let mut uow = self.begin()?;
        match self.move_to_trash(&mut uow, expected, uuid) {
            Ok(path) => {
                uow.commit()?;
                tracing::info!(uuid = %uuid, trash_path = %path, "Artifact deleted");
                Ok(())
            }
            Err(e) => {
                uow.fail(&e);
                Err(e)
            }
        }
    }

    fn move_to_trash(
        &self,
        uow: &mut UnitOfWork<B::Session>,
        expected: &ArtifactType,
        uuid: &str,
    ) -> RegistryResult<String> {
        let node = artifact_node(uow.session(), uuid)?;
        let stored = read_artifact(uow.session(), node)?;
        verify_model(expected, &stored)?;
        if stored.derived {
            return Err(ValidationError::InvalidValue {
                field: "uuid".to_string(),
                reason: "derived artifacts are only removed with their primary".to_string(),
            }
            .into());
        }

        let mut subtree = derived_children(uow.session(), node)?;
        subtree.push(node);
        for member in &subtree {
            let external = uow
                .session()
                .incoming_edges(*member)?
                .into_iter()
                .any(|(source, _)| !subtree.contains(&source));
            if external {
                return Err(StorageError::RelationshipConstraint { id: uuid.to_string() }.into());
            }
        }

        let path = uow.session_mut().move_to_trash(node, &self.config.trash_root)?;
        self.record_audit(uow, uuid, AuditEntryType::ArtifactDelete, Some(&stored), None)?;
        Ok(path)
    }

    /// Append a comment authored by this registry's principal.
    pub fn add_comment(&self, expected: &ArtifactType, uuid: &str, text: &str) -> RegistryResult<Artifact> {
        if text.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "comment".to_string(),
            }
            .into());
        }
        let mut uow = self.begin()?;
        match append_comment(&mut uow, expected, uuid, text) {
            Ok(artifact) => {
                uow.commit()?;
                Ok(artifact)
            }
            Err(e) => {
                uow.fail(&e);
                Err(e)
            }
        }
    }

    // ========================================================================
    // PHASES
    // ========================================================================

    /// Node phase for one new primary. On error nothing of it is left in
    /// the session.
    fn persist_nodes(
        &self,
        uow: &mut UnitOfWork<B::Session>,
        expected: &ArtifactType,
        mut artifact: Artifact,
        content: Option<&[u8]>,
        ontologies: &[Ontology],
    ) -> RegistryResult<PendingArtifact> {
        verify_model(expected, &artifact)?;
        if artifact.artifact_type.is_derived() {
            return Err(ValidationError::InvalidValue {
                field: "artifactType".to_string(),
                reason: format!(
                    "{} artifacts are only created by derivation",
                    artifact.artifact_type.type_name()
                ),
            }
            .into());
        }
        if artifact.name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "name".to_string(),
            }
            .into());
        }
        verify_names(&artifact)?;
        verify_derived_relationships(&artifact, None)?;
        artifact.classified_by = Classifier::new(ontologies)
            .resolve_all(&artifact.classified_by)?
            .into_iter()
            .collect();

        match (content, artifact.is_document()) {
            (Some(bytes), true) => artifact.content = Some(content_info(bytes)),
            (Some(_), false) => {
                return Err(ValidationError::InvalidValue {
                    field: "content".to_string(),
                    reason: format!("{} artifacts carry no content", artifact.artifact_type.type_name()),
                }
                .into())
            }
            (None, _) => artifact.content = None,
        }

        let uuid = match artifact.uuid.take().filter(|u| !u.trim().is_empty()) {
            Some(uuid) => uuid,
            None => new_entity_id(),
        };
        if uow.session().find_by_uuid(&uuid)?.is_some() {
            return Err(RegistryError::already_exists(EntityType::Artifact, uuid));
        }
        artifact.uuid = Some(uuid.clone());
        artifact.derived = false;
        artifact.related_document = None;
        let now = Utc::now();
        artifact.created_by = Some(uow.principal().to_string());
        artifact.created_timestamp = Some(now);
        artifact.last_modified_by = Some(uow.principal().to_string());
        artifact.last_modified_timestamp = Some(now);

        let out = self.pipeline.build(&mut artifact, content)?;
        let derived = self.stamp_derived(uow, out.derived)?;

        let node = uow
            .session_mut()
            .create_node(&artifact_path(&artifact), ARTIFACT_NODE)
            .map_err(|e| match e {
                RegistryError::Storage(StorageError::PathExists { .. }) => {
                    RegistryError::already_exists(EntityType::Artifact, uuid.clone())
                }
                other => other,
            })?;

        match self.write_new_nodes(uow, node, &artifact, &derived, content) {
            Ok(audit_node) => {
                uow.track(uuid, node);
                Ok(PendingArtifact {
                    primary: artifact,
                    derived,
                    deferred: out.deferred,
                    node,
                    audit_node: Some(audit_node),
                })
            }
            Err(e) => {
                for child in &derived {
                    uow.forget(child.uuid_str());
                }
                uow.session_mut().remove_node(node)?;
                Err(e)
            }
        }
    }

    /// Everything after the primary node exists: its fields, the derived
    /// nodes and the audit entry.
    fn write_new_nodes(
        &self,
        uow: &mut UnitOfWork<B::Session>,
        node: NodeRef,
        primary: &Artifact,
        derived: &[Artifact],
        content: Option<&[u8]>,
    ) -> RegistryResult<NodeRef> {
        write_artifact(uow.session_mut(), node, primary, content)?;
        for child in derived {
            let child_node = uow
                .session_mut()
                .create_node(&artifact_path(child), ARTIFACT_NODE)?;
            write_artifact(uow.session_mut(), child_node, child, None)?;
            uow.track(child.uuid_str(), child_node);
        }
        self.record_audit(uow, primary.uuid_str(), AuditEntryType::ArtifactAdd, None, Some(primary))
    }

    /// Stamp creation metadata on freshly derived artifacts and make sure
    /// none of their UUIDs is taken.
    fn stamp_derived(
        &self,
        uow: &UnitOfWork<B::Session>,
        derived: Vec<Artifact>,
    ) -> RegistryResult<Vec<Artifact>> {
        let now = Utc::now();
        let mut seen = BTreeSet::new();
        derived
            .into_iter()
            .map(|mut artifact| {
                let uuid = artifact.uuid_str().to_string();
                if !seen.insert(uuid.clone()) || uow.session().find_by_uuid(&uuid)?.is_some() {
                    return Err(RegistryError::already_exists(EntityType::Artifact, uuid));
                }
                artifact.created_by = Some(uow.principal().to_string());
                artifact.created_timestamp = Some(now);
                artifact.last_modified_by = Some(uow.principal().to_string());
                artifact.last_modified_timestamp = Some(now);
                Ok(artifact)
            })
            .collect()
    }

    /// Resolve deferred references and every relationship target to nodes.
    /// Writes nothing.
    fn plan_relationships(
        &self,
        uow: &UnitOfWork<B::Session>,
        pending: &PendingArtifact,
        include_primary_generic: bool,
    ) -> RegistryResult<RelationshipPlan> {
        let resolved = resolve_deferred(&pending.deferred, &SessionContext::new(uow.session()))?;

        let mut plan = RelationshipPlan::default();
        for artifact in pending.artifacts() {
            let source = uow.create_reference(artifact.uuid_str())?;
            let is_primary = artifact.uuid_str() == pending.uuid();
            for rel in &artifact.relationships {
                if is_primary && !include_primary_generic && !is_derived_relationship(artifact, rel) {
                    continue;
                }
                for target in &rel.targets {
                    plan.edges
                        .push((source, rel.name.clone(), uow.create_reference(&target.uuid)?));
                }
            }
        }
        for reference in &resolved {
            let source = uow.create_reference(&reference.source_uuid)?;
            for target in &reference.target_uuids {
                plan.edges
                    .push((source, reference.relationship.clone(), uow.create_reference(target)?));
            }
        }
        plan.resolved = resolved;
        Ok(plan)
    }

    fn apply_relationships(
        &self,
        uow: &mut UnitOfWork<B::Session>,
        pending: &mut PendingArtifact,
        plan: RelationshipPlan,
    ) -> RegistryResult<()> {
        for (source, name, target) in &plan.edges {
            uow.session_mut().add_edge(*source, name, *target)?;
        }

        let mut touched = BTreeSet::new();
        for reference in plan.resolved {
            let Some(artifact) = pending.artifact_mut(&reference.source_uuid) else {
                continue;
            };
            let rel = artifact.relationship_mut(&reference.relationship, RelationshipKind::Derived);
            for target in reference.target_uuids {
                if !rel.target_uuids().any(|t| t == target) {
                    rel.targets.push(Target::new(target));
                }
            }
            touched.insert(reference.source_uuid);
        }
        for uuid in touched {
            let node = uow.create_reference(&uuid)?;
            if let Some(artifact) = pending.artifacts().find(|a| a.uuid_str() == uuid) {
                write_relationships(uow.session_mut(), node, &artifact.relationships)?;
            }
        }
        Ok(())
    }

    /// Remove what the node phase created for `pending`.
    fn compensate(&self, uow: &mut UnitOfWork<B::Session>, pending: &PendingArtifact) -> RegistryResult<()> {
        tracing::warn!(uuid = %pending.uuid(), "Removing artifact after failed relationship phase");
        for artifact in pending.artifacts() {
            uow.forget(artifact.uuid_str());
        }
        uow.session_mut().remove_node(pending.node)?;
        if let Some(audit_node) = pending.audit_node {
            uow.session_mut().remove_node(audit_node)?;
        }
        Ok(())
    }

    fn record_audit(
        &self,
        uow: &mut UnitOfWork<B::Session>,
        artifact_uuid: &str,
        entry_type: AuditEntryType,
        before: Option<&Artifact>,
        after: Option<&Artifact>,
    ) -> RegistryResult<NodeRef> {
        let before = before.map(ArtifactSnapshot::of).unwrap_or_else(ArtifactSnapshot::empty);
        let after = after.map(ArtifactSnapshot::of).unwrap_or_else(ArtifactSnapshot::empty);
        let entry = AuditEntry::new(artifact_uuid, entry_type, uow.principal(), diff(&before, &after));
        let node = uow
            .session_mut()
            .create_node(&format!("{}/{}", AUDIT_ROOT, entry.uuid), AUDIT_NODE)?;
        write_audit_entry(uow.session_mut(), node, &entry)?;
        tracing::debug!(artifact = %artifact_uuid, entry_type = ?entry_type, "Audit entry recorded");
        Ok(node)
    }
}

// ============================================================================
// NODE HELPERS
// ============================================================================

/// Live artifact node for `uuid`.
pub(crate) fn artifact_node<S: BackendSession>(session: &S, uuid: &str) -> RegistryResult<NodeRef> {
    match session.find_by_uuid(uuid)? {
        Some(node) if session.kind_of(node)? == ARTIFACT_NODE => Ok(node),
        _ => Err(RegistryError::not_found(EntityType::Artifact, uuid)),
    }
}

fn append_comment<S: BackendSession>(
    uow: &mut UnitOfWork<S>,
    expected: &ArtifactType,
    uuid: &str,
    text: &str,
) -> RegistryResult<Artifact> {
    let node = artifact_node(uow.session(), uuid)?;
    let mut artifact = read_artifact(uow.session(), node)?;
    verify_model(expected, &artifact)?;
    artifact.comments.push(Comment {
        text: text.to_string(),
        created_by: uow.principal().to_string(),
        created_at: Utc::now(),
    });
    write_comments(uow.session_mut(), node, &artifact.comments)?;
    Ok(artifact)
}

fn derived_children<S: BackendSession>(session: &S, node: NodeRef) -> RegistryResult<Vec<NodeRef>> {
    let mut children = Vec::new();
    for child in session.children(node)? {
        if session.kind_of(child)? == ARTIFACT_NODE {
            children.push(child);
        }
    }
    Ok(children)
}

/// Derived artifacts may only be replaced when nothing outside the
/// document targets them and none carries user metadata.
fn check_derived_constraints<S: BackendSession>(
    session: &S,
    primary: NodeRef,
    uuid: &str,
    children: &[NodeRef],
) -> RegistryResult<()> {
    for child in children {
        let external = session
            .incoming_edges(*child)?
            .into_iter()
            .any(|(source, _)| source != primary && !children.contains(&source));
        if external {
            return Err(StorageError::RelationshipConstraint { id: uuid.to_string() }.into());
        }
        let derived = read_artifact(session, *child)?;
        if !derived.properties.is_empty() || !derived.classified_by.is_empty() {
            return Err(StorageError::DerivedMetadataConstraint {
                id: uuid.to_string(),
                reason: format!(
                    "{} {} has custom properties or classifiers",
                    derived.artifact_type.type_name(),
                    derived.uuid_str()
                ),
            }
            .into());
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
