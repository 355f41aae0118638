//! CAIRN Builders - Derivation Pipeline
//!
//! Builders inspect a primary artifact's content before it is persisted,
//! stamp facts onto the primary and produce derived artifacts. References a
//! builder cannot settle inside one document are recorded as
//! [`DeferredReference`]s and resolved once every node of the unit of work
//! exists, through a [`RelationshipContext`].

use cairn_core::{Artifact, ArtifactKind, KindPayload, RegistryResult, ValidationError};
use std::collections::BTreeSet;

pub mod policy;
pub mod wsdl;
pub mod xml;
pub mod xml_builder;
pub mod xsd;

pub use policy::PolicyBuilder;
pub use wsdl::WsdlBuilder;
pub use xml_builder::XmlBuilder;
pub use xsd::XsdBuilder;

// ============================================================================
// BUILDER TRAIT
// ============================================================================

/// A capability-matched content handler.
pub trait ArtifactBuilder: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this builder handles the given primary.
    fn accepts(&self, primary: &Artifact) -> bool;

    /// Inspect `content`, mutate `primary` and push derived artifacts.
    fn build(&self, primary: &mut Artifact, content: &[u8], out: &mut BuildOutput)
        -> RegistryResult<()>;
}

/// How to find the target of a reference that lies outside the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceLookup {
    /// Documents whose target namespace matches.
    Namespace {
        kinds: Vec<ArtifactKind>,
        namespace: String,
    },
    /// Documents whose name matches a schema location's file name.
    FileName {
        kinds: Vec<ArtifactKind>,
        name: String,
    },
    /// Declarations matching a qualified name.
    QName {
        kinds: Vec<ArtifactKind>,
        namespace: Option<String>,
        local_name: String,
    },
}

impl ReferenceLookup {
    pub fn kinds(&self) -> &[ArtifactKind] {
        match self {
            ReferenceLookup::Namespace { kinds, .. }
            | ReferenceLookup::FileName { kinds, .. }
            | ReferenceLookup::QName { kinds, .. } => kinds,
        }
    }

    /// Whether a candidate artifact satisfies this lookup.
    pub fn matches(&self, candidate: &Artifact) -> bool {
        if !self.kinds().contains(&candidate.kind()) {
            return false;
        }
        match self {
            ReferenceLookup::Namespace { namespace, .. } => {
                candidate.target_namespace() == Some(namespace.as_str())
            }
            ReferenceLookup::FileName { name, .. } => candidate.name == *name,
            ReferenceLookup::QName {
                namespace,
                local_name,
                ..
            } => {
                candidate.nc_name() == Some(local_name.as_str())
                    && candidate.namespace() == namespace.as_deref()
            }
        }
    }
}

/// A relationship target to be settled in the relationship phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredReference {
    /// UUID of the primary or derived artifact that owns the relationship.
    pub source_uuid: String,
    pub relationship: String,
    pub lookup: ReferenceLookup,
}

/// Lookup service the relationship phase hands to the resolver.
pub trait RelationshipContext {
    /// UUIDs of every committed or in-flight artifact matching `lookup`.
    fn find(&self, lookup: &ReferenceLookup) -> RegistryResult<Vec<String>>;
}

/// Targets found for one deferred reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    pub source_uuid: String,
    pub relationship: String,
    pub target_uuids: Vec<String>,
}

/// Resolve deferred references. Unmatched references resolve to no targets,
/// and a source never targets itself.
pub fn resolve_deferred(
    deferred: &[DeferredReference],
    context: &dyn RelationshipContext,
) -> RegistryResult<Vec<ResolvedReference>> {
    let mut resolved = Vec::with_capacity(deferred.len());
    for reference in deferred {
        let mut seen = BTreeSet::new();
        let target_uuids = context
            .find(&reference.lookup)?
            .into_iter()
            .filter(|uuid| *uuid != reference.source_uuid && seen.insert(uuid.clone()))
            .collect::<Vec<_>>();
        if target_uuids.is_empty() {
            tracing::debug!(
                source = %reference.source_uuid,
                relationship = %reference.relationship,
                "Deferred reference left unresolved"
            );
        }
        resolved.push(ResolvedReference {
            source_uuid: reference.source_uuid.clone(),
            relationship: reference.relationship.clone(),
            target_uuids,
        });
    }
    Ok(resolved)
}

// ============================================================================
// BUILD OUTPUT
// ============================================================================

/// Everything the pipeline produced for one primary.
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub derived: Vec<Artifact>,
    pub deferred: Vec<DeferredReference>,
}

impl BuildOutput {
    /// Add a derived artifact and return its UUID (assigned if missing).
    pub fn push(&mut self, mut artifact: Artifact) -> String {
        let uuid = artifact
            .uuid
            .get_or_insert_with(cairn_core::new_entity_id)
            .clone();
        self.derived.push(artifact);
        uuid
    }

    pub fn get_mut(&mut self, uuid: &str) -> Option<&mut Artifact> {
        self.derived
            .iter_mut()
            .find(|a| a.uuid.as_deref() == Some(uuid))
    }

    pub fn get(&self, uuid: &str) -> Option<&Artifact> {
        self.derived.iter().find(|a| a.uuid.as_deref() == Some(uuid))
    }

    /// First derived artifact of one of `kinds` with this qualified name.
    pub fn lookup(
        &self,
        kinds: &[ArtifactKind],
        namespace: Option<&str>,
        local_name: &str,
    ) -> Option<String> {
        self.derived
            .iter()
            .find(|a| {
                kinds.contains(&a.kind())
                    && a.nc_name() == Some(local_name)
                    && a.namespace() == namespace
            })
            .and_then(|a| a.uuid.clone())
    }

    /// Link `source` to `target` through a derived relationship.
    pub fn link(&mut self, source_uuid: &str, relationship: &str, target_uuid: &str) {
        if let Some(source) = self.get_mut(source_uuid) {
            source.add_derived_target(relationship, target_uuid);
        }
    }

    pub fn defer(&mut self, source_uuid: &str, relationship: &str, lookup: ReferenceLookup) {
        self.deferred.push(DeferredReference {
            source_uuid: source_uuid.to_string(),
            relationship: relationship.to_string(),
            lookup,
        });
    }
}

/// A named declaration derived from a document.
pub fn declaration(kind: ArtifactKind, nc_name: &str, namespace: Option<&str>) -> Artifact {
    let mut artifact = Artifact::of_kind(kind, nc_name);
    artifact.payload = KindPayload::Declaration {
        namespace: namespace.map(str::to_string),
        nc_name: nc_name.to_string(),
    };
    artifact
}

/// Decode builder input as UTF-8 text.
pub fn content_text(content: &[u8]) -> RegistryResult<&str> {
    std::str::from_utf8(content).map_err(|e| {
        ValidationError::InvalidValue {
            field: "content".to_string(),
            reason: format!("not valid UTF-8: {}", e),
        }
        .into()
    })
}

/// Parse builder input as an XML document.
pub fn content_xml(content: &[u8]) -> RegistryResult<xml::XmlElement> {
    let text = content_text(content)?;
    xml::parse(text).map_err(|e| {
        ValidationError::InvalidValue {
            field: "content".to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Ordered registry of builders.
pub struct DerivationPipeline {
    builders: Vec<Box<dyn ArtifactBuilder>>,
}

impl Default for DerivationPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for DerivationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivationPipeline")
            .field(
                "builders",
                &self.builders.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl DerivationPipeline {
    /// A pipeline with no builders.
    pub fn empty() -> Self {
        Self {
            builders: Vec::new(),
        }
    }

    /// The built-in builders: XML, then XSD, WSDL and policy.
    pub fn standard() -> Self {
        Self::empty()
            .with_builder(XmlBuilder)
            .with_builder(XsdBuilder)
            .with_builder(WsdlBuilder)
            .with_builder(PolicyBuilder)
    }

    /// Append a builder; it runs after every builder already registered.
    pub fn with_builder(mut self, builder: impl ArtifactBuilder + 'static) -> Self {
        self.builders.push(Box::new(builder));
        self
    }

    pub fn builder_names(&self) -> Vec<&'static str> {
        self.builders.iter().map(|b| b.name()).collect()
    }

    /// Run every accepting builder over `content`.
    ///
    /// The primary must already carry its UUID. Derived artifacts come back
    /// flagged as derived and linked to the primary.
    pub fn build(&self, primary: &mut Artifact, content: Option<&[u8]>) -> RegistryResult<BuildOutput> {
        let primary_uuid = primary.uuid.clone().ok_or_else(|| ValidationError::RequiredFieldMissing {
            field: "uuid".to_string(),
        })?;

        let mut out = BuildOutput::default();
        let Some(content) = content else {
            return Ok(out);
        };

        for builder in &self.builders {
            if builder.accepts(primary) {
                tracing::debug!(builder = builder.name(), primary = %primary_uuid, "Running builder");
                builder.build(primary, content, &mut out)?;
            }
        }

        for derived in &mut out.derived {
            if derived.uuid.is_none() {
                return Err(ValidationError::RequiredFieldMissing {
                    field: format!("uuid of derived {}", derived.artifact_type.type_name()),
                }
                .into());
            }
            derived.derived = true;
            if derived.artifact_type.is_extended() {
                derived.artifact_type.extended_derived = true;
            }
            derived.related_document = Some(primary_uuid.clone());
        }

        tracing::debug!(
            primary = %primary_uuid,
            derived = out.derived.len(),
            deferred = out.deferred.len(),
            "Derivation complete"
        );
        Ok(out)
    }
}

// =============================================================================
// TESTS
// =============================================================================
