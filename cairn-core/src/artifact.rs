//! Artifact model

use crate::{ArtifactKind, ArtifactType, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the link from a derived artifact back to its primary.
pub const RELATED_DOCUMENT: &str = "relatedDocument";

// ============================================================================
// PROPERTIES & RELATIONSHIPS
// ============================================================================

/// A custom (user-defined) property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Whether a relationship is user-defined or produced by the derivation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    Generic,
    Derived,
}

/// One end of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub uuid: String,
    pub attributes: BTreeMap<String, String>,
}

impl Target {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A named, multi-target edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub kind: RelationshipKind,
    pub targets: Vec<Target>,
    pub attributes: BTreeMap<String, String>,
}

impl Relationship {
    pub fn generic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::Generic,
            targets: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn derived(name: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::Derived,
            ..Self::generic(name)
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn target_uuids(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.uuid.as_str())
    }
}

// ============================================================================
// CONTENT & COMMENTS
// ============================================================================

/// Handle to stored document content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInfo {
    pub size: u64,
    /// Hex SHA-256 of the content; empty once content is deleted.
    pub hash: String,
    pub encoding: Option<String>,
}

/// A timestamped comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub created_by: String,
    pub created_at: Timestamp,
}

/// Kind-specific fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KindPayload {
    #[default]
    Plain,
    /// XSD and WSDL documents.
    Schema { target_namespace: Option<String> },
    /// Named declarations derived from a schema or service description.
    Declaration {
        namespace: Option<String>,
        nc_name: String,
    },
    /// SOAP address extensions, which also carry the endpoint location.
    Endpoint {
        namespace: Option<String>,
        nc_name: String,
        location: String,
    },
}

// ============================================================================
// ARTIFACT
// ============================================================================

/// A registered artifact: primary or derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Unset until the coordinator (or a builder, for derived artifacts) assigns one.
    pub uuid: Option<String>,
    pub artifact_type: ArtifactType,
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
    pub created_by: Option<String>,
    pub created_timestamp: Option<Timestamp>,
    pub last_modified_by: Option<String>,
    pub last_modified_timestamp: Option<Timestamp>,
    pub properties: Vec<Property>,
    pub relationships: Vec<Relationship>,
    /// Classification tokens on input; canonical class URIs once persisted.
    pub classified_by: Vec<String>,
    pub comments: Vec<Comment>,
    pub derived: bool,
    /// UUID of the primary this artifact was derived from.
    pub related_document: Option<String>,
    pub content: Option<ContentInfo>,
    pub payload: KindPayload,
}

impl Artifact {
    /// New, unsaved artifact.
    pub fn new(artifact_type: ArtifactType, name: impl Into<String>) -> Self {
        let derived = artifact_type.is_derived();
        Self {
            uuid: None,
            artifact_type,
            name: name.into(),
            description: None,
            version: None,
            created_by: None,
            created_timestamp: None,
            last_modified_by: None,
            last_modified_timestamp: None,
            properties: Vec::new(),
            relationships: Vec::new(),
            classified_by: Vec::new(),
            comments: Vec::new(),
            derived,
            related_document: None,
            content: None,
            payload: KindPayload::Plain,
        }
    }

    pub fn of_kind(kind: ArtifactKind, name: impl Into<String>) -> Self {
        Self::new(ArtifactType::of(kind), name)
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_property(name, value);
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn with_classifier(mut self, token: impl Into<String>) -> Self {
        self.classified_by.push(token.into());
        self
    }

    pub fn kind(&self) -> ArtifactKind {
        self.artifact_type.kind
    }

    pub fn uuid_str(&self) -> &str {
        self.uuid.as_deref().unwrap_or("")
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Insert or replace a custom property, keeping insertion order.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.properties.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self.properties.push(Property { name, value }),
        }
    }

    pub fn remove_property(&mut self, name: &str) -> Option<String> {
        let idx = self.properties.iter().position(|p| p.name == name)?;
        Some(self.properties.remove(idx).value)
    }

    /// Get or create a relationship by name.
    pub fn relationship_mut(&mut self, name: &str, kind: RelationshipKind) -> &mut Relationship {
        let idx = match self.relationships.iter().position(|r| r.name == name) {
            Some(idx) => idx,
            None => {
                self.relationships.push(Relationship {
                    name: name.to_string(),
                    kind,
                    targets: Vec::new(),
                    attributes: BTreeMap::new(),
                });
                self.relationships.len() - 1
            }
        };
        &mut self.relationships[idx]
    }

    /// Add a derived target, creating the relationship on first use.
    pub fn add_derived_target(&mut self, relationship: &str, target_uuid: impl Into<String>) {
        self.relationship_mut(relationship, RelationshipKind::Derived)
            .targets
            .push(Target::new(target_uuid));
    }

    pub fn target_namespace(&self) -> Option<&str> {
        match &self.payload {
            KindPayload::Schema { target_namespace } => target_namespace.as_deref(),
            _ => None,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match &self.payload {
            KindPayload::Declaration { namespace, .. } | KindPayload::Endpoint { namespace, .. } => {
                namespace.as_deref()
            }
            _ => None,
        }
    }

    pub fn nc_name(&self) -> Option<&str> {
        match &self.payload {
            KindPayload::Declaration { nc_name, .. } | KindPayload::Endpoint { nc_name, .. } => {
                Some(nc_name)
            }
            _ => None,
        }
    }

    pub fn soap_location(&self) -> Option<&str> {
        match &self.payload {
            KindPayload::Endpoint { location, .. } => Some(location),
            _ => None,
        }
    }
}

// ============================================================================
// CAPABILITY TRAITS
// ============================================================================

/// Artifacts that carry relationships.
pub trait HasRelationships {
    fn relationships(&self) -> &[Relationship];

    fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships().iter().find(|r| r.name == name)
    }

    /// Relationships produced by the derivation pipeline.
    fn derived_relationships(&self) -> Vec<&Relationship> {
        self.relationships()
            .iter()
            .filter(|r| r.kind == RelationshipKind::Derived)
            .collect()
    }
}

/// Artifacts that may own stored document content.
pub trait HasDocumentContent {
    fn is_document(&self) -> bool;

    fn content_info(&self) -> Option<&ContentInfo>;
}

/// Artifacts that may be derived from a primary.
pub trait IsDerived {
    fn is_derived(&self) -> bool;

    fn related_document(&self) -> Option<&str>;
}

impl HasRelationships for Artifact {
    fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }
}

impl HasDocumentContent for Artifact {
    fn is_document(&self) -> bool {
        self.artifact_type.is_document()
    }

    fn content_info(&self) -> Option<&ContentInfo> {
        self.content.as_ref()
    }
}

impl IsDerived for Artifact {
    fn is_derived(&self) -> bool {
        self.derived
    }

    fn related_document(&self) -> Option<&str> {
        self.related_document.as_deref()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_derived_kind_sets_flag() {
        let a = Artifact::of_kind(ArtifactKind::ElementDeclaration, "order");
        assert!(a.derived);
        let b = Artifact::of_kind(ArtifactKind::XsdDocument, "order.xsd");
        assert!(!b.derived);
        assert!(b.uuid.is_none());
    }

    #[test]
    fn test_set_property_replaces_in_place() {
        let mut a = Artifact::of_kind(ArtifactKind::Document, "doc")
            .with_property("a", "1")
            .with_property("b", "2");
        a.set_property("a", "3");
        assert_eq!(a.property("a"), Some("3"));
        assert_eq!(a.properties[0].name, "a");
        assert_eq!(a.remove_property("b"), Some("2".to_string()));
        assert_eq!(a.property("b"), None);
    }

    #[test]
    fn test_add_derived_target_creates_relationship_once() {
        let mut a = Artifact::of_kind(ArtifactKind::PortType, "pt");
        a.add_derived_target("operation", "op-1");
        a.add_derived_target("operation", "op-2");
        assert_eq!(a.relationships.len(), 1);
        let rel = a.relationship("operation").unwrap();
        assert_eq!(rel.kind, RelationshipKind::Derived);
        assert_eq!(rel.target_uuids().collect::<Vec<_>>(), vec!["op-1", "op-2"]);
        assert_eq!(a.derived_relationships().len(), 1);
    }

    #[test]
    fn test_payload_accessors() {
        let mut a = Artifact::of_kind(ArtifactKind::XsdDocument, "s.xsd");
        assert_eq!(a.target_namespace(), None);
        a.payload = KindPayload::Schema {
            target_namespace: Some("urn:orders".into()),
        };
        assert_eq!(a.target_namespace(), Some("urn:orders"));
        assert_eq!(a.nc_name(), None);
    }
}
