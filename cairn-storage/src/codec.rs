//! Artifact <-> node mapping.
//!
//! Model fields live in `sys:*` properties, custom properties in
//! `prop:{name}`. Relationships (names, kinds, attributes and targets) are
//! kept as one JSON document in `sys:relationships`; the coordinator mirrors
//! every target as an edge so the graph itself can answer "who points here".

use crate::backend::{BackendSession, NodeRef, Value};
use cairn_core::{
    Artifact, ArtifactKind, ArtifactType, AuditEntry, Comment, ContentInfo, KindPayload, Ontology,
    Property, Relationship, RegistryResult, StorageError, StoredQuery, TypeError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

// ============================================================================
// PATHS & KINDS
// ============================================================================

pub const ARTIFACT_NODE: &str = "artifact";
pub const ONTOLOGY_NODE: &str = "ontology";
pub const STORED_QUERY_NODE: &str = "storedQuery";
pub const AUDIT_NODE: &str = "auditEntry";

pub const ARTIFACTS_ROOT: &str = "/artifacts";
pub const ONTOLOGIES_ROOT: &str = "/ontologies";
pub const QUERIES_ROOT: &str = "/queries";
pub const AUDIT_ROOT: &str = "/audit";

const UUID: &str = "sys:uuid";
const MODEL: &str = "sys:model";
const TYPE: &str = "sys:type";
const EXTENDED_TYPE: &str = "sys:extendedType";
const EXTENDED_DERIVED: &str = "sys:extendedDerived";
const MIME_TYPE: &str = "sys:mimeType";
const NAME: &str = "sys:name";
const DESCRIPTION: &str = "sys:description";
const VERSION: &str = "sys:version";
const CREATED_BY: &str = "sys:createdBy";
const CREATED_TIMESTAMP: &str = "sys:createdTimestamp";
const LAST_MODIFIED_BY: &str = "sys:lastModifiedBy";
const LAST_MODIFIED_TIMESTAMP: &str = "sys:lastModifiedTimestamp";
const DERIVED: &str = "sys:derived";
const RELATED_DOCUMENT: &str = "sys:relatedDocument";
const CONTENT_SIZE: &str = "sys:contentSize";
const CONTENT_HASH: &str = "sys:contentHash";
const CONTENT_ENCODING: &str = "sys:contentEncoding";
const CONTENT: &str = "sys:content";
const CLASSIFIED_BY: &str = "sys:classifiedBy";
const PAYLOAD: &str = "sys:payload";
const RELATIONSHIPS: &str = "sys:relationships";
const COMMENTS: &str = "sys:comments";
const PROPERTY_ORDER: &str = "sys:propertyOrder";
const DOCUMENT: &str = "sys:document";
const BASE: &str = "sys:base";
const ARTIFACT_UUID: &str = "sys:artifactUuid";
const PROPERTY_PREFIX: &str = "prop:";

/// Node path of an artifact; derived artifacts nest under their primary.
pub fn artifact_path(artifact: &Artifact) -> String {
    match (artifact.derived, artifact.related_document.as_deref()) {
        (true, Some(primary)) => format!("{}/{}/{}", ARTIFACTS_ROOT, primary, artifact.uuid_str()),
        _ => format!("{}/{}", ARTIFACTS_ROOT, artifact.uuid_str()),
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn corrupt(node: NodeRef, reason: impl Into<String>) -> StorageError {
    StorageError::TransactionFailed {
        reason: format!("{} is corrupt: {}", node, reason.into()),
    }
}

fn to_json<T: Serialize>(value: &T) -> RegistryResult<Value> {
    serde_json::to_string(value)
        .map(Value::String)
        .map_err(|e| {
            StorageError::TransactionFailed {
                reason: format!("serialization failed: {}", e),
            }
            .into()
        })
}

fn from_json<T: DeserializeOwned, S: BackendSession + ?Sized>(
    session: &S,
    node: NodeRef,
    name: &str,
) -> RegistryResult<Option<T>> {
    match session.get_property(node, name)? {
        Some(Value::String(json)) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| corrupt(node, format!("{}: {}", name, e)).into()),
        Some(_) => Err(corrupt(node, format!("{} is not a string", name)).into()),
        None => Ok(None),
    }
}

fn string<S: BackendSession + ?Sized>(
    session: &S,
    node: NodeRef,
    name: &str,
) -> RegistryResult<Option<String>> {
    Ok(session
        .get_property(node, name)?
        .and_then(|v| v.as_str().map(str::to_string)))
}

fn required_string<S: BackendSession + ?Sized>(
    session: &S,
    node: NodeRef,
    name: &str,
) -> RegistryResult<String> {
    string(session, node, name)?.ok_or_else(|| corrupt(node, format!("missing {}", name)).into())
}

fn set_optional<S: BackendSession + ?Sized>(
    session: &mut S,
    node: NodeRef,
    name: &str,
    value: Option<Value>,
) -> RegistryResult<()> {
    match value {
        Some(value) => session.set_property(node, name, value),
        None => session.remove_property(node, name),
    }
}

// ============================================================================
// ARTIFACTS
// ============================================================================

/// Write every field of `artifact` onto `node`, replacing what was there.
///
/// Content bytes are only touched when `content` is given.
pub fn write_artifact<S: BackendSession + ?Sized>(
    session: &mut S,
    node: NodeRef,
    artifact: &Artifact,
    content: Option<&[u8]>,
) -> RegistryResult<()> {
    let t = &artifact.artifact_type;
    session.set_property(node, UUID, Value::String(artifact.uuid_str().to_string()))?;
    session.set_property(node, MODEL, Value::String(t.model().to_string()))?;
    session.set_property(node, TYPE, Value::String(t.kind.type_name().to_string()))?;
    set_optional(session, node, EXTENDED_TYPE, t.extended_type.clone().map(Value::String))?;
    session.set_property(node, EXTENDED_DERIVED, Value::Boolean(t.extended_derived))?;
    session.set_property(node, MIME_TYPE, Value::String(t.mime_type.clone()))?;

    session.set_property(node, NAME, Value::String(artifact.name.clone()))?;
    set_optional(session, node, DESCRIPTION, artifact.description.clone().map(Value::String))?;
    set_optional(session, node, VERSION, artifact.version.clone().map(Value::String))?;
    set_optional(session, node, CREATED_BY, artifact.created_by.clone().map(Value::String))?;
    set_optional(session, node, CREATED_TIMESTAMP, artifact.created_timestamp.map(Value::Date))?;
    set_optional(
        session,
        node,
        LAST_MODIFIED_BY,
        artifact.last_modified_by.clone().map(Value::String),
    )?;
    set_optional(
        session,
        node,
        LAST_MODIFIED_TIMESTAMP,
        artifact.last_modified_timestamp.map(Value::Date),
    )?;

    session.set_property(node, DERIVED, Value::Boolean(artifact.derived))?;
    set_optional(
        session,
        node,
        RELATED_DOCUMENT,
        artifact.related_document.clone().map(Value::String),
    )?;

    write_content_info(session, node, artifact.content.as_ref())?;
    if let Some(bytes) = content {
        session.set_property(node, CONTENT, Value::Binary(bytes.to_vec()))?;
    }

    session.set_property(node, CLASSIFIED_BY, Value::Strings(artifact.classified_by.clone()))?;
    session.set_property(node, PAYLOAD, to_json(&artifact.payload)?)?;
    session.set_property(node, RELATIONSHIPS, to_json(&artifact.relationships)?)?;
    session.set_property(node, COMMENTS, to_json(&artifact.comments)?)?;

    for stale in session.property_names(node)? {
        if let Some(name) = stale.strip_prefix(PROPERTY_PREFIX) {
            if artifact.property(name).is_none() {
                session.remove_property(node, &stale)?;
            }
        }
    }
    for property in &artifact.properties {
        session.set_property(
            node,
            &format!("{}{}", PROPERTY_PREFIX, property.name),
            Value::String(property.value.clone()),
        )?;
    }
    session.set_property(
        node,
        PROPERTY_ORDER,
        Value::Strings(artifact.properties.iter().map(|p| p.name.clone()).collect()),
    )?;
    Ok(())
}

fn write_content_info<S: BackendSession + ?Sized>(
    session: &mut S,
    node: NodeRef,
    info: Option<&ContentInfo>,
) -> RegistryResult<()> {
    match info {
        Some(info) => {
            session.set_property(node, CONTENT_SIZE, Value::Integer(info.size as i64))?;
            session.set_property(node, CONTENT_HASH, Value::String(info.hash.clone()))?;
            set_optional(session, node, CONTENT_ENCODING, info.encoding.clone().map(Value::String))
        }
        None => {
            session.remove_property(node, CONTENT_SIZE)?;
            session.remove_property(node, CONTENT_HASH)?;
            session.remove_property(node, CONTENT_ENCODING)
        }
    }
}

/// Drop the stored content bytes of a node.
pub fn clear_content<S: BackendSession + ?Sized>(session: &mut S, node: NodeRef) -> RegistryResult<()> {
    session.remove_property(node, CONTENT)
}

/// Rewrite only the relationships document of a node.
pub fn write_relationships<S: BackendSession + ?Sized>(
    session: &mut S,
    node: NodeRef,
    relationships: &[Relationship],
) -> RegistryResult<()> {
    session.set_property(node, RELATIONSHIPS, to_json(&relationships)?)
}

/// Rewrite only the comments of a node.
pub fn write_comments<S: BackendSession + ?Sized>(
    session: &mut S,
    node: NodeRef,
    comments: &[Comment],
) -> RegistryResult<()> {
    session.set_property(node, COMMENTS, to_json(&comments)?)
}

/// Model and type of an artifact node, without decoding the rest.
pub fn read_kind<S: BackendSession + ?Sized>(session: &S, node: NodeRef) -> RegistryResult<ArtifactKind> {
    let model = required_string(session, node, MODEL)?;
    let type_name = required_string(session, node, TYPE)?;
    ArtifactKind::lookup(&model, &type_name).ok_or_else(|| {
        TypeError::UnknownType {
            model,
            type_name,
        }
        .into()
    })
}

pub fn read_uuid<S: BackendSession + ?Sized>(session: &S, node: NodeRef) -> RegistryResult<String> {
    required_string(session, node, UUID)
}

/// Decode an artifact node.
pub fn read_artifact<S: BackendSession + ?Sized>(session: &S, node: NodeRef) -> RegistryResult<Artifact> {
    let kind = read_kind(session, node)?;
    let artifact_type = ArtifactType {
        kind,
        extended_type: string(session, node, EXTENDED_TYPE)?,
        extended_derived: session
            .get_property(node, EXTENDED_DERIVED)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        mime_type: required_string(session, node, MIME_TYPE)?,
    };

    let date = |name: &str| -> RegistryResult<_> {
        Ok(session.get_property(node, name)?.and_then(|v| v.as_date()))
    };

    let content = match session.get_property(node, CONTENT_SIZE)? {
        Some(size) => Some(ContentInfo {
            size: size.as_i64().unwrap_or(0).max(0) as u64,
            hash: string(session, node, CONTENT_HASH)?.unwrap_or_default(),
            encoding: string(session, node, CONTENT_ENCODING)?,
        }),
        None => None,
    };

    let order: Vec<String> = session
        .get_property(node, PROPERTY_ORDER)?
        .and_then(|v| v.as_strings().map(<[String]>::to_vec))
        .unwrap_or_default();
    let mut properties = Vec::with_capacity(order.len());
    for name in order {
        if let Some(value) = string(session, node, &format!("{}{}", PROPERTY_PREFIX, name))? {
            properties.push(Property { name, value });
        }
    }

    Ok(Artifact {
        uuid: Some(read_uuid(session, node)?),
        artifact_type,
        name: required_string(session, node, NAME)?,
        description: string(session, node, DESCRIPTION)?,
        version: string(session, node, VERSION)?,
        created_by: string(session, node, CREATED_BY)?,
        created_timestamp: date(CREATED_TIMESTAMP)?,
        last_modified_by: string(session, node, LAST_MODIFIED_BY)?,
        last_modified_timestamp: date(LAST_MODIFIED_TIMESTAMP)?,
        properties,
        relationships: from_json(session, node, RELATIONSHIPS)?.unwrap_or_default(),
        classified_by: session
            .get_property(node, CLASSIFIED_BY)?
            .and_then(|v| v.as_strings().map(<[String]>::to_vec))
            .unwrap_or_default(),
        comments: from_json(session, node, COMMENTS)?.unwrap_or_default(),
        derived: session
            .get_property(node, DERIVED)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        related_document: string(session, node, RELATED_DOCUMENT)?,
        content,
        payload: from_json::<KindPayload, _>(session, node, PAYLOAD)?.unwrap_or_default(),
    })
}

/// Stored content bytes, if any.
pub fn read_content<S: BackendSession + ?Sized>(session: &S, node: NodeRef) -> RegistryResult<Option<Vec<u8>>> {
    Ok(session
        .get_property(node, CONTENT)?
        .and_then(|v| v.as_bytes().map(<[u8]>::to_vec)))
}

// ============================================================================
// ONTOLOGIES, STORED QUERIES, AUDIT ENTRIES
// ============================================================================

pub fn write_ontology<S: BackendSession + ?Sized>(
    session: &mut S,
    node: NodeRef,
    ontology: &Ontology,
) -> RegistryResult<()> {
    let uuid = ontology.uuid.clone().unwrap_or_default();
    session.set_property(node, UUID, Value::String(uuid))?;
    session.set_property(node, BASE, Value::String(ontology.base.clone()))?;
    session.set_property(node, DOCUMENT, to_json(ontology)?)
}

pub fn read_ontology<S: BackendSession + ?Sized>(session: &S, node: NodeRef) -> RegistryResult<Ontology> {
    from_json(session, node, DOCUMENT)?.ok_or_else(|| corrupt(node, "missing ontology document").into())
}

pub fn write_stored_query<S: BackendSession + ?Sized>(
    session: &mut S,
    node: NodeRef,
    query: &StoredQuery,
) -> RegistryResult<()> {
    session.set_property(node, NAME, Value::String(query.name.clone()))?;
    session.set_property(node, DOCUMENT, to_json(query)?)
}

pub fn read_stored_query<S: BackendSession + ?Sized>(session: &S, node: NodeRef) -> RegistryResult<StoredQuery> {
    from_json(session, node, DOCUMENT)?.ok_or_else(|| corrupt(node, "missing stored query document").into())
}

pub fn write_audit_entry<S: BackendSession + ?Sized>(
    session: &mut S,
    node: NodeRef,
    entry: &AuditEntry,
) -> RegistryResult<()> {
    session.set_property(node, UUID, Value::String(entry.uuid.clone()))?;
    session.set_property(node, ARTIFACT_UUID, Value::String(entry.artifact_uuid.clone()))?;
    session.set_property(node, DOCUMENT, to_json(entry)?)
}

/// Artifact the audit node belongs to.
pub fn audit_artifact_uuid<S: BackendSession + ?Sized>(session: &S, node: NodeRef) -> RegistryResult<String> {
    required_string(session, node, ARTIFACT_UUID)
}

pub fn read_audit_entry<S: BackendSession + ?Sized>(session: &S, node: NodeRef) -> RegistryResult<AuditEntry> {
    from_json(session, node, DOCUMENT)?.ok_or_else(|| corrupt(node, "missing audit document").into())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::StorageBackend;
    use cairn_core::{ArtifactKind, Target};
    use chrono::Utc;

    fn sample() -> Artifact {
        let mut a = Artifact::of_kind(ArtifactKind::XsdDocument, "orders.xsd").with_uuid("u-1");
        a.description = Some("orders".into());
        a.created_timestamp = Some(Utc::now());
        a.properties = vec![Property::new("zeta", "1"), Property::new("alpha", "2")];
        a.relationships = vec![Relationship::generic("dependsOn")
            .with_target(Target::new("u-2").with_attribute("weight", "3"))];
        a.classified_by = vec!["http://example.org/world#Asia".into()];
        a.content = Some(ContentInfo {
            size: 4,
            hash: "abcd".into(),
            encoding: Some("UTF-8".into()),
        });
        a.payload = KindPayload::Schema {
            target_namespace: Some("urn:orders".into()),
        };
        a
    }

    #[test]
    fn test_artifact_survives_node_encoding() {
        let backend = MemoryBackend::new();
        let mut s = backend.open_session().unwrap();
        let artifact = sample();
        let node = s.create_node(&artifact_path(&artifact), ARTIFACT_NODE).unwrap();
        write_artifact(&mut s, node, &artifact, Some(b"<x/>")).unwrap();

        let decoded = read_artifact(&s, node).unwrap();
        assert_eq!(decoded, artifact);
        // Custom property order is preserved, not alphabetised.
        assert_eq!(decoded.properties[0].name, "zeta");
        assert_eq!(read_content(&s, node).unwrap().unwrap(), b"<x/>".to_vec());
    }

    #[test]
    fn test_rewrite_drops_removed_properties() {
        let backend = MemoryBackend::new();
        let mut s = backend.open_session().unwrap();
        let mut artifact = sample();
        let node = s.create_node("/artifacts/u-1", ARTIFACT_NODE).unwrap();
        write_artifact(&mut s, node, &artifact, None).unwrap();

        artifact.remove_property("zeta");
        artifact.content = None;
        write_artifact(&mut s, node, &artifact, None).unwrap();
        let names = s.property_names(node).unwrap();
        assert!(!names.contains(&"prop:zeta".to_string()));
        assert!(!names.contains(&"sys:contentSize".to_string()));
        assert_eq!(read_artifact(&s, node).unwrap().properties.len(), 1);
    }

    #[test]
    fn test_derived_artifacts_nest_under_primary() {
        let mut derived = Artifact::of_kind(ArtifactKind::ElementDeclaration, "order").with_uuid("d-1");
        derived.related_document = Some("p-1".into());
        assert_eq!(artifact_path(&derived), "/artifacts/p-1/d-1");
        assert_eq!(artifact_path(&sample()), "/artifacts/u-1");
    }

    #[test]
    fn test_unknown_type_on_read() {
        let backend = MemoryBackend::new();
        let mut s = backend.open_session().unwrap();
        let node = s.create_node("/artifacts/x", ARTIFACT_NODE).unwrap();
        s.set_property(node, "sys:model", Value::String("nope".into())).unwrap();
        s.set_property(node, "sys:type", Value::String("Nope".into())).unwrap();
        assert!(read_kind(&s, node).is_err());
    }
}
