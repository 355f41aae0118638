//! Artifact verification: model checks, reserved and duplicate names, and
//! derived-relationship immutability.

use crate::{Artifact, ArtifactKind, ArtifactType, RegistryResult, RelationshipKind, ValidationError};
use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashSet};

/// Built-in field names of the artifact model, lowercased.
static RESERVED_NAMES: Lazy<HashSet<String>> = Lazy::new(|| {
    let mut names: HashSet<String> = [
        "uuid",
        "name",
        "description",
        "version",
        "createdby",
        "createdtimestamp",
        "lastmodifiedby",
        "lastmodifiedtimestamp",
        "contenttype",
        "contentsize",
        "contenthash",
        "contentencoding",
        "derived",
        "relateddocument",
        "classifiedby",
        "property",
        "relationship",
        "relationshiptype",
        "target",
        "targetnamespace",
        "namespace",
        "ncname",
        "soaplocation",
        "extendedtype",
        "artifacttype",
        "otherattributes",
        "comment",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for kind in ArtifactKind::ALL {
        for rel in kind.derived_relationships() {
            names.insert(rel.to_ascii_lowercase());
        }
    }
    names
});

/// Whether `name` collides (case-insensitively) with a built-in field.
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name.to_ascii_lowercase())
}

/// The artifact must be of the type the caller addressed.
pub fn verify_model(expected: &ArtifactType, artifact: &Artifact) -> RegistryResult<()> {
    if !expected.same_type(&artifact.artifact_type) {
        return Err(ValidationError::WrongModel {
            expected: format!("{}/{}", expected.model(), expected.type_name()),
            got: format!(
                "{}/{}",
                artifact.artifact_type.model(),
                artifact.artifact_type.type_name()
            ),
        }
        .into());
    }
    Ok(())
}

/// Custom property and generic relationship names must not be reserved and
/// must not collide with each other.
pub fn verify_names(artifact: &Artifact) -> RegistryResult<()> {
    let mut property_names = HashSet::new();
    for property in &artifact.properties {
        if property.name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "property.name".to_string(),
            }
            .into());
        }
        if is_reserved_name(&property.name) {
            return Err(ValidationError::ReservedName {
                name: property.name.clone(),
            }
            .into());
        }
        if !property_names.insert(property.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                name: property.name.clone(),
            }
            .into());
        }
    }

    let table = artifact.kind().derived_relationships();
    let mut relationship_names = HashSet::new();
    for relationship in &artifact.relationships {
        // Derived relationships are checked by verify_derived_relationships.
        if relationship.kind == RelationshipKind::Derived
            || table.contains(&relationship.name.as_str())
        {
            continue;
        }
        if is_reserved_name(&relationship.name) {
            return Err(ValidationError::ReservedName {
                name: relationship.name.clone(),
            }
            .into());
        }
        if property_names.contains(relationship.name.as_str())
            || !relationship_names.insert(relationship.name.as_str())
        {
            return Err(ValidationError::DuplicateName {
                name: relationship.name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// Derived relationships may not be created by callers, and must come back
/// unchanged on a metadata update.
///
/// `previous` is the stored version, or `None` on first persist.
pub fn verify_derived_relationships(
    artifact: &Artifact,
    previous: Option<&Artifact>,
) -> RegistryResult<()> {
    let table = artifact.kind().derived_relationships();
    let is_derived = |name: &str, kind: RelationshipKind| {
        kind == RelationshipKind::Derived || table.contains(&name)
    };

    match previous {
        None => {
            for rel in &artifact.relationships {
                if is_derived(&rel.name, rel.kind) && !rel.targets.is_empty() {
                    return Err(ValidationError::DerivedRelationshipMutation {
                        relationship: rel.name.clone(),
                    }
                    .into());
                }
            }
        }
        Some(previous) => {
            let mut names: BTreeSet<&str> = BTreeSet::new();
            for rel in artifact.relationships.iter().chain(previous.relationships.iter()) {
                if is_derived(&rel.name, rel.kind) {
                    names.insert(rel.name.as_str());
                }
            }
            for name in names {
                if derived_targets(artifact, name) != derived_targets(previous, name) {
                    return Err(ValidationError::DerivedRelationshipMutation {
                        relationship: name.to_string(),
                    }
                    .into());
                }
            }
        }
    }
    Ok(())
}

fn derived_targets<'a>(artifact: &'a Artifact, name: &str) -> BTreeSet<&'a str> {
    artifact
        .relationships
        .iter()
        .filter(|r| r.name == name)
        .flat_map(|r| r.target_uuids())
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, Relationship, Target};

    fn doc() -> Artifact {
        Artifact::of_kind(ArtifactKind::Document, "doc")
    }

    #[test]
    fn test_reserved_name_case_insensitive() {
        let err = verify_names(&doc().with_property("UUID", "x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(matches!(
            err,
            crate::RegistryError::Validation(ValidationError::ReservedName { .. })
        ));
        assert!(is_reserved_name("CreatedTimestamp"));
        assert!(is_reserved_name("importedXsds"));
        assert!(!is_reserved_name("owner"));
    }

    #[test]
    fn test_property_relationship_collision() {
        let a = doc()
            .with_property("foo", "1")
            .with_relationship(Relationship::generic("foo"));
        let err = verify_names(&a).unwrap_err();
        assert!(matches!(
            err,
            crate::RegistryError::Validation(ValidationError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_duplicate_property() {
        let mut a = doc();
        a.properties.push(crate::Property::new("p", "1"));
        a.properties.push(crate::Property::new("p", "2"));
        assert!(verify_names(&a).is_err());
    }

    #[test]
    fn test_valid_names_pass() {
        let a = doc()
            .with_property("owner", "ops")
            .with_relationship(Relationship::generic("dependsOn"));
        assert!(verify_names(&a).is_ok());
    }

    #[test]
    fn test_wrong_model() {
        let expected = ArtifactType::of(ArtifactKind::XsdDocument);
        let err = verify_model(&expected, &doc()).unwrap_err();
        assert!(err.to_string().contains("xsd/XsdDocument"));
        assert!(verify_model(&ArtifactType::of(ArtifactKind::Document), &doc()).is_ok());
    }

    #[test]
    fn test_derived_relationship_on_create_rejected() {
        let a = Artifact::of_kind(ArtifactKind::XsdDocument, "s.xsd").with_relationship(
            Relationship::generic("importedXsds").with_target(Target::new("other")),
        );
        let err = verify_derived_relationships(&a, None).unwrap_err();
        assert!(err.to_string().contains("importedXsds"));
    }

    #[test]
    fn test_derived_relationship_unchanged_on_update() {
        let mut stored = Artifact::of_kind(ArtifactKind::XsdDocument, "s.xsd");
        stored.add_derived_target("importedXsds", "x1");

        let same = stored.clone();
        assert!(verify_derived_relationships(&same, Some(&stored)).is_ok());

        let mut changed = stored.clone();
        changed.add_derived_target("importedXsds", "x2");
        assert!(verify_derived_relationships(&changed, Some(&stored)).is_err());

        let mut dropped = stored.clone();
        dropped.relationships.clear();
        assert!(verify_derived_relationships(&dropped, Some(&stored)).is_err());
    }
}
