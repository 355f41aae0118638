//! XML Schema builder: top-level declarations and schema references.

use crate::xml::{XmlElement, XSD_NS};
use crate::{content_xml, declaration, ArtifactBuilder, BuildOutput, ReferenceLookup};
use cairn_core::{Artifact, ArtifactKind, KindPayload, RegistryResult, ValidationError};

/// Derives element, attribute, simple type and complex type declarations.
#[derive(Debug, Clone, Copy, Default)]
pub struct XsdBuilder;

impl ArtifactBuilder for XsdBuilder {
    fn name(&self) -> &'static str {
        "xsd"
    }

    fn accepts(&self, primary: &Artifact) -> bool {
        primary.kind() == ArtifactKind::XsdDocument
    }

    fn build(&self, primary: &mut Artifact, content: &[u8], out: &mut BuildOutput) -> RegistryResult<()> {
        let root = content_xml(content)?;
        if !root.is(XSD_NS, "schema") {
            return Err(ValidationError::InvalidValue {
                field: "content".to_string(),
                reason: format!("expected an xs:schema root, found {}", root.local_name),
            }
            .into());
        }

        let target_namespace = non_empty(root.attribute("targetNamespace"));
        primary.payload = KindPayload::Schema {
            target_namespace: target_namespace.map(str::to_string),
        };

        derive_declarations(&root, out);
        defer_schema_references(&root, primary.uuid_str(), out);
        Ok(())
    }
}

const DECLARATIONS: [(&str, ArtifactKind); 4] = [
    ("element", ArtifactKind::ElementDeclaration),
    ("attribute", ArtifactKind::AttributeDeclaration),
    ("simpleType", ArtifactKind::SimpleTypeDeclaration),
    ("complexType", ArtifactKind::ComplexTypeDeclaration),
];

/// Push one declaration per named, top-level component of `schema`.
pub(crate) fn derive_declarations(schema: &XmlElement, out: &mut BuildOutput) {
    let namespace = non_empty(schema.attribute("targetNamespace"));
    for (local_name, kind) in DECLARATIONS {
        for node in schema.children_named(XSD_NS, local_name) {
            if let Some(name) = node.attribute("name") {
                out.push(declaration(kind, name, namespace));
            }
        }
    }
}

/// Record import, include and redefine as deferred references from `source_uuid`.
///
/// Imports resolve by namespace. Includes and redefines resolve by the file
/// name of their schema location.
pub(crate) fn defer_schema_references(schema: &XmlElement, source_uuid: &str, out: &mut BuildOutput) {
    for node in schema.children_named(XSD_NS, "import") {
        if let (Some(namespace), Some(_)) = (node.attribute("namespace"), node.attribute("schemaLocation")) {
            out.defer(
                source_uuid,
                "importedXsds",
                ReferenceLookup::Namespace {
                    kinds: vec![ArtifactKind::XsdDocument],
                    namespace: namespace.to_string(),
                },
            );
        }
    }
    for (local_name, relationship) in [("include", "includedXsds"), ("redefine", "redefinedXsds")] {
        for node in schema.children_named(XSD_NS, local_name) {
            if let Some(location) = node.attribute("schemaLocation") {
                out.defer(
                    source_uuid,
                    relationship,
                    ReferenceLookup::FileName {
                        kinds: vec![ArtifactKind::XsdDocument],
                        name: strip_path(location).to_string(),
                    },
                );
            }
        }
    }
}

/// Last path segment of a location, for either separator.
pub(crate) fn strip_path(location: &str) -> &str {
    location
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(location)
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:orders">
  <xs:import namespace="urn:common" schemaLocation="http://example.org/common.xsd"/>
  <xs:include schemaLocation="../shared/order-types.xsd"/>
  <xs:redefine schemaLocation="C:\schemas\legacy.xsd"/>
  <xs:element name="order" type="xs:string"/>
  <xs:element name="invoice" type="xs:string"/>
  <xs:element ref="missingName"/>
  <xs:attribute name="currency" type="xs:string"/>
  <xs:simpleType name="Sku"><xs:restriction base="xs:string"/></xs:simpleType>
  <xs:complexType name="OrderType">
    <xs:sequence><xs:element name="nested" type="xs:string"/></xs:sequence>
  </xs:complexType>
</xs:schema>"#;

    fn run(content: &str) -> (Artifact, BuildOutput) {
        let mut primary = Artifact::of_kind(ArtifactKind::XsdDocument, "orders.xsd").with_uuid("p");
        let mut out = BuildOutput::default();
        XsdBuilder.build(&mut primary, content.as_bytes(), &mut out).unwrap();
        (primary, out)
    }

    #[test]
    fn test_top_level_declarations_only() {
        let (primary, out) = run(ORDERS);
        assert_eq!(primary.target_namespace(), Some("urn:orders"));

        let count = |kind| out.derived.iter().filter(|a| a.kind() == kind).count();
        assert_eq!(count(ArtifactKind::ElementDeclaration), 2);
        assert_eq!(count(ArtifactKind::AttributeDeclaration), 1);
        assert_eq!(count(ArtifactKind::SimpleTypeDeclaration), 1);
        assert_eq!(count(ArtifactKind::ComplexTypeDeclaration), 1);
        assert!(out
            .lookup(&[ArtifactKind::ElementDeclaration], Some("urn:orders"), "nested")
            .is_none());
        assert!(out
            .lookup(&[ArtifactKind::ElementDeclaration], Some("urn:orders"), "order")
            .is_some());
    }

    #[test]
    fn test_schema_references_are_deferred() {
        let (_, out) = run(ORDERS);
        assert_eq!(out.deferred.len(), 3);
        assert_eq!(out.deferred[0].relationship, "importedXsds");
        assert_eq!(
            out.deferred[1].lookup,
            ReferenceLookup::FileName {
                kinds: vec![ArtifactKind::XsdDocument],
                name: "order-types.xsd".to_string()
            }
        );
        assert_eq!(
            out.deferred[2].lookup,
            ReferenceLookup::FileName {
                kinds: vec![ArtifactKind::XsdDocument],
                name: "legacy.xsd".to_string()
            }
        );
        assert!(out.deferred.iter().all(|d| d.source_uuid == "p"));
    }

    #[test]
    fn test_no_target_namespace() {
        let (primary, out) = run(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"><xs:element name="a"/></xs:schema>"#,
        );
        assert_eq!(primary.target_namespace(), None);
        assert_eq!(out.derived[0].namespace(), None);
        assert_eq!(out.derived[0].nc_name(), Some("a"));
    }

    #[test]
    fn test_wrong_root_rejected() {
        let mut primary = Artifact::of_kind(ArtifactKind::XsdDocument, "x.xsd").with_uuid("p");
        let err = XsdBuilder
            .build(&mut primary, b"<notASchema/>", &mut BuildOutput::default())
            .unwrap_err();
        assert!(err.to_string().contains("xs:schema"));
    }
}
