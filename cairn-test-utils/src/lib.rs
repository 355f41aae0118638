//! CAIRN Test Utilities
//!
//! Shared test infrastructure for the CAIRN workspace:
//! - Proptest generators for artifacts, properties and snapshots
//! - Sample documents and a seeded in-memory registry
//! - Assertions over registry error categories

pub use cairn_storage::{MemoryBackend, Registry};

pub use cairn_core::{
    compute_content_hash, Artifact, ArtifactKind, ArtifactSnapshot, ArtifactType, EntityType,
    ErrorKind, Ontology, Property, QueryError, RegistryError, RegistryResult, Relationship,
    StorageError, Target, Timestamp,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for registry model types.

    use super::*;
    use cairn_core::is_reserved_name;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};

    /// An identifier usable as a custom property or relationship name.
    pub fn arb_property_name() -> impl Strategy<Value = String> {
        "[a-z][a-zA-Z0-9]{0,11}".prop_filter("reserved name", |name| !is_reserved_name(name))
    }

    /// Printable property values, including the empty string.
    pub fn arb_property_value() -> impl Strategy<Value = String> {
        "[ -~]{0,16}"
    }

    /// Properties with distinct names.
    pub fn arb_properties() -> impl Strategy<Value = Vec<Property>> {
        prop::collection::btree_map(arb_property_name(), arb_property_value(), 0..6).prop_map(
            |map| {
                map.into_iter()
                    .map(|(name, value)| Property::new(name, value))
                    .collect()
            },
        )
    }

    /// Kinds a caller may create directly.
    pub fn arb_primary_kind() -> impl Strategy<Value = ArtifactKind> {
        prop_oneof![
            Just(ArtifactKind::Document),
            Just(ArtifactKind::XmlDocument),
            Just(ArtifactKind::Organization),
            Just(ArtifactKind::ServiceEndpoint),
            Just(ArtifactKind::Actor),
            Just(ArtifactKind::Policy),
        ]
    }

    /// Timestamps between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// An unsaved primary artifact without content.
    pub fn arb_artifact() -> impl Strategy<Value = Artifact> {
        (
            arb_primary_kind(),
            "[a-z][a-z0-9-]{0,15}",
            proptest::option::of("[ -~]{1,24}"),
            proptest::option::of("[0-9]\\.[0-9]"),
            arb_properties(),
        )
            .prop_map(|(kind, name, description, version, properties)| {
                let mut artifact = Artifact::of_kind(kind, name);
                artifact.description = description;
                artifact.version = version;
                artifact.properties = properties;
                artifact
            })
    }

    /// A snapshot with a few properties and class URIs.
    pub fn arb_snapshot() -> impl Strategy<Value = ArtifactSnapshot> {
        (
            prop::collection::btree_map(arb_property_name(), arb_property_value(), 0..5),
            prop::collection::btree_set("http://example\\.org/[a-z]{1,4}#[A-Z][a-z]{0,5}", 0..4),
        )
            .prop_map(|(properties, classifiers): (BTreeMap<_, _>, BTreeSet<_>)| ArtifactSnapshot {
                properties,
                classifiers,
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Sample documents and pre-populated registries.

    use super::*;

    pub const WORLD_BASE: &str = "http://example.org/world";

    /// Schema in `urn:common` with one simple type.
    pub const COMMON_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:common">
  <xs:simpleType name="Money"><xs:restriction base="xs:decimal"/></xs:simpleType>
</xs:schema>"#;

    /// Schema in `urn:orders` that imports `urn:common`.
    pub const ORDERS_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:orders">
  <xs:import namespace="urn:common" schemaLocation="common.xsd"/>
  <xs:element name="order" type="xs:string"/>
  <xs:element name="invoice" type="xs:string"/>
  <xs:complexType name="OrderType">
    <xs:sequence><xs:element name="line" type="xs:string"/></xs:sequence>
  </xs:complexType>
</xs:schema>"#;

    pub const ORDER_SERVICE_WSDL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wsdl:definitions xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/"
    xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
    xmlns:xs="http://www.w3.org/2001/XMLSchema"
    xmlns:tns="urn:orders:service" targetNamespace="urn:orders:service" name="OrderService">
  <wsdl:types>
    <xs:schema targetNamespace="urn:orders:service">
      <xs:element name="submitOrder" type="xs:string"/>
    </xs:schema>
  </wsdl:types>
  <wsdl:message name="submitOrderRequest">
    <wsdl:part name="body" element="tns:submitOrder"/>
  </wsdl:message>
  <wsdl:portType name="OrderPortType">
    <wsdl:operation name="submit">
      <wsdl:input message="tns:submitOrderRequest"/>
    </wsdl:operation>
  </wsdl:portType>
  <wsdl:binding name="OrderBinding" type="tns:OrderPortType">
    <soap:binding style="document" transport="http://schemas.xmlsoap.org/soap/http"/>
    <wsdl:operation name="submit"><wsdl:input/></wsdl:operation>
  </wsdl:binding>
  <wsdl:service name="OrderService">
    <wsdl:port name="OrderPort" binding="tns:OrderBinding">
      <soap:address location="http://localhost:8080/orders"/>
    </wsdl:port>
  </wsdl:service>
</wsdl:definitions>"#;

    pub const SECURE_POLICY: &str = r#"<wsp:Policy xmlns:wsp="http://www.w3.org/ns/ws-policy" Name="Secure">
  <wsp:ExactlyOne>
    <wsp:All><sp:TransportBinding xmlns:sp="urn:sp"/></wsp:All>
  </wsp:ExactlyOne>
</wsp:Policy>"#;

    /// World > {Asia > {Japan, China}, Europe > {Germany}}.
    pub fn world_ontology() -> Ontology {
        let o = Ontology::new(WORLD_BASE);
        let asia = o
            .create_class("Asia")
            .with_child(o.create_class("Japan"))
            .with_child(o.create_class("China"));
        let europe = o.create_class("Europe").with_child(o.create_class("Germany"));
        o.clone()
            .with_root(o.create_class("World").with_child(asia).with_child(europe))
    }

    pub fn class_uri(id: &str) -> String {
        format!("{}#{}", WORLD_BASE, id)
    }

    pub fn registry() -> Registry<MemoryBackend> {
        Registry::in_memory().with_principal("tester")
    }

    /// A registry holding the world ontology and a small, known catalog:
    ///
    /// | uuid        | type                  | notes                                  |
    /// |-------------|-----------------------|----------------------------------------|
    /// | `readme`    | core/Document         | owner=ops, version 1.0, content "hello"|
    /// | `guide`     | core/Document         | owner=dev, version 2.0, Germany        |
    /// | `acme`      | serviceImplementation/Organization | region=apac, Japan, dependsOn readme   |
    /// | `common`    | xsd/XsdDocument       | urn:common                             |
    /// | `orders`    | xsd/XsdDocument       | urn:orders, imports common             |
    /// | `service`   | wsdl/WsdlDocument     | urn:orders:service                     |
    pub fn seeded_registry() -> RegistryResult<Registry<MemoryBackend>> {
        let registry = registry();
        registry.persist_ontology(world_ontology())?;

        let doc = ArtifactType::of(ArtifactKind::Document);
        let mut readme = Artifact::new(doc.clone(), "readme.txt")
            .with_uuid("readme")
            .with_property("owner", "ops");
        readme.version = Some("1.0".into());
        registry.create(&doc, readme, Some(b"hello"))?;

        let mut guide = Artifact::new(doc.clone(), "guide.txt")
            .with_uuid("guide")
            .with_property("owner", "dev")
            .with_classifier("Germany");
        guide.version = Some("2.0".into());
        guide.description = Some("Operator guide".into());
        registry.create(&doc, guide, Some(b"read me first"))?;

        let org = ArtifactType::of(ArtifactKind::Organization);
        let acme = Artifact::new(org.clone(), "acme")
            .with_uuid("acme")
            .with_property("region", "apac")
            .with_classifier("Japan")
            .with_relationship(Relationship::generic("dependsOn").with_target(Target::new("readme")));
        registry.create(&org, acme, None)?;

        let xsd = ArtifactType::of(ArtifactKind::XsdDocument);
        registry.create(
            &xsd,
            Artifact::new(xsd.clone(), "common.xsd").with_uuid("common"),
            Some(COMMON_XSD.as_bytes()),
        )?;
        registry.create(
            &xsd,
            Artifact::new(xsd.clone(), "orders.xsd").with_uuid("orders"),
            Some(ORDERS_XSD.as_bytes()),
        )?;

        let wsdl = ArtifactType::of(ArtifactKind::WsdlDocument);
        registry.create(
            &wsdl,
            Artifact::new(wsdl.clone(), "orders.wsdl").with_uuid("service"),
            Some(ORDER_SERVICE_WSDL.as_bytes()),
        )?;

        Ok(registry)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over [`RegistryResult`]s.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &RegistryResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &RegistryResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert the error falls in the given category.
    #[track_caller]
    pub fn assert_kind<T: std::fmt::Debug>(result: &RegistryResult<T>, kind: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind(), kind, "Wrong error category for {:?}", e),
            Ok(v) => panic!("Expected {:?} error, got Ok({:?})", kind, v),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &RegistryResult<T>, entity_type: EntityType) {
        match result {
            Err(RegistryError::Storage(StorageError::NotFound { entity_type: et, .. })) => {
                assert_eq!(*et, entity_type, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error for {:?}, got: {:?}", entity_type, other),
        }
    }

    #[track_caller]
    pub fn assert_param_count<T: std::fmt::Debug>(
        result: &RegistryResult<T>,
        expected: usize,
        got: usize,
    ) {
        match result {
            Err(RegistryError::Query(QueryError::ParamCount { expected: e, got: g })) => {
                assert_eq!(*e, expected, "Wrong expected parameter count");
                assert_eq!(*g, got, "Wrong bound parameter count");
            }
            other => panic!("Expected ParamCount({}, {}), got: {:?}", expected, got, other),
        }
    }

    /// Assert the result is a parse error, returning its message.
    #[track_caller]
    pub fn assert_parse_error<T: std::fmt::Debug>(result: &RegistryResult<T>) -> String {
        match result {
            Err(RegistryError::Query(QueryError::Parse { message, .. })) => message.clone(),
            other => panic!("Expected Parse error, got: {:?}", other),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
