//! Artifact typing: the closed kind table and the type registry.

use crate::{Artifact, RegistryResult, TypeError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// MIME type used for opaque binary documents.
pub const BINARY_MIME_TYPE: &str = "application/octet-stream";

/// MIME type used for every XML-backed kind.
pub const XML_MIME_TYPE: &str = "application/xml";

// ============================================================================
// ARTIFACT KINDS
// ============================================================================

/// Every artifact kind the registry knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    // core
    Document,
    XmlDocument,
    // xsd
    XsdDocument,
    AttributeDeclaration,
    ElementDeclaration,
    SimpleTypeDeclaration,
    ComplexTypeDeclaration,
    XsdType,
    // policy
    PolicyDocument,
    PolicyExpression,
    PolicyAttachment,
    // soapWsdl
    SoapAddress,
    SoapBinding,
    // wsdl
    WsdlDocument,
    WsdlService,
    Port,
    WsdlExtension,
    Part,
    Message,
    Fault,
    PortType,
    Operation,
    OperationInput,
    OperationOutput,
    Binding,
    BindingOperation,
    BindingOperationInput,
    BindingOperationOutput,
    BindingOperationFault,
    // serviceImplementation
    ServiceEndpoint,
    ServiceInstance,
    ServiceOperation,
    Organization,
    // ext
    ExtendedArtifactType,
    ExtendedDocument,
    // soa
    Actor,
    Choreography,
    ChoreographyProcess,
    Collaboration,
    CollaborationProcess,
    Composition,
    Effect,
    Element,
    Event,
    InformationType,
    Orchestration,
    OrchestrationProcess,
    Policy,
    PolicySubject,
    Process,
    Service,
    ServiceContract,
    ServiceComposition,
    ServiceInterface,
    System,
    Task,
}

/// Static facts about one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDescriptor {
    pub model: &'static str,
    pub type_name: &'static str,
    pub label: &'static str,
    pub derived: bool,
    pub document: bool,
}

const fn desc(
    model: &'static str,
    type_name: &'static str,
    label: &'static str,
    derived: bool,
    document: bool,
) -> KindDescriptor {
    KindDescriptor {
        model,
        type_name,
        label,
        derived,
        document,
    }
}

impl ArtifactKind {
    /// All kinds in table order.
    pub const ALL: [ArtifactKind; 56] = [
        ArtifactKind::Document,
        ArtifactKind::XmlDocument,
        ArtifactKind::XsdDocument,
        ArtifactKind::AttributeDeclaration,
        ArtifactKind::ElementDeclaration,
        ArtifactKind::SimpleTypeDeclaration,
        ArtifactKind::ComplexTypeDeclaration,
        ArtifactKind::XsdType,
        ArtifactKind::PolicyDocument,
        ArtifactKind::PolicyExpression,
        ArtifactKind::PolicyAttachment,
        ArtifactKind::SoapAddress,
        ArtifactKind::SoapBinding,
        ArtifactKind::WsdlDocument,
        ArtifactKind::WsdlService,
        ArtifactKind::Port,
        ArtifactKind::WsdlExtension,
        ArtifactKind::Part,
        ArtifactKind::Message,
        ArtifactKind::Fault,
        ArtifactKind::PortType,
        ArtifactKind::Operation,
        ArtifactKind::OperationInput,
        ArtifactKind::OperationOutput,
        ArtifactKind::Binding,
        ArtifactKind::BindingOperation,
        ArtifactKind::BindingOperationInput,
        ArtifactKind::BindingOperationOutput,
        ArtifactKind::BindingOperationFault,
        ArtifactKind::ServiceEndpoint,
        ArtifactKind::ServiceInstance,
        ArtifactKind::ServiceOperation,
        ArtifactKind::Organization,
        ArtifactKind::ExtendedArtifactType,
        ArtifactKind::ExtendedDocument,
        ArtifactKind::Actor,
        ArtifactKind::Choreography,
        ArtifactKind::ChoreographyProcess,
        ArtifactKind::Collaboration,
        ArtifactKind::CollaborationProcess,
        ArtifactKind::Composition,
        ArtifactKind::Effect,
        ArtifactKind::Element,
        ArtifactKind::Event,
        ArtifactKind::InformationType,
        ArtifactKind::Orchestration,
        ArtifactKind::OrchestrationProcess,
        ArtifactKind::Policy,
        ArtifactKind::PolicySubject,
        ArtifactKind::Process,
        ArtifactKind::Service,
        ArtifactKind::ServiceContract,
        ArtifactKind::ServiceComposition,
        ArtifactKind::ServiceInterface,
        ArtifactKind::System,
        ArtifactKind::Task,
    ];

    /// Static descriptor for this kind.
    pub const fn descriptor(self) -> KindDescriptor {
        use ArtifactKind::*;
        match self {
            Document => desc("core", "Document", "Document", false, true),
            XmlDocument => desc("core", "XmlDocument", "XML Document", false, true),

            XsdDocument => desc("xsd", "XsdDocument", "XML Schema", false, true),
            AttributeDeclaration => desc("xsd", "AttributeDeclaration", "XML Schema Attribute Declaration", true, false),
            ElementDeclaration => desc("xsd", "ElementDeclaration", "XML Schema Element Declaration", true, false),
            SimpleTypeDeclaration => desc("xsd", "SimpleTypeDeclaration", "XML Schema Simple Type Declaration", true, false),
            ComplexTypeDeclaration => desc("xsd", "ComplexTypeDeclaration", "XML Schema Complex Type Declaration", true, false),
            XsdType => desc("xsd", "XsdType", "XML Schema Type Declaration", true, false),

            PolicyDocument => desc("policy", "PolicyDocument", "Policy", false, true),
            PolicyExpression => desc("policy", "PolicyExpression", "Policy Expression", true, false),
            PolicyAttachment => desc("policy", "PolicyAttachment", "Policy Attachment", true, false),

            SoapAddress => desc("soapWsdl", "SoapAddress", "SOAP Address", true, false),
            SoapBinding => desc("soapWsdl", "SoapBinding", "SOAP Binding", true, false),

            WsdlDocument => desc("wsdl", "WsdlDocument", "WSDL", false, true),
            WsdlService => desc("wsdl", "WsdlService", "WSDL Service", true, false),
            Port => desc("wsdl", "Port", "WSDL Port", true, false),
            WsdlExtension => desc("wsdl", "WsdlExtension", "WSDL Extension", true, false),
            Part => desc("wsdl", "Part", "WSDL Part", true, false),
            Message => desc("wsdl", "Message", "WSDL Message", true, false),
            Fault => desc("wsdl", "Fault", "WSDL Fault", true, false),
            PortType => desc("wsdl", "PortType", "WSDL Port Type", true, false),
            Operation => desc("wsdl", "Operation", "WSDL Operation", true, false),
            OperationInput => desc("wsdl", "OperationInput", "WSDL Operation Input", true, false),
            OperationOutput => desc("wsdl", "OperationOutput", "WSDL Operation Output", true, false),
            Binding => desc("wsdl", "Binding", "WSDL Binding", true, false),
            BindingOperation => desc("wsdl", "BindingOperation", "WSDL Binding Operation", true, false),
            BindingOperationInput => desc("wsdl", "BindingOperationInput", "WSDL Binding Operation Input", true, false),
            BindingOperationOutput => desc("wsdl", "BindingOperationOutput", "WSDL Binding Operation Output", true, false),
            BindingOperationFault => desc("wsdl", "BindingOperationFault", "WSDL Binding Operation Fault", true, false),

            ServiceEndpoint => desc("serviceImplementation", "ServiceEndpoint", "Service Endpoint", false, false),
            ServiceInstance => desc("serviceImplementation", "ServiceInstance", "Service Instance", false, false),
            ServiceOperation => desc("serviceImplementation", "ServiceOperation", "Service Operation", false, false),
            Organization => desc("serviceImplementation", "Organization", "SOA Organization", false, false),

            ExtendedArtifactType => desc("ext", "ExtendedArtifactType", "Extended Artifact Type", false, false),
            ExtendedDocument => desc("ext", "ExtendedDocument", "Extended Document", false, true),

            Actor => desc("soa", "Actor", "SOA Actor", false, false),
            Choreography => desc("soa", "Choreography", "SOA Choreography", false, false),
            ChoreographyProcess => desc("soa", "ChoreographyProcess", "SOA Choreography Process", false, false),
            Collaboration => desc("soa", "Collaboration", "SOA Collaboration", false, false),
            CollaborationProcess => desc("soa", "CollaborationProcess", "SOA Collaboration Process", false, false),
            Composition => desc("soa", "Composition", "SOA Composition", false, false),
            Effect => desc("soa", "Effect", "SOA Effect", false, false),
            Element => desc("soa", "Element", "SOA Element", false, false),
            Event => desc("soa", "Event", "SOA Event", false, false),
            InformationType => desc("soa", "InformationType", "SOA Information Type", false, false),
            Orchestration => desc("soa", "Orchestration", "SOA Orchestration", false, false),
            OrchestrationProcess => desc("soa", "OrchestrationProcess", "SOA Orchestration Process", false, false),
            Policy => desc("soa", "Policy", "SOA Policy", false, false),
            PolicySubject => desc("soa", "PolicySubject", "SOA Policy Subject", false, false),
            Process => desc("soa", "Process", "SOA Process", false, false),
            Service => desc("soa", "Service", "SOA Service", false, false),
            ServiceContract => desc("soa", "ServiceContract", "SOA Service Contract", false, false),
            ServiceComposition => desc("soa", "ServiceComposition", "SOA Service Composition", false, false),
            ServiceInterface => desc("soa", "ServiceInterface", "SOA Service Interface", false, false),
            System => desc("soa", "System", "SOA System", false, false),
            Task => desc("soa", "Task", "SOA Task", false, false),
        }
    }

    pub const fn model(self) -> &'static str {
        self.descriptor().model
    }

    pub const fn type_name(self) -> &'static str {
        self.descriptor().type_name
    }

    /// Whether this kind belongs to the extension model.
    pub const fn is_extended(self) -> bool {
        matches!(
            self,
            ArtifactKind::ExtendedArtifactType | ArtifactKind::ExtendedDocument
        )
    }

    /// Relationship names that only the derivation pipeline may populate.
    pub const fn derived_relationships(self) -> &'static [&'static str] {
        use ArtifactKind::*;
        match self {
            XsdDocument => &["importedXsds", "includedXsds", "redefinedXsds"],
            WsdlDocument => &["importedXsds", "includedXsds", "redefinedXsds", "importedWsdls"],
            Message => &["part"],
            Part => &["element", "type"],
            PortType => &["operation"],
            Operation => &["input", "output", "fault"],
            OperationInput | OperationOutput | Fault => &["message"],
            Binding => &["bindingOperation", "portType", "extension"],
            BindingOperation => &["input", "output", "fault", "operation"],
            WsdlService => &["port"],
            Port => &["binding", "extension"],
            _ => &[],
        }
    }

    /// Look up a built-in kind by model and type name (case-sensitive type, as stored).
    pub fn lookup(model: &str, type_name: &str) -> Option<ArtifactKind> {
        ArtifactKind::ALL
            .iter()
            .copied()
            .find(|k| k.type_name() == type_name && k.model() == model)
    }

    /// Look up a built-in kind by type name alone.
    pub fn by_type_name(type_name: &str) -> Option<ArtifactKind> {
        ArtifactKind::ALL
            .iter()
            .copied()
            .find(|k| k.type_name() == type_name)
    }
}

// ============================================================================
// ARTIFACT TYPE
// ============================================================================

/// Resolved type descriptor for an artifact instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactType {
    pub kind: ArtifactKind,
    /// Name of the extended type; only set for the `ext` model.
    pub extended_type: Option<String>,
    /// Extended types can be flagged as derived by the builder that produced them.
    pub extended_derived: bool,
    pub mime_type: String,
}

impl ArtifactType {
    /// Descriptor for a built-in kind with its default MIME type.
    pub fn of(kind: ArtifactKind) -> Self {
        Self {
            kind,
            extended_type: None,
            extended_derived: false,
            mime_type: default_mime_type(kind).to_string(),
        }
    }

    /// Descriptor for an extended type. Names must be ASCII alphanumeric.
    pub fn extended(name: &str, document: bool) -> RegistryResult<Self> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TypeError::InvalidExtendedType {
                name: name.to_string(),
            }
            .into());
        }
        let kind = if document || name == "ExtendedDocument" {
            ArtifactKind::ExtendedDocument
        } else {
            ArtifactKind::ExtendedArtifactType
        };
        Ok(Self {
            kind,
            extended_type: Some(name.to_string()),
            extended_derived: false,
            mime_type: default_mime_type(kind).to_string(),
        })
    }

    /// Override the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn model(&self) -> &'static str {
        self.kind.model()
    }

    /// Type name; the extended name for `ext` artifacts.
    pub fn type_name(&self) -> &str {
        match &self.extended_type {
            Some(name) => name,
            None => self.kind.type_name(),
        }
    }

    pub fn label(&self) -> &str {
        match &self.extended_type {
            Some(name) => name,
            None => self.kind.descriptor().label,
        }
    }

    pub fn is_derived(&self) -> bool {
        self.kind.descriptor().derived || self.extended_derived
    }

    /// Document kinds carry content, unless derived.
    pub fn is_document(&self) -> bool {
        !self.is_derived() && self.kind.descriptor().document
    }

    pub fn is_extended(&self) -> bool {
        self.kind.is_extended()
    }

    /// Same model and type name, ignoring MIME type.
    pub fn same_type(&self, other: &ArtifactType) -> bool {
        self.kind == other.kind && self.type_name() == other.type_name()
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/s-ramp/{}/{} ({})",
            self.model(),
            self.type_name(),
            self.mime_type
        )
    }
}

fn default_mime_type(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Document | ArtifactKind::ExtendedDocument => BINARY_MIME_TYPE,
        _ => XML_MIME_TYPE,
    }
}

// ============================================================================
// TYPE REGISTRY
// ============================================================================

/// Immutable type table.
///
/// Built once at startup and handed to whatever needs it; there is no global
/// instance. Extended types are registered against file extensions while
/// building.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    extensions: HashMap<String, ArtifactType>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::new()
    }

    /// Classify a model/type hint pair.
    ///
    /// The `ext` model always yields an extended type; `document` picks
    /// between `ExtendedDocument` and `ExtendedArtifactType`.
    pub fn classify(
        &self,
        model: &str,
        type_name: &str,
        document: bool,
    ) -> RegistryResult<ArtifactType> {
        if model == "ext" {
            return ArtifactType::extended(type_name, document);
        }
        ArtifactKind::lookup(model, type_name)
            .map(ArtifactType::of)
            .ok_or_else(|| {
                TypeError::UnknownType {
                    model: model.to_string(),
                    type_name: type_name.to_string(),
                }
                .into()
            })
    }

    /// Classify by file extension, falling back to a binary `Document`.
    pub fn from_extension(&self, extension: &str) -> ArtifactType {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        if let Some(registered) = self.extensions.get(&ext) {
            return registered.clone();
        }
        match ext.as_str() {
            "xsd" => ArtifactType::of(ArtifactKind::XsdDocument),
            "wsdl" => ArtifactType::of(ArtifactKind::WsdlDocument),
            "xml" => ArtifactType::of(ArtifactKind::XmlDocument),
            "policy" | "wspolicy" => ArtifactType::of(ArtifactKind::PolicyDocument),
            _ => ArtifactType::of(ArtifactKind::Document),
        }
    }

    /// Classify by file name, using its last extension.
    pub fn from_file_name(&self, file_name: &str) -> ArtifactType {
        match file_name.rsplit_once('.') {
            Some((_, ext)) => self.from_extension(ext),
            None => ArtifactType::of(ArtifactKind::Document),
        }
    }

    /// The type an instance declares about itself.
    pub fn from_instance(&self, artifact: &Artifact) -> ArtifactType {
        artifact.artifact_type.clone()
    }

    pub fn extension_count(&self) -> usize {
        self.extensions.len()
    }
}

/// Builder for [`TypeRegistry`].
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    extensions: HashMap<String, ArtifactType>,
}

impl TypeRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a file extension onto an extended document type.
    pub fn extended_extension(
        mut self,
        extension: &str,
        type_name: &str,
        mime_type: &str,
    ) -> RegistryResult<Self> {
        let artifact_type = ArtifactType::extended(type_name, true)?.with_mime_type(mime_type);
        self.extensions.insert(
            extension.trim_start_matches('.').to_ascii_lowercase(),
            artifact_type,
        );
        Ok(self)
    }

    pub fn build(self) -> TypeRegistry {
        TypeRegistry {
            extensions: self.extensions,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_classify_builtin() {
        let registry = TypeRegistry::default();
        let t = registry.classify("xsd", "XsdDocument", false).unwrap();
        assert_eq!(t.kind, ArtifactKind::XsdDocument);
        assert!(t.is_document());
        assert!(!t.is_derived());
        assert_eq!(t.mime_type, XML_MIME_TYPE);
    }

    #[test]
    fn test_classify_unknown_type() {
        let registry = TypeRegistry::default();
        let err = registry.classify("xsd", "Nope", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownType);
        // Type exists, but under a different model.
        let err = registry.classify("core", "XsdDocument", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownType);
    }

    #[test]
    fn test_classify_extended() {
        let registry = TypeRegistry::default();
        let t = registry.classify("ext", "SwitchYardXml", true).unwrap();
        assert_eq!(t.kind, ArtifactKind::ExtendedDocument);
        assert_eq!(t.type_name(), "SwitchYardXml");
        assert_eq!(t.mime_type, BINARY_MIME_TYPE);

        let t = registry.classify("ext", "Widget", false).unwrap();
        assert_eq!(t.kind, ArtifactKind::ExtendedArtifactType);
        assert!(!t.is_document());

        let err = registry.classify("ext", "bad-name", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_derived_kinds_are_not_documents() {
        let t = ArtifactType::of(ArtifactKind::ElementDeclaration);
        assert!(t.is_derived());
        assert!(!t.is_document());
    }

    #[test]
    fn test_from_extension_fallback() {
        let registry = TypeRegistry::default();
        assert_eq!(registry.from_extension("xsd").kind, ArtifactKind::XsdDocument);
        assert_eq!(registry.from_extension(".WSDL").kind, ArtifactKind::WsdlDocument);
        let fallback = registry.from_extension("bin");
        assert_eq!(fallback.kind, ArtifactKind::Document);
        assert_eq!(fallback.mime_type, BINARY_MIME_TYPE);
    }

    #[test]
    fn test_registered_extension_wins() {
        let registry = TypeRegistry::builder()
            .extended_extension("vdb", "TeiidVdb", "application/zip")
            .unwrap()
            .build();
        let t = registry.from_file_name("parts.vdb");
        assert_eq!(t.type_name(), "TeiidVdb");
        assert_eq!(t.mime_type, "application/zip");
        assert_eq!(registry.extension_count(), 1);
    }

    #[test]
    fn test_display_format() {
        let t = ArtifactType::of(ArtifactKind::Document);
        assert_eq!(
            t.to_string(),
            "/s-ramp/core/Document (application/octet-stream)"
        );
    }

    #[test]
    fn test_kind_table_is_consistent() {
        for kind in ArtifactKind::ALL {
            assert_eq!(ArtifactKind::lookup(kind.model(), kind.type_name()), Some(kind));
            // Only document kinds may declare derived relationships on the primary side.
            let d = kind.descriptor();
            assert!(!(d.derived && d.document));
        }
    }
}
