//! WSDL 1.1 builder.
//!
//! Derives messages and parts, port types and operations, bindings with
//! their operations and SOAP extensions, and services with ports. Names are
//! linked inside the document first; anything left over is deferred to the
//! relationship phase as a qualified-name lookup.

use crate::xml::{QName, XmlElement, SOAP12_NS, SOAP_NS, WSDL_NS, XSD_NS};
use crate::xsd::{defer_schema_references, derive_declarations, non_empty};
use crate::{content_xml, declaration, ArtifactBuilder, BuildOutput, ReferenceLookup};
use cairn_core::{Artifact, ArtifactKind, KindPayload, RegistryResult, ValidationError};

const TYPE_KINDS: [ArtifactKind; 3] = [
    ArtifactKind::SimpleTypeDeclaration,
    ArtifactKind::ComplexTypeDeclaration,
    ArtifactKind::XsdType,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct WsdlBuilder;

impl ArtifactBuilder for WsdlBuilder {
    fn name(&self) -> &'static str {
        "wsdl"
    }

    fn accepts(&self, primary: &Artifact) -> bool {
        primary.kind() == ArtifactKind::WsdlDocument
    }

    fn build(&self, primary: &mut Artifact, content: &[u8], out: &mut BuildOutput) -> RegistryResult<()> {
        let root = content_xml(content)?;
        if !root.is(WSDL_NS, "definitions") {
            return Err(ValidationError::InvalidValue {
                field: "content".to_string(),
                reason: format!("expected a wsdl:definitions root, found {}", root.local_name),
            }
            .into());
        }

        let tns = non_empty(root.attribute("targetNamespace"));
        primary.payload = KindPayload::Schema {
            target_namespace: tns.map(str::to_string),
        };
        let primary_uuid = primary.uuid_str().to_string();

        if let Some(types) = root.child_named(WSDL_NS, "types") {
            for schema in types.children_named(XSD_NS, "schema") {
                derive_declarations(schema, out);
                defer_schema_references(schema, &primary_uuid, out);
            }
        }

        for import in root.children_named(WSDL_NS, "import") {
            if let Some(namespace) = import.attribute("namespace") {
                out.defer(
                    &primary_uuid,
                    "importedWsdls",
                    ReferenceLookup::Namespace {
                        kinds: vec![ArtifactKind::WsdlDocument],
                        namespace: namespace.to_string(),
                    },
                );
            }
        }

        let mut doc = WsdlDocumentScan { tns, out };
        doc.messages(&root);
        doc.port_types(&root);
        doc.bindings(&root);
        doc.services(&root);
        Ok(())
    }
}

struct WsdlDocumentScan<'a, 'o> {
    tns: Option<&'a str>,
    out: &'o mut BuildOutput,
}

impl WsdlDocumentScan<'_, '_> {
    fn messages(&mut self, root: &XmlElement) {
        for message_elem in root.children_named(WSDL_NS, "message") {
            let Some(name) = message_elem.attribute("name") else {
                continue;
            };
            let message = self.out.push(declaration(ArtifactKind::Message, name, self.tns));

            for part_elem in message_elem.children_named(WSDL_NS, "part") {
                let Some(part_name) = part_elem.attribute("name") else {
                    continue;
                };
                let part = self.out.push(declaration(ArtifactKind::Part, part_name, self.tns));
                self.out.link(&message, "part", &part);

                if let Some(element) = part_elem.attribute("element") {
                    let qname = part_elem.resolve_qname(element, self.tns);
                    self.reference(&part, "element", &[ArtifactKind::ElementDeclaration], qname);
                } else if let Some(type_name) = part_elem.attribute("type") {
                    let qname = part_elem.resolve_qname(type_name, self.tns);
                    self.reference(&part, "type", &TYPE_KINDS, qname);
                }
            }
        }
    }

    fn port_types(&mut self, root: &XmlElement) {
        for port_type_elem in root.children_named(WSDL_NS, "portType") {
            let Some(name) = port_type_elem.attribute("name") else {
                continue;
            };
            let port_type = self.out.push(declaration(ArtifactKind::PortType, name, self.tns));

            for operation_elem in port_type_elem.children_named(WSDL_NS, "operation") {
                let Some(op_name) = operation_elem.attribute("name") else {
                    continue;
                };
                let operation = self.out.push(declaration(ArtifactKind::Operation, op_name, self.tns));
                self.out.link(&port_type, "operation", &operation);

                if let Some(input) = operation_elem.child_named(WSDL_NS, "input") {
                    let uuid = self.operation_message(input, ArtifactKind::OperationInput);
                    self.out.link(&operation, "input", &uuid);
                }
                if let Some(output) = operation_elem.child_named(WSDL_NS, "output") {
                    let uuid = self.operation_message(output, ArtifactKind::OperationOutput);
                    self.out.link(&operation, "output", &uuid);
                }
                for fault in operation_elem.children_named(WSDL_NS, "fault") {
                    let uuid = self.operation_message(fault, ArtifactKind::Fault);
                    self.out.link(&operation, "fault", &uuid);
                }
            }
        }
    }

    /// Input, output or fault of a port type operation, named after its
    /// message when it has no name of its own.
    fn operation_message(&mut self, elem: &XmlElement, kind: ArtifactKind) -> String {
        let message = elem
            .attribute("message")
            .map(|m| elem.resolve_qname(m, self.tns));
        let name = elem
            .attribute("name")
            .map(str::to_string)
            .or_else(|| message.as_ref().map(|q| q.local_name.clone()))
            .unwrap_or_else(|| elem.local_name.clone());
        let uuid = self.out.push(declaration(kind, &name, self.tns));
        if let Some(qname) = message {
            self.reference(&uuid, "message", &[ArtifactKind::Message], qname);
        }
        uuid
    }

    fn bindings(&mut self, root: &XmlElement) {
        for binding_elem in root.children_named(WSDL_NS, "binding") {
            let Some(name) = binding_elem.attribute("name") else {
                continue;
            };
            let binding = self.out.push(declaration(ArtifactKind::Binding, name, self.tns));

            let port_type = binding_elem.attribute("type").and_then(|t| {
                let qname = binding_elem.resolve_qname(t, self.tns);
                self.reference(&binding, "portType", &[ArtifactKind::PortType], qname)
            });

            for operation_elem in binding_elem.children_named(WSDL_NS, "operation") {
                let Some(op_name) = operation_elem.attribute("name") else {
                    continue;
                };
                let binding_op =
                    self.out
                        .push(declaration(ArtifactKind::BindingOperation, op_name, self.tns));
                self.out.link(&binding, "bindingOperation", &binding_op);

                if let Some(operation) = port_type
                    .as_deref()
                    .and_then(|pt| self.port_type_operation(pt, op_name))
                {
                    self.out.link(&binding_op, "operation", &operation);
                }

                for (child, kind, relationship) in [
                    ("input", ArtifactKind::BindingOperationInput, "input"),
                    ("output", ArtifactKind::BindingOperationOutput, "output"),
                ] {
                    if let Some(elem) = operation_elem.child_named(WSDL_NS, child) {
                        let io_name = elem.attribute("name").unwrap_or(op_name);
                        let uuid = self.out.push(declaration(kind, io_name, self.tns));
                        self.out.link(&binding_op, relationship, &uuid);
                    }
                }
                for fault in operation_elem.children_named(WSDL_NS, "fault") {
                    let fault_name = fault.attribute("name").unwrap_or(op_name);
                    let uuid = self.out.push(declaration(
                        ArtifactKind::BindingOperationFault,
                        fault_name,
                        self.tns,
                    ));
                    self.out.link(&binding_op, "fault", &uuid);
                }
            }

            for soap_binding in soap_children(binding_elem, "binding") {
                let uuid = self.out.push(declaration(
                    ArtifactKind::SoapBinding,
                    &soap_binding.local_name,
                    soap_binding.namespace.as_deref(),
                ));
                self.out.link(&binding, "extension", &uuid);
            }
        }
    }

    fn services(&mut self, root: &XmlElement) {
        for service_elem in root.children_named(WSDL_NS, "service") {
            let name = service_elem.attribute("name").unwrap_or("service");
            let service = self.out.push(declaration(ArtifactKind::WsdlService, name, self.tns));

            for port_elem in service_elem.children_named(WSDL_NS, "port") {
                let Some(port_name) = port_elem.attribute("name") else {
                    continue;
                };
                let port = self.out.push(declaration(ArtifactKind::Port, port_name, self.tns));
                self.out.link(&service, "port", &port);

                if let Some(binding) = port_elem.attribute("binding") {
                    let qname = port_elem.resolve_qname(binding, self.tns);
                    self.reference(&port, "binding", &[ArtifactKind::Binding], qname);
                }

                for address in soap_children(port_elem, "address") {
                    let mut artifact = Artifact::of_kind(ArtifactKind::SoapAddress, &address.local_name);
                    artifact.payload = KindPayload::Endpoint {
                        namespace: address.namespace.clone(),
                        nc_name: address.local_name.clone(),
                        location: address.attribute("location").unwrap_or_default().to_string(),
                    };
                    let uuid = self.out.push(artifact);
                    self.out.link(&port, "extension", &uuid);
                }
            }
        }
    }

    /// Link `source` to an in-document match, or defer the lookup.
    /// Returns the in-document target when there was one.
    fn reference(
        &mut self,
        source: &str,
        relationship: &str,
        kinds: &[ArtifactKind],
        qname: QName,
    ) -> Option<String> {
        match self
            .out
            .lookup(kinds, qname.namespace.as_deref(), &qname.local_name)
        {
            Some(target) => {
                self.out.link(source, relationship, &target);
                Some(target)
            }
            None => {
                self.out.defer(
                    source,
                    relationship,
                    ReferenceLookup::QName {
                        kinds: kinds.to_vec(),
                        namespace: qname.namespace,
                        local_name: qname.local_name,
                    },
                );
                None
            }
        }
    }

    fn port_type_operation(&self, port_type: &str, op_name: &str) -> Option<String> {
        let port_type = self.out.get(port_type)?;
        port_type
            .relationships
            .iter()
            .filter(|r| r.name == "operation")
            .flat_map(|r| r.target_uuids())
            .find(|uuid| {
                self.out
                    .get(uuid)
                    .map(|op| op.nc_name() == Some(op_name))
                    .unwrap_or(false)
            })
            .map(str::to_string)
    }
}

fn soap_children<'a>(elem: &'a XmlElement, local_name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
    elem.children
        .iter()
        .filter(move |c| c.is(SOAP_NS, local_name) || c.is(SOAP12_NS, local_name))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::HasRelationships;

    const ORDER_SERVICE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wsdl:definitions xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/"
    xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
    xmlns:xs="http://www.w3.org/2001/XMLSchema"
    xmlns:tns="urn:orders" targetNamespace="urn:orders" name="OrderService">
  <wsdl:import namespace="urn:common" location="common.wsdl"/>
  <wsdl:types>
    <xs:schema targetNamespace="urn:orders">
      <xs:element name="submitOrder" type="xs:string"/>
    </xs:schema>
  </wsdl:types>
  <wsdl:message name="submitOrderRequest">
    <wsdl:part name="body" element="tns:submitOrder"/>
  </wsdl:message>
  <wsdl:message name="submitOrderResponse">
    <wsdl:part name="result" type="xs:string"/>
  </wsdl:message>
  <wsdl:message name="orderFault"/>
  <wsdl:portType name="OrderPortType">
    <wsdl:operation name="submit">
      <wsdl:input message="tns:submitOrderRequest"/>
      <wsdl:output message="tns:submitOrderResponse"/>
      <wsdl:fault name="rejected" message="tns:orderFault"/>
    </wsdl:operation>
  </wsdl:portType>
  <wsdl:binding name="OrderBinding" type="tns:OrderPortType">
    <soap:binding style="document" transport="http://schemas.xmlsoap.org/soap/http"/>
    <wsdl:operation name="submit">
      <wsdl:input/>
      <wsdl:output/>
      <wsdl:fault name="rejected"/>
    </wsdl:operation>
  </wsdl:binding>
  <wsdl:service name="OrderService">
    <wsdl:port name="OrderPort" binding="tns:OrderBinding">
      <soap:address location="http://localhost:8080/orders"/>
    </wsdl:port>
  </wsdl:service>
</wsdl:definitions>"#;

    fn run() -> (Artifact, BuildOutput) {
        let mut primary = Artifact::of_kind(ArtifactKind::WsdlDocument, "orders.wsdl").with_uuid("p");
        let mut out = BuildOutput::default();
        WsdlBuilder
            .build(&mut primary, ORDER_SERVICE.as_bytes(), &mut out)
            .unwrap();
        (primary, out)
    }

    fn one(out: &BuildOutput, kind: ArtifactKind, name: &str) -> Artifact {
        out.derived
            .iter()
            .find(|a| a.kind() == kind && a.name == name)
            .cloned()
            .unwrap_or_else(|| panic!("no {:?} named {}", kind, name))
    }

    fn targets(a: &Artifact, rel: &str) -> Vec<String> {
        a.relationship(rel)
            .map(|r| r.target_uuids().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_derives_every_component() {
        let (primary, out) = run();
        assert_eq!(primary.target_namespace(), Some("urn:orders"));
        let count = |kind| out.derived.iter().filter(|a| a.kind() == kind).count();
        assert_eq!(count(ArtifactKind::ElementDeclaration), 1);
        assert_eq!(count(ArtifactKind::Message), 3);
        assert_eq!(count(ArtifactKind::Part), 2);
        assert_eq!(count(ArtifactKind::PortType), 1);
        assert_eq!(count(ArtifactKind::Operation), 1);
        assert_eq!(count(ArtifactKind::OperationInput), 1);
        assert_eq!(count(ArtifactKind::OperationOutput), 1);
        assert_eq!(count(ArtifactKind::Fault), 1);
        assert_eq!(count(ArtifactKind::Binding), 1);
        assert_eq!(count(ArtifactKind::BindingOperation), 1);
        assert_eq!(count(ArtifactKind::BindingOperationFault), 1);
        assert_eq!(count(ArtifactKind::SoapBinding), 1);
        assert_eq!(count(ArtifactKind::WsdlService), 1);
        assert_eq!(count(ArtifactKind::Port), 1);
        assert_eq!(count(ArtifactKind::SoapAddress), 1);
    }

    #[test]
    fn test_in_document_links() {
        let (_, out) = run();
        let element = one(&out, ArtifactKind::ElementDeclaration, "submitOrder");
        let body = one(&out, ArtifactKind::Part, "body");
        assert_eq!(targets(&body, "element"), vec![element.uuid.clone().unwrap()]);

        let request = one(&out, ArtifactKind::Message, "submitOrderRequest");
        assert_eq!(targets(&request, "part"), vec![body.uuid.clone().unwrap()]);

        let input = one(&out, ArtifactKind::OperationInput, "submitOrderRequest");
        assert_eq!(targets(&input, "message"), vec![request.uuid.clone().unwrap()]);

        let operation = one(&out, ArtifactKind::Operation, "submit");
        let port_type = one(&out, ArtifactKind::PortType, "OrderPortType");
        assert_eq!(targets(&port_type, "operation"), vec![operation.uuid.clone().unwrap()]);

        let binding = one(&out, ArtifactKind::Binding, "OrderBinding");
        assert_eq!(targets(&binding, "portType"), vec![port_type.uuid.clone().unwrap()]);
        assert_eq!(targets(&binding, "extension").len(), 1);

        let binding_op = one(&out, ArtifactKind::BindingOperation, "submit");
        assert_eq!(targets(&binding_op, "operation"), vec![operation.uuid.clone().unwrap()]);

        let port = one(&out, ArtifactKind::Port, "OrderPort");
        assert_eq!(targets(&port, "binding"), vec![binding.uuid.clone().unwrap()]);
        let address = one(&out, ArtifactKind::SoapAddress, "address");
        assert_eq!(address.soap_location(), Some("http://localhost:8080/orders"));
    }

    #[test]
    fn test_unresolved_names_are_deferred() {
        let (_, out) = run();
        // xs:string is not declared here; the WSDL import is always deferred.
        assert!(out.deferred.iter().any(|d| d.relationship == "type"
            && matches!(&d.lookup, ReferenceLookup::QName { local_name, .. } if local_name == "string")));
        assert!(out.deferred.iter().any(|d| d.relationship == "importedWsdls" && d.source_uuid == "p"));
    }

    #[test]
    fn test_non_wsdl_root_rejected() {
        let mut primary = Artifact::of_kind(ArtifactKind::WsdlDocument, "x.wsdl").with_uuid("p");
        assert!(WsdlBuilder
            .build(&mut primary, b"<definitions/>", &mut BuildOutput::default())
            .is_err());
    }
}
