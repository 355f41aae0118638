//! WS-Policy builder: one expression per top-level policy alternative.

use crate::xml::{XmlElement, POLICY_2004_NS, POLICY_NS};
use crate::{content_xml, declaration, ArtifactBuilder, BuildOutput};
use cairn_core::{Artifact, ArtifactKind, RegistryResult, ValidationError};

#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyBuilder;

impl ArtifactBuilder for PolicyBuilder {
    fn name(&self) -> &'static str {
        "policy"
    }

    fn accepts(&self, primary: &Artifact) -> bool {
        primary.kind() == ArtifactKind::PolicyDocument
    }

    fn build(&self, primary: &mut Artifact, content: &[u8], out: &mut BuildOutput) -> RegistryResult<()> {
        let root = content_xml(content)?;
        let Some(ns) = policy_namespace(&root) else {
            return Err(ValidationError::InvalidValue {
                field: "content".to_string(),
                reason: format!("expected a wsp:Policy root, found {}", root.local_name),
            }
            .into());
        };

        let base_name = root
            .attribute("Name")
            .or_else(|| {
                root.attributes
                    .iter()
                    .find(|(n, _)| n == "Id" || n.ends_with(":Id"))
                    .map(|(_, v)| v.as_str())
            })
            .unwrap_or(&primary.name)
            .to_string();

        let alternatives: Vec<&XmlElement> = root
            .children_named(ns, "ExactlyOne")
            .flat_map(|one| one.children_named(ns, "All"))
            .collect();
        let count = alternatives.len().max(1);

        for idx in 0..count {
            let name = format!("{}-{}", base_name, idx + 1);
            out.push(declaration(ArtifactKind::PolicyExpression, &name, Some(ns)));
        }
        Ok(())
    }
}

fn policy_namespace(root: &XmlElement) -> Option<&'static str> {
    [POLICY_NS, POLICY_2004_NS]
        .into_iter()
        .find(|ns| root.is(ns, "Policy"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(content: &str) -> BuildOutput {
        let mut primary = Artifact::of_kind(ArtifactKind::PolicyDocument, "security.policy").with_uuid("p");
        let mut out = BuildOutput::default();
        PolicyBuilder.build(&mut primary, content.as_bytes(), &mut out).unwrap();
        out
    }

    #[test]
    fn test_one_expression_per_alternative() {
        let out = run(
            r#"<wsp:Policy xmlns:wsp="http://www.w3.org/ns/ws-policy" Name="Secure">
                 <wsp:ExactlyOne>
                   <wsp:All><sp:TransportBinding xmlns:sp="urn:sp"/></wsp:All>
                   <wsp:All><sp:AsymmetricBinding xmlns:sp="urn:sp"/></wsp:All>
                 </wsp:ExactlyOne>
               </wsp:Policy>"#,
        );
        let names: Vec<_> = out.derived.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Secure-1", "Secure-2"]);
        assert!(out
            .derived
            .iter()
            .all(|a| a.kind() == ArtifactKind::PolicyExpression));
    }

    #[test]
    fn test_flat_policy_is_one_expression() {
        let out = run(
            r#"<wsp:Policy xmlns:wsp="http://schemas.xmlsoap.org/ws/2004/09/policy"
                 xmlns:wsu="urn:wsu" wsu:Id="Flat"><x/></wsp:Policy>"#,
        );
        assert_eq!(out.derived.len(), 1);
        assert_eq!(out.derived[0].name, "Flat-1");
    }

    #[test]
    fn test_falls_back_to_document_name() {
        let out = run(r#"<Policy xmlns="http://www.w3.org/ns/ws-policy"/>"#);
        assert_eq!(out.derived[0].name, "security.policy-1");
    }

    #[test]
    fn test_non_policy_root_rejected() {
        let mut primary = Artifact::of_kind(ArtifactKind::PolicyDocument, "p").with_uuid("p");
        assert!(PolicyBuilder
            .build(&mut primary, b"<Policy/>", &mut BuildOutput::default())
            .is_err());
    }
}
