//! Well-formedness check and encoding stamp for XML-bearing documents.
//!
//! Content is read as UTF-8 only. A declaration naming any other encoding
//! is rejected rather than stamped onto the artifact.

use crate::xml::declared_encoding;
use crate::{content_text, content_xml, ArtifactBuilder, BuildOutput};
use cairn_core::{Artifact, ArtifactKind, RegistryResult, ValidationError};

const DEFAULT_ENCODING: &str = "UTF-8";

/// Declared names whose bytes UTF-8 decoding reads correctly.
const READABLE_ENCODINGS: &[&str] = &["UTF-8", "UTF8", "US-ASCII", "ASCII"];

fn check_encoding(declared: &str) -> RegistryResult<()> {
    if READABLE_ENCODINGS.iter().any(|e| e.eq_ignore_ascii_case(declared.trim())) {
        return Ok(());
    }
    Err(ValidationError::InvalidValue {
        field: "encoding".to_string(),
        reason: format!("unsupported declared encoding '{}', only UTF-8 is read", declared),
    }
    .into())
}

/// Runs first for every XML primary.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlBuilder;

impl ArtifactBuilder for XmlBuilder {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn accepts(&self, primary: &Artifact) -> bool {
        match primary.kind() {
            ArtifactKind::XmlDocument
            | ArtifactKind::XsdDocument
            | ArtifactKind::WsdlDocument
            | ArtifactKind::PolicyDocument => true,
            ArtifactKind::ExtendedDocument => primary.artifact_type.mime_type.contains("xml"),
            _ => false,
        }
    }

    fn build(&self, primary: &mut Artifact, content: &[u8], _out: &mut BuildOutput) -> RegistryResult<()> {
        content_xml(content)?;
        let encoding = declared_encoding(content_text(content)?)
            .unwrap_or_else(|| DEFAULT_ENCODING.to_string());
        check_encoding(&encoding)?;
        if let Some(info) = primary.content.as_mut() {
            info.encoding = Some(encoding);
        }
        Ok(())
    }
}
