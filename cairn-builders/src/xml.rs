//! Minimal namespace-aware XML reader.
//!
//! Enough of XML 1.0 to walk schemas and service descriptions: elements,
//! attributes, character data, CDATA, comments, processing instructions and
//! a skipped DOCTYPE. Entity references are limited to the predefined five
//! plus numeric character references.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const WSDL_NS: &str = "http://schemas.xmlsoap.org/wsdl/";
pub const SOAP_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap/";
pub const SOAP12_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap12/";
pub const POLICY_NS: &str = "http://www.w3.org/ns/ws-policy";
pub const POLICY_2004_NS: &str = "http://schemas.xmlsoap.org/ws/2004/09/policy";

static ENCODING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*?\bencoding\s*=\s*["']([A-Za-z0-9._\-]+)["']"#)
        .expect("Invalid encoding regex")
});

/// Encoding named by the XML declaration, if any.
pub fn declared_encoding(source: &str) -> Option<String> {
    ENCODING_PATTERN
        .captures(source)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

// ============================================================================
// DOCUMENT MODEL
// ============================================================================

/// A parsed element with its in-scope namespace bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub prefix: Option<String>,
    pub local_name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
    namespaces: BTreeMap<String, String>,
}

impl XmlElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// Direct children in `namespace` named `local_name`.
    pub fn children_named<'a, 'n>(
        &'a self,
        namespace: &'n str,
        local_name: &'n str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'n
    where
        'a: 'n,
    {
        self.children.iter().filter(move |c| c.is(namespace, local_name))
    }

    pub fn child_named(&self, namespace: &str, local_name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(namespace, local_name))
    }

    /// Resolve a `prefix:local` attribute value against this element's
    /// bindings. An unprefixed value takes `default_namespace`.
    pub fn resolve_qname(&self, value: &str, default_namespace: Option<&str>) -> QName {
        match value.split_once(':') {
            Some((prefix, local)) => QName {
                namespace: self.namespaces.get(prefix).cloned(),
                local_name: local.to_string(),
            },
            None => QName {
                namespace: default_namespace.map(str::to_string),
                local_name: value.to_string(),
            },
        }
    }
}

/// A namespace-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub namespace: Option<String>,
    pub local_name: String,
}

/// Malformed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "XML error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for XmlError {}

/// Parse a whole document and return its root element.
pub fn parse(source: &str) -> Result<XmlElement, XmlError> {
    let mut reader = XmlReader::new(source);
    reader.skip_prolog()?;
    let root = reader.read_element(&BTreeMap::new())?;
    reader.skip_misc()?;
    if reader.peek_char().is_some() {
        return Err(reader.error("Content after root element"));
    }
    Ok(root)
}

// ============================================================================
// READER
// ============================================================================

struct XmlReader<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    pos: usize,
}

struct RawStartTag {
    name: String,
    attributes: Vec<(String, String)>,
    self_closing: bool,
}

impl<'a> XmlReader<'a> {
    fn new(source: &'a str) -> Self {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            pos: 0,
        }
    }

    /// XML declaration, comments, PIs and DOCTYPE before the root.
    fn skip_prolog(&mut self) -> Result<(), XmlError> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<?") {
                self.skip_past("?>")?;
            } else if self.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if self.starts_with("<!DOCTYPE") {
                self.skip_doctype()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_misc(&mut self) -> Result<(), XmlError> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<?") {
                self.skip_past("?>")?;
            } else if self.starts_with("<!--") {
                self.skip_past("-->")?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_doctype(&mut self) -> Result<(), XmlError> {
        let mut depth = 0usize;
        while let Some(c) = self.advance() {
            match c {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                '>' if depth == 0 => return Ok(()),
                _ => {}
            }
        }
        Err(self.error("Unterminated DOCTYPE"))
    }

    fn read_element(&mut self, inherited: &BTreeMap<String, String>) -> Result<XmlElement, XmlError> {
        let tag = self.read_start_tag()?;

        let mut namespaces = inherited.clone();
        let mut attributes = Vec::with_capacity(tag.attributes.len());
        for (name, value) in tag.attributes {
            if name == "xmlns" {
                namespaces.insert(String::new(), value);
            } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                namespaces.insert(prefix.to_string(), value);
            } else {
                attributes.push((name, value));
            }
        }

        let (prefix, local_name) = match tag.name.split_once(':') {
            Some((p, l)) => (Some(p.to_string()), l.to_string()),
            None => (None, tag.name.clone()),
        };
        let namespace = namespaces
            .get(prefix.as_deref().unwrap_or(""))
            .cloned();

        let mut element = XmlElement {
            prefix,
            local_name,
            namespace,
            attributes,
            children: Vec::new(),
            text: String::new(),
            namespaces,
        };
        if tag.self_closing {
            return Ok(element);
        }

        loop {
            if self.starts_with("</") {
                self.advance();
                self.advance();
                let name = self.read_name()?;
                if name != tag.name {
                    return Err(self.error(&format!(
                        "Mismatched end tag: expected </{}>, found </{}>",
                        tag.name, name
                    )));
                }
                self.skip_whitespace();
                self.expect('>')?;
                return Ok(element);
            } else if self.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if self.starts_with("<![CDATA[") {
                let start = self.pos + "<![CDATA[".len();
                let end = self.skip_past("]]>")?;
                element.text.push_str(&self.source[start..end]);
            } else if self.starts_with("<?") {
                self.skip_past("?>")?;
            } else if self.starts_with("<") {
                let child = self.read_element(&element.namespaces)?;
                element.children.push(child);
            } else if self.peek_char().is_none() {
                return Err(self.error(&format!("Unclosed element <{}>", tag.name)));
            } else {
                let text = self.read_text()?;
                element.text.push_str(&text);
            }
        }
    }

    fn read_start_tag(&mut self) -> Result<RawStartTag, XmlError> {
        self.expect('<')?;
        let name = self.read_name()?;
        let mut attributes = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek_char() {
                Some('/') => {
                    self.advance();
                    self.expect('>')?;
                    return Ok(RawStartTag {
                        name,
                        attributes,
                        self_closing: true,
                    });
                }
                Some('>') => {
                    self.advance();
                    return Ok(RawStartTag {
                        name,
                        attributes,
                        self_closing: false,
                    });
                }
                Some(_) => {
                    let attr_name = self.read_name()?;
                    self.skip_whitespace();
                    self.expect('=')?;
                    self.skip_whitespace();
                    let value = self.read_quoted()?;
                    if attributes.iter().any(|(n, _)| *n == attr_name) {
                        return Err(self.error(&format!("Duplicate attribute {}", attr_name)));
                    }
                    attributes.push((attr_name, value));
                }
                None => return Err(self.error("Unterminated start tag")),
            }
        }
    }

    fn read_name(&mut self) -> Result<String, XmlError> {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.') {
                self.advance();
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error("Expected a name"));
        }
        Ok(self.source[start..self.pos].to_string())
    }

    fn read_quoted(&mut self) -> Result<String, XmlError> {
        let quote = match self.advance() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("Expected a quoted attribute value")),
        };
        let mut value = String::new();
        loop {
            match self.peek_char() {
                None => return Err(self.error("Unterminated attribute value")),
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(value);
                }
                Some('&') => value.push(self.read_reference()?),
                Some('<') => return Err(self.error("'<' in attribute value")),
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }
    }

    fn read_text(&mut self) -> Result<String, XmlError> {
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            match c {
                '<' => break,
                '&' => text.push(self.read_reference()?),
                _ => {
                    self.advance();
                    text.push(c);
                }
            }
        }
        Ok(text)
    }

    fn read_reference(&mut self) -> Result<char, XmlError> {
        self.expect('&')?;
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == ';' {
                break;
            }
            self.advance();
        }
        let body = self.source[start..self.pos].to_string();
        self.expect(';')?;
        let decoded = match body.as_str() {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => {
                if let Some(hex) = body.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                } else if let Some(dec) = body.strip_prefix('#') {
                    dec.parse::<u32>().ok().and_then(char::from_u32)
                } else {
                    None
                }
            }
        };
        decoded.ok_or_else(|| self.error(&format!("Unknown entity &{};", body)))
    }

    /// Advance past `terminator`, returning the offset where it began.
    fn skip_past(&mut self, terminator: &str) -> Result<usize, XmlError> {
        match self.source[self.pos..].find(terminator) {
            Some(offset) => {
                let end = self.pos + offset;
                while self.pos < end + terminator.len() {
                    self.advance();
                }
                Ok(end)
            }
            None => Err(self.error(&format!("Missing '{}'", terminator))),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.source[self.pos..].starts_with(s)
    }

    fn expect(&mut self, expected: char) -> Result<(), XmlError> {
        match self.peek_char() {
            Some(c) if c == expected => {
                self.advance();
                Ok(())
            }
            Some(c) => Err(self.error(&format!("Expected '{}', found '{}'", expected, c))),
            None => Err(self.error(&format!("Expected '{}', found end of input", expected))),
        }
    }

    fn error(&self, message: &str) -> XmlError {
        XmlError {
            message: message.to_string(),
            line: self.line,
            column: self.column,
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        if let Some((i, c)) = self.chars.next() {
            self.pos = i + c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            Some(c)
        } else {
            None
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_namespaces_and_attributes() {
        let doc = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<!-- header -->
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:tns="urn:t" targetNamespace="urn:t">
  <xs:element name="order" type="tns:OrderType"/>
  <xs:complexType name="OrderType"><xs:sequence/></xs:complexType>
</xs:schema>"#;
        let root = parse(doc).unwrap();
        assert!(root.is(XSD_NS, "schema"));
        assert_eq!(root.attribute("targetNamespace"), Some("urn:t"));
        assert_eq!(root.children_named(XSD_NS, "element").count(), 1);

        let element = root.child_named(XSD_NS, "element").unwrap();
        let qname = element.resolve_qname(element.attribute("type").unwrap(), None);
        assert_eq!(qname.namespace.as_deref(), Some("urn:t"));
        assert_eq!(qname.local_name, "OrderType");

        assert_eq!(declared_encoding(doc).as_deref(), Some("ISO-8859-1"));
    }

    #[test]
    fn test_child_lookup_outlives_name_arguments() {
        let root = parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"><xs:element name="a"/><xs:element name="b"/></xs:schema>"#,
        )
        .unwrap();
        let first = {
            let local = String::from("element");
            root.child_named(XSD_NS, &local)
        };
        assert_eq!(first.and_then(|e| e.attribute("name")), Some("a"));

        let all: Vec<&XmlElement> = {
            let namespace = XSD_NS.to_string();
            root.children_named(&namespace, "element").collect()
        };
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_default_namespace_applies_to_children() {
        let root = parse(r#"<definitions xmlns="http://schemas.xmlsoap.org/wsdl/"><message name="m"/></definitions>"#)
            .unwrap();
        assert!(root.is(WSDL_NS, "definitions"));
        assert!(root.child_named(WSDL_NS, "message").is_some());
    }

    #[test]
    fn test_entities_cdata_and_text() {
        let root = parse("<a t=\"x &amp; y\">1 &lt; 2<![CDATA[<raw>]]>&#65;</a>").unwrap();
        assert_eq!(root.attribute("t"), Some("x & y"));
        assert_eq!(root.text, "1 < 2<raw>A");
    }

    #[test]
    fn test_mismatched_end_tag_reports_position() {
        let err = parse("<a>\n<b></a>").unwrap_err();
        assert!(err.message.contains("Mismatched"));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_rejects_trailing_content_and_unclosed() {
        assert!(parse("<a/><b/>").is_err());
        assert!(parse("<a>").is_err());
        assert!(parse("<a x='1' x='2'/>").is_err());
        assert!(parse("not xml").is_err());
    }

    #[test]
    fn test_no_declaration_no_encoding() {
        assert_eq!(declared_encoding("<a/>"), None);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_parse_never_panics(input in "[<>/a-z =\"'&;!?\\-\\[\\]]{0,64}") {
            let _ = parse(&input);
        }

        #[test]
        fn prop_attribute_values_survive_escaping(value in "[a-zA-Z0-9 <>&\"']{0,32}") {
            let escaped = value
                .replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('"', "&quot;");
            let doc = format!("<r v=\"{}\"/>", escaped);
            let root = parse(&doc).unwrap();
            prop_assert_eq!(root.attribute("v"), Some(value.as_str()));
        }
    }
}
