//! Ontologies and the classifier that resolves and normalizes against them.

use crate::{EntityType, RegistryError, RegistryResult, Timestamp, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

static URI_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:\S+$").expect("static regex"));

// ============================================================================
// ONTOLOGY MODEL
// ============================================================================

/// One node of a classification hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyClass {
    pub id: String,
    pub uri: String,
    pub label: Option<String>,
    pub comment: Option<String>,
    pub children: Vec<OntologyClass>,
}

impl OntologyClass {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_child(mut self, child: OntologyClass) -> Self {
        self.children.push(child);
        self
    }

    fn find<'a>(&'a self, pred: &dyn Fn(&OntologyClass) -> bool) -> Option<&'a OntologyClass> {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(pred))
    }

    /// Path from this class down to `uri`, both ends included.
    fn path_to<'a>(&'a self, uri: &str, path: &mut Vec<&'a OntologyClass>) -> bool {
        path.push(self);
        if self.uri == uri {
            return true;
        }
        for child in &self.children {
            if child.path_to(uri, path) {
                return true;
            }
        }
        path.pop();
        false
    }

    fn detach(&mut self, uri: &str) -> Option<OntologyClass> {
        if let Some(idx) = self.children.iter().position(|c| c.uri == uri) {
            return Some(self.children.remove(idx));
        }
        self.children.iter_mut().find_map(|c| c.detach(uri))
    }

    fn find_mut(&mut self, uri: &str) -> Option<&mut OntologyClass> {
        if self.uri == uri {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(uri))
    }
}

/// A classification scheme: a forest of classes under one base URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ontology {
    pub uuid: Option<String>,
    pub id: Option<String>,
    pub label: Option<String>,
    pub comment: Option<String>,
    pub base: String,
    pub created_by: Option<String>,
    pub created_on: Option<Timestamp>,
    pub last_modified_by: Option<String>,
    pub last_modified_on: Option<Timestamp>,
    pub root_classes: Vec<OntologyClass>,
}

impl Ontology {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            uuid: None,
            id: None,
            label: None,
            comment: None,
            base: base.into(),
            created_by: None,
            created_on: None,
            last_modified_by: None,
            last_modified_on: None,
            root_classes: Vec::new(),
        }
    }

    /// A detached class whose URI is `base#id`.
    pub fn create_class(&self, id: impl Into<String>) -> OntologyClass {
        let id = id.into();
        OntologyClass {
            uri: format!("{}#{}", self.base, id),
            id,
            label: None,
            comment: None,
            children: Vec::new(),
        }
    }

    pub fn with_root(mut self, class: OntologyClass) -> Self {
        self.root_classes.push(class);
        self
    }

    pub fn find_class(&self, id: &str) -> Option<&OntologyClass> {
        self.root_classes
            .iter()
            .find_map(|c| c.find(&|n: &OntologyClass| n.id == id))
    }

    pub fn find_class_by_uri(&self, uri: &str) -> Option<&OntologyClass> {
        self.root_classes
            .iter()
            .find_map(|c| c.find(&|n: &OntologyClass| n.uri == uri))
    }

    /// Root-to-class path for `uri`, or `None` if the class is not here.
    pub fn ancestors(&self, uri: &str) -> Option<Vec<&OntologyClass>> {
        for root in &self.root_classes {
            let mut path = Vec::new();
            if root.path_to(uri, &mut path) {
                return Some(path);
            }
        }
        None
    }

    pub fn parent_of(&self, uri: &str) -> Option<&OntologyClass> {
        let path = self.ancestors(uri)?;
        let len = path.len();
        if len < 2 {
            None
        } else {
            Some(path[len - 2])
        }
    }

    /// Remove a class (with its subtree) from wherever it sits.
    pub fn detach_class(&mut self, uri: &str) -> Option<OntologyClass> {
        if let Some(idx) = self.root_classes.iter().position(|c| c.uri == uri) {
            return Some(self.root_classes.remove(idx));
        }
        self.root_classes.iter_mut().find_map(|c| c.detach(uri))
    }

    /// Attach a class under `parent_uri`, or as a new root when `None`.
    pub fn attach_class(&mut self, parent_uri: Option<&str>, class: OntologyClass) -> RegistryResult<()> {
        match parent_uri {
            None => {
                self.root_classes.push(class);
                Ok(())
            }
            Some(parent_uri) => {
                let parent = self
                    .root_classes
                    .iter_mut()
                    .find_map(|c| c.find_mut(parent_uri))
                    .ok_or_else(|| RegistryError::not_found(EntityType::OntologyClass, parent_uri))?;
                parent.children.push(class);
                Ok(())
            }
        }
    }

    /// Every class, depth first.
    pub fn classes(&self) -> Vec<&OntologyClass> {
        fn walk<'a>(class: &'a OntologyClass, out: &mut Vec<&'a OntologyClass>) {
            out.push(class);
            for child in &class.children {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        for root in &self.root_classes {
            walk(root, &mut out);
        }
        out
    }

    /// Check tree shape: a base URI, no class under itself, no class twice.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.base.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "base".to_string(),
            }
            .into());
        }

        fn walk<'a>(
            class: &'a OntologyClass,
            path: &mut Vec<&'a str>,
            seen: &mut HashSet<&'a str>,
        ) -> RegistryResult<()> {
            if path.contains(&class.uri.as_str()) {
                return Err(ValidationError::OntologyCycle {
                    uri: class.uri.clone(),
                }
                .into());
            }
            if !seen.insert(class.uri.as_str()) {
                return Err(ValidationError::DuplicateClass {
                    uri: class.uri.clone(),
                }
                .into());
            }
            path.push(&class.uri);
            for child in &class.children {
                walk(child, path, seen)?;
            }
            path.pop();
            Ok(())
        }

        let mut seen = HashSet::new();
        for root in &self.root_classes {
            walk(root, &mut Vec::new(), &mut seen)?;
        }
        Ok(())
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Resolves classification tokens and normalizes class URIs against a set
/// of ontologies.
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    ontologies: &'a [Ontology],
}

impl<'a> Classifier<'a> {
    pub fn new(ontologies: &'a [Ontology]) -> Self {
        Self { ontologies }
    }

    /// Resolve a class URI or class id to the canonical class URI.
    pub fn resolve(&self, token: &str) -> RegistryResult<String> {
        let token = token.trim();
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidClassifier {
                token: token.to_string(),
                reason: "must be a class URI or identifier".to_string(),
            }
            .into());
        }

        let found = if URI_PATTERN.is_match(token) {
            self.ontologies
                .iter()
                .find_map(|o| o.find_class_by_uri(token))
        } else {
            self.ontologies.iter().find_map(|o| o.find_class(token))
        };

        found
            .map(|c| c.uri.clone())
            .ok_or_else(|| RegistryError::not_found(EntityType::OntologyClass, token))
    }

    /// The class plus every ancestor up to its root.
    pub fn normalize(&self, uri: &str) -> RegistryResult<BTreeSet<String>> {
        self.ontologies
            .iter()
            .find_map(|o| o.ancestors(uri))
            .map(|path| path.into_iter().map(|c| c.uri.clone()).collect())
            .ok_or_else(|| RegistryError::not_found(EntityType::OntologyClass, uri))
    }

    /// Resolve every token; the first failure fails the call.
    pub fn resolve_all<I, S>(&self, tokens: I) -> RegistryResult<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens
            .into_iter()
            .map(|t| self.resolve(t.as_ref()))
            .collect()
    }

    /// Union of the normalized forms; the first failure fails the call.
    pub fn normalize_all<I, S>(&self, uris: I) -> RegistryResult<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = BTreeSet::new();
        for uri in uris {
            out.extend(self.normalize(uri.as_ref())?);
        }
        Ok(out)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    const BASE: &str = "http://example.org/regions";

    fn world() -> Ontology {
        let o = Ontology::new(BASE);
        let japan = o.create_class("Japan");
        let china = o.create_class("China");
        let asia = o.create_class("Asia").with_child(japan).with_child(china);
        let europe = o.create_class("Europe");
        let world = o.create_class("World").with_child(asia).with_child(europe);
        o.with_root(world)
    }

    fn uri(id: &str) -> String {
        format!("{}#{}", BASE, id)
    }

    #[test]
    fn test_create_class_uri() {
        let o = Ontology::new(BASE);
        assert_eq!(o.create_class("X").uri, uri("X"));
    }

    #[test]
    fn test_find_class_recursive() {
        let o = world();
        assert_eq!(o.find_class("China").unwrap().uri, uri("China"));
        assert_eq!(o.find_class_by_uri(&uri("Europe")).unwrap().id, "Europe");
        assert!(o.find_class("Mars").is_none());
        assert_eq!(o.parent_of(&uri("Japan")).unwrap().id, "Asia");
        assert!(o.parent_of(&uri("World")).is_none());
    }

    #[test]
    fn test_normalize_world() {
        let ontologies = vec![world()];
        let classifier = Classifier::new(&ontologies);
        let normalized = classifier.normalize(&uri("Japan")).unwrap();
        let expected: BTreeSet<String> =
            [uri("World"), uri("Asia"), uri("Japan")].into_iter().collect();
        assert_eq!(normalized, expected);
    }

    #[test]
    fn test_normalize_after_reparent() {
        let mut o = world();
        let other = o.create_class("Other");
        o.attach_class(None, other).unwrap();
        let japan = o.detach_class(&uri("Japan")).unwrap();
        o.attach_class(Some(&uri("Other")), japan).unwrap();
        o.validate().unwrap();

        let ontologies = vec![o];
        let classifier = Classifier::new(&ontologies);
        let expected: BTreeSet<String> = [uri("Other"), uri("Japan")].into_iter().collect();
        assert_eq!(classifier.normalize(&uri("Japan")).unwrap(), expected);
    }

    #[test]
    fn test_resolve_by_id_and_uri() {
        let ontologies = vec![world()];
        let classifier = Classifier::new(&ontologies);
        assert_eq!(classifier.resolve("Asia").unwrap(), uri("Asia"));
        assert_eq!(classifier.resolve(&uri("Asia")).unwrap(), uri("Asia"));
    }

    #[test]
    fn test_resolve_failures() {
        let ontologies = vec![world()];
        let classifier = Classifier::new(&ontologies);
        assert_eq!(
            classifier.resolve("Atlantis").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            classifier.resolve("http://elsewhere.org#Asia").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            classifier.resolve("two words").unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_resolve_all_is_all_or_nothing() {
        let ontologies = vec![world()];
        let classifier = Classifier::new(&ontologies);
        assert_eq!(classifier.resolve_all(["Asia", "Europe"]).unwrap().len(), 2);
        assert!(classifier.resolve_all(["Asia", "Atlantis"]).is_err());
        assert!(classifier.normalize_all([uri("Japan"), uri("Nope")]).is_err());
    }

    #[test]
    fn test_validate_detects_cycle_and_duplicate() {
        let o = Ontology::new(BASE);
        let a = o.create_class("A");
        let looped = a.clone().with_child(o.create_class("B").with_child(a.clone()));
        let cyclic = o.clone().with_root(looped);
        assert!(matches!(
            cyclic.validate().unwrap_err(),
            RegistryError::Validation(ValidationError::OntologyCycle { .. })
        ));

        let dup = o.clone().with_root(a.clone()).with_root(a);
        assert!(matches!(
            dup.validate().unwrap_err(),
            RegistryError::Validation(ValidationError::DuplicateClass { .. })
        ));
    }

    #[test]
    fn test_attach_unknown_parent() {
        let mut o = world();
        let c = o.create_class("Z");
        let err = o.attach_class(Some("http://nowhere#x"), c).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
