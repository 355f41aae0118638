//! Audit entries and the snapshot differ.

use crate::{new_entity_id, Artifact, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What kind of mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEntryType {
    ArtifactAdd,
    ArtifactUpdate,
    ContentUpdate,
    ArtifactDelete,
}

/// One recorded change within an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditItem {
    PropertyAdded { name: String, value: String },
    PropertyChanged { name: String, value: String },
    PropertyRemoved { name: String },
    ClassifierAdded { uri: String },
    ClassifierRemoved { uri: String },
}

/// A time-ordered record of one artifact mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub uuid: String,
    pub artifact_uuid: String,
    /// Milliseconds since the epoch; ties broken by `uuid`.
    pub sort_id: i64,
    pub entry_type: AuditEntryType,
    pub principal: String,
    pub timestamp: Timestamp,
    pub items: Vec<AuditItem>,
}

impl AuditEntry {
    pub fn new(
        artifact_uuid: impl Into<String>,
        entry_type: AuditEntryType,
        principal: impl Into<String>,
        diff: ArtifactDiff,
    ) -> Self {
        let timestamp = Utc::now();
        Self {
            uuid: new_entity_id(),
            artifact_uuid: artifact_uuid.into(),
            sort_id: timestamp.timestamp_millis(),
            entry_type,
            principal: principal.into(),
            timestamp,
            items: diff.into_items(),
        }
    }
}

// ============================================================================
// DIFFER
// ============================================================================

/// The auditable view of an artifact: name-to-value properties and the set
/// of direct classifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSnapshot {
    pub properties: BTreeMap<String, String>,
    pub classifiers: BTreeSet<String>,
}

impl ArtifactSnapshot {
    /// Snapshot of a freshly created artifact's predecessor.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Core descriptive fields are audited alongside custom properties.
    pub fn of(artifact: &Artifact) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("name".to_string(), artifact.name.clone());
        if let Some(description) = &artifact.description {
            properties.insert("description".to_string(), description.clone());
        }
        if let Some(version) = &artifact.version {
            properties.insert("version".to_string(), version.clone());
        }
        for property in &artifact.properties {
            properties.insert(property.name.clone(), property.value.clone());
        }
        Self {
            properties,
            classifiers: artifact.classified_by.iter().cloned().collect(),
        }
    }
}

/// Property and classifier deltas between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactDiff {
    pub added_properties: BTreeMap<String, String>,
    pub updated_properties: BTreeMap<String, String>,
    pub removed_properties: BTreeSet<String>,
    pub added_classifiers: BTreeSet<String>,
    pub removed_classifiers: BTreeSet<String>,
}

impl ArtifactDiff {
    pub fn is_empty(&self) -> bool {
        self.added_properties.is_empty()
            && self.updated_properties.is_empty()
            && self.removed_properties.is_empty()
            && self.added_classifiers.is_empty()
            && self.removed_classifiers.is_empty()
    }

    pub fn into_items(self) -> Vec<AuditItem> {
        let mut items = Vec::new();
        items.extend(
            self.added_properties
                .into_iter()
                .map(|(name, value)| AuditItem::PropertyAdded { name, value }),
        );
        items.extend(
            self.updated_properties
                .into_iter()
                .map(|(name, value)| AuditItem::PropertyChanged { name, value }),
        );
        items.extend(
            self.removed_properties
                .into_iter()
                .map(|name| AuditItem::PropertyRemoved { name }),
        );
        items.extend(
            self.added_classifiers
                .into_iter()
                .map(|uri| AuditItem::ClassifierAdded { uri }),
        );
        items.extend(
            self.removed_classifiers
                .into_iter()
                .map(|uri| AuditItem::ClassifierRemoved { uri }),
        );
        items
    }
}

/// Compute what changed from `old` to `new`.
pub fn diff(old: &ArtifactSnapshot, new: &ArtifactSnapshot) -> ArtifactDiff {
    let mut out = ArtifactDiff::default();
    for (name, value) in &new.properties {
        match old.properties.get(name) {
            None => {
                out.added_properties.insert(name.clone(), value.clone());
            }
            Some(previous) if previous != value => {
                out.updated_properties.insert(name.clone(), value.clone());
            }
            Some(_) => {}
        }
    }
    for name in old.properties.keys() {
        if !new.properties.contains_key(name) {
            out.removed_properties.insert(name.clone());
        }
    }
    out.added_classifiers = new.classifiers.difference(&old.classifiers).cloned().collect();
    out.removed_classifiers = old.classifiers.difference(&new.classifiers).cloned().collect();
    out
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArtifactKind;

    #[test]
    fn test_diff_against_empty_adds_everything() {
        let a = Artifact::of_kind(ArtifactKind::Document, "doc")
            .with_property("owner", "ops")
            .with_classifier("urn:x#A");
        let d = diff(&ArtifactSnapshot::empty(), &ArtifactSnapshot::of(&a));
        assert_eq!(d.added_properties.len(), 2);
        assert_eq!(d.added_properties.get("owner").map(String::as_str), Some("ops"));
        assert!(d.added_classifiers.contains("urn:x#A"));
        assert!(d.updated_properties.is_empty());
    }

    #[test]
    fn test_diff_added_updated_removed() {
        let before = Artifact::of_kind(ArtifactKind::Document, "doc")
            .with_property("keep", "1")
            .with_property("change", "a")
            .with_property("drop", "x")
            .with_classifier("urn:x#A");
        let after = Artifact::of_kind(ArtifactKind::Document, "doc")
            .with_property("keep", "1")
            .with_property("change", "b")
            .with_property("new", "n")
            .with_classifier("urn:x#B");

        let d = diff(&ArtifactSnapshot::of(&before), &ArtifactSnapshot::of(&after));
        assert_eq!(d.added_properties.keys().collect::<Vec<_>>(), vec!["new"]);
        assert_eq!(d.updated_properties.get("change").map(String::as_str), Some("b"));
        assert!(d.removed_properties.contains("drop"));
        assert!(d.added_classifiers.contains("urn:x#B"));
        assert!(d.removed_classifiers.contains("urn:x#A"));
        assert_eq!(d.into_items().len(), 5);
    }

    #[test]
    fn test_identical_snapshots_have_empty_diff() {
        let a = Artifact::of_kind(ArtifactKind::Document, "doc").with_property("p", "v");
        let s = ArtifactSnapshot::of(&a);
        assert!(diff(&s, &s).is_empty());
    }

    #[test]
    fn test_entry_carries_items() {
        let a = Artifact::of_kind(ArtifactKind::Document, "doc");
        let d = diff(&ArtifactSnapshot::empty(), &ArtifactSnapshot::of(&a));
        let entry = AuditEntry::new("a-1", AuditEntryType::ArtifactAdd, "alice", d);
        assert_eq!(entry.artifact_uuid, "a-1");
        assert_eq!(entry.items.len(), 1);
        assert!(entry.sort_id > 0);
    }
}
