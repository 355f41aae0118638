//! CAIRN Core - Model Types
//!
//! The artifact model, type table, ontologies, audit records and the error
//! taxonomy. Every other crate in the workspace depends on this one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod artifact;
pub mod artifact_type;
pub mod audit;
pub mod config;
pub mod error;
pub mod ontology;
pub mod stored_query;
pub mod telemetry;
pub mod validation;

pub use artifact::{
    Artifact, Comment, ContentInfo, HasDocumentContent, HasRelationships, IsDerived, KindPayload,
    Property, Relationship, RelationshipKind, Target, RELATED_DOCUMENT,
};
pub use artifact_type::{
    ArtifactKind, ArtifactType, KindDescriptor, TypeRegistry, TypeRegistryBuilder,
    BINARY_MIME_TYPE, XML_MIME_TYPE,
};
pub use audit::{diff, ArtifactDiff, ArtifactSnapshot, AuditEntry, AuditEntryType, AuditItem};
pub use config::{LogConfig, RegistryConfig};
pub use error::{
    ConfigError, ErrorKind, QueryError, RegistryError, RegistryResult, StorageError, TypeError,
    ValidationError,
};
pub use ontology::{Classifier, Ontology, OntologyClass};
pub use stored_query::StoredQuery;
pub use telemetry::init_tracing;
pub use validation::{is_reserved_name, verify_derived_relationships, verify_model, verify_names};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 identifier string (timestamp-sortable).
pub fn new_entity_id() -> String {
    Uuid::now_v7().to_string()
}

/// Hex-encoded SHA-256 of content.
pub fn compute_content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Entity type discriminator used in not-found and conflict errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Artifact,
    Ontology,
    OntologyClass,
    StoredQuery,
    RelationshipTarget,
    Content,
    Node,
    Comment,
    AuditEntry,
}

// =============================================================================
// TESTS
// =============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_content_hash_is_deterministic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let h1 = compute_content_hash(&bytes);
            let h2 = compute_content_hash(&bytes);
            prop_assert_eq!(&h1, &h2);
            prop_assert_eq!(h1.len(), 64);
        }
    }
}
