//! Error types for CAIRN operations

use crate::EntityType;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: String },

    #[error("Entity already exists: {entity_type:?} with id {id}")]
    AlreadyExists { entity_type: EntityType, id: String },

    #[error("Node path already exists: {path}")]
    PathExists { path: String },

    #[error("Artifact {id} (or one of its derived artifacts) is still the target of a relationship")]
    RelationshipConstraint { id: String },

    #[error("Derived artifacts of {id} carry custom metadata: {reason}")]
    DerivedMetadataConstraint { id: String, reason: String },

    #[error("Unknown node reference: {node}")]
    UnknownNode { node: u64 },

    #[error("Session already closed")]
    SessionClosed,

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Reserved name used for property or relationship: {name}")]
    ReservedName { name: String },

    #[error("Duplicate property or relationship name: {name}")]
    DuplicateName { name: String },

    #[error("Wrong artifact model: expected {expected}, got {got}")]
    WrongModel { expected: String, got: String },

    #[error("Derived relationship {relationship} cannot be created or modified directly")]
    DerivedRelationshipMutation { relationship: String },

    #[error("Invalid classifier {token}: {reason}")]
    InvalidClassifier { token: String, reason: String },

    #[error("Ontology cycle detected at class {uri}")]
    OntologyCycle { uri: String },

    #[error("Duplicate ontology class {uri}")]
    DuplicateClass { uri: String },

    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Artifact {id} of type {artifact_type} has no document content")]
    NoContent { id: String, artifact_type: String },
}

/// Query errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Query expects {expected} parameter(s) but {got} were bound")]
    ParamCount { expected: usize, got: usize },

    #[error("Unsupported query function: {name}")]
    UnsupportedFunction { name: String },

    #[error("Invalid argument to {function}: {reason}")]
    InvalidArgument { function: String, reason: String },

    #[error("Invalid query context: {reason}")]
    InvalidContext { reason: String },
}

/// Artifact typing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("Unknown artifact type: {model}/{type_name}")]
    UnknownType { model: String, type_name: String },

    #[error("Invalid extended type name: {name}")]
    InvalidExtendedType { name: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all CAIRN errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Type error: {0}")]
    Type(#[from] TypeError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Caller-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    ParamCount,
    Parse,
    UnknownType,
    Config,
    Internal,
}

impl RegistryError {
    /// Classify this error for callers that only branch on the category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Storage(e) => match e {
                StorageError::NotFound { .. } => ErrorKind::NotFound,
                StorageError::AlreadyExists { .. }
                | StorageError::PathExists { .. }
                | StorageError::RelationshipConstraint { .. }
                | StorageError::DerivedMetadataConstraint { .. } => ErrorKind::Conflict,
                StorageError::UnknownNode { .. }
                | StorageError::SessionClosed
                | StorageError::LockPoisoned
                | StorageError::TransactionFailed { .. } => ErrorKind::Internal,
            },
            RegistryError::Validation(_) => ErrorKind::Validation,
            RegistryError::Query(e) => match e {
                QueryError::ParamCount { .. } => ErrorKind::ParamCount,
                _ => ErrorKind::Parse,
            },
            RegistryError::Type(e) => match e {
                TypeError::UnknownType { .. } => ErrorKind::UnknownType,
                TypeError::InvalidExtendedType { .. } => ErrorKind::Validation,
            },
            RegistryError::Config(_) => ErrorKind::Config,
        }
    }

    /// Shorthand for a not-found storage error.
    pub fn not_found(entity_type: EntityType, id: impl Into<String>) -> Self {
        RegistryError::Storage(StorageError::NotFound {
            entity_type,
            id: id.into(),
        })
    }

    /// Shorthand for an already-exists storage error.
    pub fn already_exists(entity_type: EntityType, id: impl Into<String>) -> Self {
        RegistryError::Storage(StorageError::AlreadyExists {
            entity_type,
            id: id.into(),
        })
    }
}

/// Result type alias for CAIRN operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            entity_type: EntityType::Artifact,
            id: "abc-123".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Entity not found"));
        assert!(msg.contains("Artifact"));
        assert!(msg.contains("abc-123"));
    }

    #[test]
    fn test_query_error_display_param_count() {
        let err = QueryError::ParamCount {
            expected: 2,
            got: 3,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("expects 2"));
        assert!(msg.contains("3 were bound"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "default_page_size".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("default_page_size"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            RegistryError::not_found(EntityType::Ontology, "x").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            RegistryError::already_exists(EntityType::Artifact, "x").kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            RegistryError::from(StorageError::RelationshipConstraint { id: "x".into() }).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            RegistryError::from(ValidationError::ReservedName { name: "uuid".into() }).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            RegistryError::from(QueryError::ParamCount { expected: 1, got: 0 }).kind(),
            ErrorKind::ParamCount
        );
        assert_eq!(
            RegistryError::from(QueryError::Parse {
                message: "bad".into(),
                line: 1,
                column: 1
            })
            .kind(),
            ErrorKind::Parse
        );
        assert_eq!(
            RegistryError::from(TypeError::UnknownType {
                model: "x".into(),
                type_name: "y".into()
            })
            .kind(),
            ErrorKind::UnknownType
        );
        assert_eq!(
            RegistryError::from(StorageError::LockPoisoned).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_registry_error_from_variants() {
        let storage = RegistryError::from(StorageError::SessionClosed);
        assert!(matches!(storage, RegistryError::Storage(_)));

        let validation = RegistryError::from(ValidationError::RequiredFieldMissing {
            field: "name".to_string(),
        });
        assert!(matches!(validation, RegistryError::Validation(_)));

        let config = RegistryError::from(ConfigError::MissingRequired {
            field: "trash_root".to_string(),
        });
        assert!(matches!(config, RegistryError::Config(_)));
    }
}
