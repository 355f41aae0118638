//! Named, reusable query templates.

use crate::{RegistryResult, ValidationError};
use serde::{Deserialize, Serialize};

/// A query template saved under a unique name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredQuery {
    pub name: String,
    pub query_expression: String,
    /// Extra property names projected into each result.
    pub property_names: Vec<String>,
}

impl StoredQuery {
    pub fn new(name: impl Into<String>, query_expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query_expression: query_expression.into(),
            property_names: Vec::new(),
        }
    }

    pub fn with_property_name(mut self, name: impl Into<String>) -> Self {
        self.property_names.push(name.into());
        self
    }

    pub fn validate(&self) -> RegistryResult<()> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "name".to_string(),
            }
            .into());
        }
        if self.name.contains('/') {
            return Err(ValidationError::InvalidValue {
                field: "name".to_string(),
                reason: "stored query names cannot contain '/'".to_string(),
            }
            .into());
        }
        if self.query_expression.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "query_expression".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_name_rejected() {
        assert!(StoredQuery::new(" ", "/s-ramp").validate().is_err());
        assert!(StoredQuery::new("a/b", "/s-ramp").validate().is_err());
        assert!(StoredQuery::new("q", "").validate().is_err());
        assert!(StoredQuery::new("q", "/s-ramp/xsd").validate().is_ok());
    }
}
