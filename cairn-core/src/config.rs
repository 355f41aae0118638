//! Configuration types

use crate::{ConfigError, RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};

/// Registry-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Record an audit entry for every metadata update.
    pub audit_enabled: bool,
    /// Page size used when a query does not give one.
    pub default_page_size: usize,
    /// Upper bound on any requested page size.
    pub max_page_size: usize,
    /// Property results are ordered by when a query does not give one.
    pub default_order_by: String,
    /// Root path that soft-deleted artifacts are moved under.
    pub trash_root: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            audit_enabled: true,
            default_page_size: 20,
            max_page_size: 500,
            default_order_by: "name".to_string(),
            trash_root: "/trash".to_string(),
        }
    }
}

impl RegistryConfig {
    /// Read settings from `CAIRN_*` environment variables, falling back to
    /// the defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            audit_enabled: std::env::var("CAIRN_AUDIT_ENABLED")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.audit_enabled),
            default_page_size: std::env::var("CAIRN_DEFAULT_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_page_size),
            max_page_size: std::env::var("CAIRN_MAX_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_page_size),
            default_order_by: std::env::var("CAIRN_DEFAULT_ORDER_BY")
                .unwrap_or_else(|_| defaults.default_order_by.clone()),
            trash_root: std::env::var("CAIRN_TRASH_ROOT")
                .unwrap_or_else(|_| defaults.trash_root.clone()),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.default_page_size == 0 {
            return Err(RegistryError::Config(ConfigError::InvalidValue {
                field: "default_page_size".to_string(),
                value: self.default_page_size.to_string(),
                reason: "default_page_size must be greater than 0".to_string(),
            }));
        }

        if self.max_page_size < self.default_page_size {
            return Err(RegistryError::Config(ConfigError::InvalidValue {
                field: "max_page_size".to_string(),
                value: self.max_page_size.to_string(),
                reason: "max_page_size must be at least default_page_size".to_string(),
            }));
        }

        if self.default_order_by.trim().is_empty() {
            return Err(RegistryError::Config(ConfigError::MissingRequired {
                field: "default_order_by".to_string(),
            }));
        }

        if !self.trash_root.starts_with('/') || self.trash_root.len() < 2 {
            return Err(RegistryError::Config(ConfigError::InvalidValue {
                field: "trash_root".to_string(),
                value: self.trash_root.clone(),
                reason: "trash_root must be an absolute, non-root path".to_string(),
            }));
        }

        Ok(())
    }

    /// Clamp a caller page size into `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Emit JSON lines instead of the human format.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_filter: std::env::var("CAIRN_LOG_FILTER")
                .unwrap_or_else(|_| "cairn=info,warn".to_string()),
            json: std::env::var("CAIRN_LOG_JSON")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
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
    fn test_default_config_is_valid() {
        let config = RegistryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.default_order_by, "name");
        assert!(config.audit_enabled);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let config = RegistryConfig {
            default_page_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("default_page_size"));
    }

    #[test]
    fn test_max_below_default_rejected() {
        let config = RegistryConfig {
            max_page_size: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trash_root_must_be_absolute() {
        let config = RegistryConfig {
            trash_root: "trash".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = RegistryConfig {
            trash_root: "/".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_order_by_rejected() {
        let config = RegistryConfig {
            default_order_by: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate().unwrap_err(),
            RegistryError::Config(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_page_size_clamped() {
        let config = RegistryConfig::default();
        assert_eq!(config.page_size(None), 20);
        assert_eq!(config.page_size(Some(0)), 1);
        assert_eq!(config.page_size(Some(10_000)), 500);
    }
}
