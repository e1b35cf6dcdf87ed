//! Configuration validation utilities.
//!
//! Configuration is validated before any adapter I/O happens; a failure
//! surfaces as `ConcordError::Configuration`.

use crate::errors::ConcordError;
use std::fmt;

/// Configuration validation result
pub type ValidationResult = Result<(), ValidationError>;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Value is required but missing or empty
    Required { field: String },
    /// Value format is invalid
    InvalidFormat {
        field: String,
        expected: String,
        actual: String,
    },
    /// Custom validation failed
    Custom { field: String, message: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Required { field } => {
                write!(f, "Field '{field}' is required but missing")
            }
            ValidationError::InvalidFormat {
                field,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Field '{field}' has invalid format. Expected: {expected}, got: {actual}"
                )
            }
            ValidationError::Custom { field, message } => {
                write!(f, "Field '{field}': {message}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ConcordError {
    fn from(err: ValidationError) -> Self {
        ConcordError::configuration(err.to_string())
    }
}

/// Trait for configuration validation
pub trait ConfigValidation {
    /// Validate this configuration
    fn validate(&self) -> Result<(), ConcordError>;
}

/// Validator that collects rule violations; `result` reports the first
#[derive(Debug, Default)]
pub struct ConfigValidator {
    errors: Vec<ValidationError>,
}

impl ConfigValidator {
    /// Create a new validator
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate that a string is present and not blank
    pub fn non_empty(&mut self, field_name: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.push(ValidationError::Required {
                field: field_name.to_string(),
            });
        }
        self
    }

    /// Validate that a string does not contain any of `forbidden`
    pub fn excludes(&mut self, field_name: &str, value: &str, forbidden: &[char]) -> &mut Self {
        if value.contains(forbidden) {
            self.errors.push(ValidationError::InvalidFormat {
                field: field_name.to_string(),
                expected: format!("no characters from {forbidden:?}"),
                actual: value.to_string(),
            });
        }
        self
    }

    /// Validate using a custom predicate
    pub fn custom<T, F>(
        &mut self,
        field_name: &str,
        value: &T,
        predicate: F,
        message: &str,
    ) -> &mut Self
    where
        T: ?Sized,
        F: FnOnce(&T) -> bool,
    {
        if !predicate(value) {
            self.errors.push(ValidationError::Custom {
                field: field_name.to_string(),
                message: message.to_string(),
            });
        }
        self
    }

    /// First violation, if any
    pub fn result(self) -> ValidationResult {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_first_violation() {
        let mut validator = ConfigValidator::new();
        validator
            .non_empty("node_id", "  ")
            .excludes("topic", "a:b", &[':'])
            .custom("timeout", &0u64, |t| *t > 0, "must be positive");

        assert_eq!(
            validator.result(),
            Err(ValidationError::Required {
                field: "node_id".into()
            })
        );
    }

    #[test]
    fn test_custom_predicate() {
        let mut validator = ConfigValidator::new();
        validator.custom("timeout", &0u64, |t| *t > 0, "must be positive");

        assert_eq!(
            validator.result(),
            Err(ValidationError::Custom {
                field: "timeout".into(),
                message: "must be positive".into()
            })
        );
    }

    #[test]
    fn test_converts_to_configuration_error() {
        let err: ConcordError = ValidationError::Required { field: "x".into() }.into();
        assert!(matches!(err, ConcordError::Configuration { .. }));
    }
}
