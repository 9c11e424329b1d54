use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Core error types for project management operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{entity} with id: {id} doesn't exist")]
    NotFound { entity: String, id: String },

    /// A mutation's preconditions failed. Carries the status code to surface.
    #[error("{message}")]
    BusinessRule { message: String, status: u16 },

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// The data source accepted the mutation but persisted nothing.
    #[error("Failed to {operation}. {reason}")]
    OperationFailed { operation: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new NotFound error
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Create a new BusinessRule error with an explicit status code
    pub fn business_rule(message: impl Into<String>, status: u16) -> Self {
        Self::BusinessRule {
            message: message.into(),
            status,
        }
    }

    /// Business rule violation surfaced as 403
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::business_rule(message, 403)
    }

    /// Business rule violation surfaced as 409
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::business_rule(message, 409)
    }

    /// Zero rows persisted for `operation`
    pub fn nothing_saved(operation: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            reason: "No changes were saved to the database.".to_string(),
        }
    }

    /// Create a new Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a client error (4xx category)
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::Validation(_) | Self::JsonError(_) => true,
            Self::BusinessRule { status, .. } => (400..500).contains(status),
            Self::OperationFailed { .. } | Self::Storage(_) => false,
        }
    }

    /// Check if this error is a server error (5xx category)
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::BusinessRule { .. } => ErrorCategory::BusinessRule,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::OperationFailed { .. } => ErrorCategory::OperationFailed,
            Self::Storage(_) => ErrorCategory::System,
            Self::JsonError(_) => ErrorCategory::Serialization,
        }
    }
}

impl From<ValidationErrors> for CoreError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    BusinessRule,
    OperationFailed,
    Serialization,
    System,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::BusinessRule => write!(f, "business_rule"),
            Self::OperationFailed => write!(f, "operation_failed"),
            Self::Serialization => write!(f, "serialization"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Field-level validation failures, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Records `message` against `field` when `failed` holds.
    pub fn check(&mut self, failed: bool, field: &str, message: impl Into<String>) {
        if failed {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = CoreError::not_found("Project", "3fa85f64");
        assert_eq!(err.to_string(), "Project with id: 3fa85f64 doesn't exist");
        assert!(err.is_not_found());
        assert!(err.is_client_error());
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_business_rule_carries_status() {
        let err = CoreError::conflict("Project is already ended.");
        assert_eq!(err.to_string(), "Project is already ended.");
        assert!(matches!(err, CoreError::BusinessRule { status: 409, .. }));
        assert_eq!(err.category(), ErrorCategory::BusinessRule);

        let err = CoreError::forbidden("Only the project owner can create tasks.");
        assert!(matches!(err, CoreError::BusinessRule { status: 403, .. }));
    }

    #[test]
    fn test_operation_failed_is_server_error() {
        let err = CoreError::nothing_saved("update project");
        assert_eq!(
            err.to_string(),
            "Failed to update project. No changes were saved to the database."
        );
        assert!(err.is_server_error());
        assert_eq!(err.category(), ErrorCategory::OperationFailed);
    }

    #[test]
    fn test_validation_errors_collect_per_field() {
        let mut errors = ValidationErrors::new();
        errors.check(true, "name", "must not be empty");
        errors.check(false, "budget", "must be greater than 0");
        errors.add("name", "must be at most 200 characters");

        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(
            errors.to_string(),
            "name: must not be empty; name: must be at most 200 characters"
        );

        let err = errors.into_result().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_error_categories_display() {
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
        assert_eq!(ErrorCategory::NotFound.to_string(), "not_found");
        assert_eq!(ErrorCategory::BusinessRule.to_string(), "business_rule");
        assert_eq!(ErrorCategory::OperationFailed.to_string(), "operation_failed");
        assert_eq!(ErrorCategory::System.to_string(), "system");
    }
}
