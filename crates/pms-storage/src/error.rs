//! Storage error types.

use std::fmt;

use pms_core::CoreError;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The addressed entity does not exist.
    #[error("{entity} with id: {id} doesn't exist")]
    NotFound {
        /// The entity type.
        entity: String,
        /// The missing id.
        id: String,
    },

    /// Attempted to add an entity whose id is already taken.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// The entity type.
        entity: String,
        /// The duplicated id.
        id: String,
    },

    /// Failed to reach the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::AlreadyExists {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            other => CoreError::storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_core_not_found() {
        let err: CoreError = StorageError::not_found("ProjectTask", "42").into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "ProjectTask with id: 42 doesn't exist");
    }

    #[test]
    fn test_infrastructure_errors_map_to_storage() {
        let err: CoreError = StorageError::connection_error("refused").into();
        assert!(matches!(err, CoreError::Storage(_)));
        assert!(err.is_server_error());
    }
}
