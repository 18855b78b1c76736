//! Core error types for PayGuard services

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for PayGuard services
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum PayGuardError {
    /// Validation errors (rejected before the scoring pipeline runs)
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        code: String,
    },

    /// Resource not found errors
    #[error("Resource not found: {resource_type} with ID {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
        code: String,
    },

    /// The account is locked; scoring is short-circuited
    #[error("Account is locked: {user_id}")]
    AccountLocked {
        user_id: String,
        code: String,
    },

    /// A failure inside the scoring pipeline (enrich/rule/model/decide)
    #[error("Pipeline failure in {stage}: {message}")]
    Pipeline {
        stage: String,
        message: String,
        code: String,
    },

    /// Store read/write failures
    #[error("Persistence error during {operation}: {message}")]
    Persistence {
        operation: String,
        message: String,
        code: String,
    },

    /// Serialization/Deserialization errors at the Store boundary
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        field: Option<String>,
        code: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        key: Option<String>,
        code: String,
    },

    /// A component exceeded its time budget
    #[error("Operation timed out: {operation}")]
    Timeout {
        operation: String,
        budget_ms: u64,
        code: String,
    },
}

impl PayGuardError {
    /// Get the error code
    pub fn code(&self) -> &str {
        match self {
            Self::Validation { code, .. } => code,
            Self::NotFound { code, .. } => code,
            Self::AccountLocked { code, .. } => code,
            Self::Pipeline { code, .. } => code,
            Self::Persistence { code, .. } => code,
            Self::Serialization { code, .. } => code,
            Self::Configuration { code, .. } => code,
            Self::Timeout { code, .. } => code,
        }
    }

    /// Check if the error is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::NotFound { .. } | Self::AccountLocked { .. }
        )
    }

    /// Check if the error is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Persistence { .. })
    }
}

/// Result type alias for PayGuard operations
pub type Result<T> = std::result::Result<T, PayGuardError>;

/// Convenience macros for creating errors
#[macro_export]
macro_rules! validation_error {
    ($message:expr) => {
        $crate::PayGuardError::Validation {
            message: $message.to_string(),
            field: None,
            code: "VALIDATION_ERROR".to_string(),
        }
    };
    ($message:expr, $field:expr) => {
        $crate::PayGuardError::Validation {
            message: $message.to_string(),
            field: Some($field.to_string()),
            code: "VALIDATION_ERROR".to_string(),
        }
    };
}

#[macro_export]
macro_rules! not_found_error {
    ($resource_type:expr, $resource_id:expr) => {
        $crate::PayGuardError::NotFound {
            resource_type: $resource_type.to_string(),
            resource_id: $resource_id.to_string(),
            code: "RESOURCE_NOT_FOUND".to_string(),
        }
    };
}

#[macro_export]
macro_rules! pipeline_error {
    ($stage:expr, $message:expr) => {
        $crate::PayGuardError::Pipeline {
            stage: $stage.to_string(),
            message: $message.to_string(),
            code: "PIPELINE_FAILURE".to_string(),
        }
    };
}

#[macro_export]
macro_rules! persistence_error {
    ($operation:expr, $message:expr) => {
        $crate::PayGuardError::Persistence {
            operation: $operation.to_string(),
            message: $message.to_string(),
            code: "PERSISTENCE_FAILURE".to_string(),
        }
    };
}
