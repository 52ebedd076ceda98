//! Error types module
//!
//! Every fallible operation in the workspace returns [`AppError`]. Expected outcomes
//! (`NotFound`, `Forbidden`) are separate variants from caller logic errors
//! (`InvalidTransition`) and persistence failures (`StoreFailure`).
//!
//! There is no `From<sqlx::Error>`: store errors go through
//! [`StoreResultExt::store_context`] so the failing operation and entity are always named.

use std::fmt::Display;
use uuid::Uuid;

use crate::models::{Capability, FileEvent, FileStatus};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for caller mistakes worth noticing
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be presented to a caller.
pub trait ErrorMetadata {
    /// HTTP-equivalent status code
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "STORE_FAILURE")
    fn error_code(&self) -> &'static str;

    /// Whether the caller may retry the same call
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("User {user_id} lacks capability {capability}")]
    Forbidden {
        user_id: Uuid,
        capability: Capability,
    },

    #[error("File {file_id}: event {event} is not allowed from status {from}")]
    InvalidTransition {
        file_id: Uuid,
        from: FileStatus,
        event: FileEvent,
    },

    #[error("Store failure during {operation} on {entity}")]
    StoreFailure {
        operation: &'static str,
        entity: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(kind: &str, id: impl Display) -> Self {
        AppError::NotFound(format!("{} {} not found", kind, id))
    }

    pub fn store_failure(
        operation: &'static str,
        entity: impl Display,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        AppError::StoreFailure {
            operation,
            entity: entity.to_string(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, AppError::Forbidden { .. })
    }

    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::NotFound(_) => "NotFound",
            AppError::Forbidden { .. } => "Forbidden",
            AppError::InvalidTransition { .. } => "InvalidTransition",
            AppError::StoreFailure { .. } => "StoreFailure",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::Internal(_) => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::Forbidden { .. } => (
            403,
            "FORBIDDEN",
            false,
            Some("Ask an administrator to grant the missing capability"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidTransition { .. } => (
            409,
            "INVALID_TRANSITION",
            false,
            Some("Reload the file status before retrying"),
            false,
            LogLevel::Warn,
        ),
        AppError::StoreFailure { .. } => (
            500,
            "STORE_FAILURE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Forbidden { capability, .. } => {
                format!("Missing capability: {}", capability)
            }
            AppError::InvalidTransition { from, event, .. } => {
                format!("Cannot apply {} to a file in status {}", event, from)
            }
            AppError::StoreFailure { .. } => "Failed to access database".to_string(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

/// Extension trait attaching operation context to persistence errors.
pub trait StoreResultExt<T> {
    /// Wrap the error as [`AppError::StoreFailure`] naming `operation` and `entity`.
    fn store_context(self, operation: &'static str, entity: impl Display) -> Result<T, AppError>;
}

impl<T, E: Into<anyhow::Error>> StoreResultExt<T> for Result<T, E> {
    fn store_context(self, operation: &'static str, entity: impl Display) -> Result<T, AppError> {
        self.map_err(|e| AppError::store_failure(operation, entity, e))
    }
}
