//! Error taxonomy shared by every component of the tool-execution runtime.
//!
//! [`ErrorType`] drives recovery eligibility (see `toolrunner-core::recovery`):
//! `VALIDATION`, `SECURITY`, and `INTERNAL` failures are always terminal;
//! `FILE_NOT_FOUND`, `PERMISSION`, `TIMEOUT`, `NETWORK`, and `RESOURCE`
//! failures are candidates for recovery.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of why a tool invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    /// Malformed or missing arguments, unknown tool, schema mismatch.
    Validation,
    /// Path escape, forbidden command pattern, unauthorized operation.
    Security,
    /// The referenced path does not exist.
    FileNotFound,
    /// The process lacks permission to perform the operation.
    Permission,
    /// The operation did not complete within its allotted budget.
    Timeout,
    /// Transient connectivity failure to an external dependency.
    Network,
    /// Exhausted memory, file descriptors, disk space, or a rate limit.
    Resource,
    /// A bug in tool or runtime logic (panics caught at the boundary).
    Internal,
}

impl ErrorType {
    /// Whether a failure of this type is ever eligible for automated recovery.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorType::Validation | ErrorType::Security | ErrorType::Internal)
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorType::Validation => "VALIDATION",
            ErrorType::Security => "SECURITY",
            ErrorType::FileNotFound => "FILE_NOT_FOUND",
            ErrorType::Permission => "PERMISSION",
            ErrorType::Timeout => "TIMEOUT",
            ErrorType::Network => "NETWORK",
            ErrorType::Resource => "RESOURCE",
            ErrorType::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// Structured error carrying an [`ErrorType`] alongside the usual message.
///
/// Call sites that need the taxonomy (registry validation, the sanitizer,
/// the recovery module) should return `RuntimeError`; tool bodies that only
/// need to propagate failure can keep using `anyhow::Result` and convert at
/// the boundary via `thiserror`'s `std::error::Error` impl.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("security violation: {message}")]
    Security { message: String },

    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("permission denied: {message}")]
    Permission { message: String },

    #[error("operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("resource exhausted: {message}")]
    Resource { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("tool not found: {0}")]
    UnknownTool(String),

    #[error("no recovery strategy succeeded after {attempts} attempts")]
    RecoveryExhausted { attempts: u32 },
}

impl RuntimeError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            RuntimeError::Validation { .. } | RuntimeError::UnknownTool(_) => ErrorType::Validation,
            RuntimeError::Security { .. } => ErrorType::Security,
            RuntimeError::FileNotFound { .. } => ErrorType::FileNotFound,
            RuntimeError::Permission { .. } => ErrorType::Permission,
            RuntimeError::Timeout { .. } => ErrorType::Timeout,
            RuntimeError::Network { .. } => ErrorType::Network,
            RuntimeError::Resource { .. } => ErrorType::Resource,
            RuntimeError::Internal { .. } | RuntimeError::RecoveryExhausted { .. } => ErrorType::Internal,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        RuntimeError::Validation { message: message.into() }
    }

    pub fn security(message: impl Into<String>) -> Self {
        RuntimeError::Security { message: message.into() }
    }

    pub fn file_not_found(path: impl Into<String>) -> Self {
        RuntimeError::FileNotFound { path: path.into() }
    }

    pub fn permission(message: impl Into<String>) -> Self {
        RuntimeError::Permission { message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        RuntimeError::Network { message: message.into() }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        RuntimeError::Resource { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RuntimeError::Internal { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_security_internal_are_never_recoverable() {
        assert!(!ErrorType::Validation.is_recoverable());
        assert!(!ErrorType::Security.is_recoverable());
        assert!(!ErrorType::Internal.is_recoverable());
    }

    #[test]
    fn the_other_five_types_are_recoverable() {
        assert!(ErrorType::FileNotFound.is_recoverable());
        assert!(ErrorType::Permission.is_recoverable());
        assert!(ErrorType::Timeout.is_recoverable());
        assert!(ErrorType::Network.is_recoverable());
        assert!(ErrorType::Resource.is_recoverable());
    }

    #[test]
    fn runtime_error_maps_to_expected_error_type() {
        assert_eq!(RuntimeError::validation("x").error_type(), ErrorType::Validation);
        assert_eq!(RuntimeError::security("x").error_type(), ErrorType::Security);
        assert_eq!(
            RuntimeError::Timeout { elapsed_ms: 10 }.error_type(),
            ErrorType::Timeout
        );
    }
}
