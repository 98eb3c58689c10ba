//! Unified error types for the Tether platform model.
//!
//! Engine-level errors (registration, publishing, module aggregation) are
//! defined in `tether-framework`.

use thiserror::Error;

use crate::command::OptionKind;

// =============================================================================
// API Errors
// =============================================================================

/// Error type for calls across the remote session boundary.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The session is not connected.
    #[error("session is not connected")]
    NotConnected,
    /// The API call timed out.
    #[error("API call timed out")]
    Timeout,
    /// The platform rejected the call.
    #[error("API error ({code}): {message}")]
    Remote { code: i64, message: String },
    /// The referenced remote command does not exist.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    /// Failed to serialize/deserialize.
    #[error("serialization error: {0}")]
    SerializationError(String),
    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Creates a platform rejection error.
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

// =============================================================================
// Option Errors
// =============================================================================

/// Errors returned by the interaction option lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    /// No option with the requested name was supplied.
    #[error("option '{0}' not found")]
    NotFound(String),

    /// The option exists but carries a different value type.
    #[error("option '{name}' has unexpected type: expected {expected}, got {got}")]
    UnexpectedType {
        name: String,
        expected: OptionKind,
        got: OptionKind,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for option lookups.
pub type OptionResult<T> = Result<T, OptionError>;
