//! Error types for the Tether framework.

use thiserror::Error;

use tether_core::{ApiError, Permissions};

use crate::context::HandlerKind;

pub use tower::BoxError;

/// Errors raised while populating a registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A handler of the same kind is already registered under this name.
    #[error("{kind} '{name}' is already registered")]
    DuplicateName { kind: HandlerKind, name: String },

    /// The handler declared an empty name.
    #[error("{kind} declared with an empty name")]
    EmptyName { kind: HandlerKind },

    /// The task's cron expression could not be parsed.
    #[error("task '{task}' has an invalid schedule '{expression}': {reason}")]
    InvalidSchedule {
        task: String,
        expression: String,
        reason: String,
    },
}

/// Errors raised while publishing a registry.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The platform refused to create a command.
    #[error("failed to create command '{name}': {source}")]
    Create { name: String, source: ApiError },

    /// Fewer stacks were compiled than were registered.
    #[error("compiled {received} of {expected} {kind} stacks")]
    Compile {
        kind: HandlerKind,
        expected: usize,
        received: usize,
    },
}

/// Errors raised while aggregating feature modules.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// A module failed to declare its stacks.
    #[error("module '{module}' failed to declare its {kind}s: {source}")]
    Declare {
        module: String,
        kind: HandlerKind,
        source: BoxError,
    },

    /// A module declared a stack the registry rejected.
    #[error("module '{module}' failed to register a {kind}: {source}")]
    Register {
        module: String,
        kind: HandlerKind,
        source: RegistryError,
    },

    /// Publishing the registry failed after all modules registered.
    #[error("failed to publish {kind}s: {source}")]
    Publish {
        kind: HandlerKind,
        source: PublishError,
    },
}

/// A panic caught at a dispatch boundary.
#[derive(Debug, Clone, Error)]
#[error("handler '{handler}' panicked: {message}")]
pub struct HandlerFault {
    /// Registered name of the handler.
    pub handler: String,
    /// The panic message, if it was a string.
    pub message: String,
    /// Source location of the panic, if the panic hook saw it.
    pub location: Option<String>,
    /// Backtrace captured when the panic was raised.
    pub backtrace: String,
}

/// Returned by [`PermissionMiddleware`](crate::middleware::PermissionMiddleware)
/// when the invoking member lacks the command's permission bits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing permissions {missing:#x} to use '{command}'")]
pub struct PermissionDenied {
    pub command: String,
    pub required: Permissions,
    pub missing: Permissions,
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for publish operations.
pub type PublishResult<T> = Result<T, PublishError>;
