//! Runtime error types.

use thiserror::Error;

use tether_framework::ModuleError;

use crate::config::ConfigError;

/// Errors that can occur while bootstrapping or running the engine.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating the configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A module could not be declared, registered or published.
    #[error(transparent)]
    Module(#[from] ModuleError),

    /// Listening for shutdown signals failed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),

    /// [`TetherRuntime::start`](crate::TetherRuntime::start) was called twice.
    #[error("Runtime already started")]
    AlreadyStarted,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
