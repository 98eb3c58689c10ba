//! Layered configuration for the Tether runtime.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    BotConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SchedulerConfig,
    SpanEventConfig, TetherConfig,
};
pub use validation::validate_config;
