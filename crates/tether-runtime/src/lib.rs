//! # Tether Runtime
//!
//! Bootstrap layer of the Tether bot engine:
//!
//! - layered configuration with figment ([`ConfigLoader`], [`TetherConfig`])
//! - subscriber setup for `tracing` ([`LoggingBuilder`])
//! - the [`TetherRuntime`], which publishes feature modules against a session
//!   and waits for a shutdown signal
//!
//! ```rust,ignore
//! use tether_runtime::{ConfigLoader, TetherRuntime};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().load()?;
//!     TetherRuntime::builder()
//!         .module(MyModule::new(&config))
//!         .config(config)
//!         .build(session)?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    BotConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig, Profile, SchedulerConfig,
    TetherConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, TetherRuntime};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
