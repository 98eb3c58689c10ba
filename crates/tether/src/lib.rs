//! # Tether
//!
//! A registration and dispatch engine for chat bots.
//!
//! Feature modules declare commands, events and tasks. Each handler is wrapped
//! in an ordered list of middleware, compiled into a single call chain and
//! published to the platform: commands are reconciled against the remote
//! command registry, events are bound to notification delivery and tasks are
//! handed to a cron scheduler.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   declare   ┌───────────────┐  register  ┌────────────────┐  publish  ┌─────────┐
//! │ Module A │────────────▶│               │───────────▶│ EventManager   │──────────▶│         │
//! │ Module B │────────────▶│ ModuleManager │───────────▶│ CommandManager │──────────▶│ Session │
//! │ ...      │────────────▶│               │───────────▶│ TaskManager    │──▶ Scheduler       │
//! └──────────┘             └───────────────┘            └────────────────┘           └─────────┘
//! ```
//!
//! - **Core** ([`core`]): the platform model and the [`Session`](core::Session) boundary
//! - **Framework** ([`framework`]): stacks, middleware, registries and the scheduler
//! - **Runtime** ([`runtime`]): configuration, logging and bootstrap
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether::prelude::*;
//!
//! struct Ping;
//!
//! #[async_trait]
//! impl Command for Ping {
//!     fn data(&self) -> CommandSchema {
//!         CommandSchema::new("ping", "Checks the bot is alive")
//!     }
//!
//!     async fn execute(&self, invocation: Invocation<Interaction>) -> Result<(), BoxError> {
//!         invocation.session.respond(&invocation.event, Reply::text("Pong!")).await?;
//!         Ok(())
//!     }
//! }
//!
//! struct Core;
//!
//! impl Module for Core {
//!     fn name(&self) -> &str {
//!         "core"
//!     }
//!
//!     fn commands(&self) -> Result<Vec<CommandStack>, BoxError> {
//!         Ok(vec![CommandStack::new(Ping).with(RecoverMiddleware::new())])
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     TetherRuntime::builder().module(Core).build(session)?.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use tether_core as core;
pub use tether_framework as framework;
pub use tether_runtime as runtime;

/// Commonly used types for writing feature modules.
///
/// ```rust,ignore
/// use tether::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use tether_runtime::{ConfigLoader, TetherConfig, TetherRuntime};

    // Handlers and their declarations
    pub use tether_framework::{
        Command, Event, EventData, Invocation, Module, Task, TaskData, Tick,
    };

    // Stacks and middleware
    pub use tether_framework::{
        BoxError, Chain, CommandStack, EventStack, LayerMiddleware, LoggingMiddleware,
        Middleware, PermissionMiddleware, RecoverMiddleware, TaskStack, middleware_fn,
    };

    // Platform model
    pub use tether_core::{
        CommandSchema, Embed, Interaction, MessageCreate, OptionKind, OptionLookup, OptionSchema,
        Ready, Reply, SharedSession, async_trait, permissions,
    };
}
