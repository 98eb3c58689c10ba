//! # Tether Framework
//!
//! The registration and dispatch engine of the Tether bot engine.
//!
//! Feature code is written as handlers of three kinds, each wrapped in an
//! ordered list of middleware to form a *stack*:
//!
//! | Kind    | Trait       | Payload            | Registry           |
//! |---------|-------------|--------------------|--------------------|
//! | Command | [`Command`] | [`Interaction`]    | [`CommandManager`] |
//! | Event   | [`Event`]   | any [`Notification`] | [`EventManager`] |
//! | Task    | [`Task`]    | [`Tick`]           | [`TaskManager`]    |
//!
//! Registries collect stacks, then *publish* them against a
//! [`Session`](tether_core::Session): every stack is compiled into a single
//! [`Chain`] and bound to the platform (commands), to a notification slot
//! (events) or to the [`Scheduler`] (tasks). [`ModuleManager`] gathers stacks
//! from feature [`Module`]s and drives the three publish phases.
//!
//! Every invocation runs behind a fault boundary: an error or a panic in one
//! handler is logged and never reaches the session's dispatch loop.
//!
//! [`Interaction`]: tether_core::Interaction
//! [`Notification`]: tether_core::Notification

pub mod command;
pub mod context;
pub mod error;
pub mod event;
pub mod guard;
pub mod manager;
pub mod middleware;
pub mod scheduler;
pub mod stack;
pub mod task;

pub use command::{Command, CommandManager, CommandMiddleware, CommandStack, FlushReport};
pub use context::{HandlerKind, Invocation, InvocationContext};
pub use error::{
    BoxError, HandlerFault, ModuleError, PermissionDenied, PublishError, PublishResult,
    RegistryError, RegistryResult,
};
pub use event::{AnyEventStack, Event, EventData, EventManager, EventMiddleware, EventStack, compile_event};
pub use guard::{FaultBoundary, Outcome, invoke_guarded};
pub use manager::{Module, ModuleManager, StackRegistry};
pub use middleware::{LoggingMiddleware, PermissionMiddleware, RecoverMiddleware};
pub use scheduler::{Job, Scheduler, Tick, Trigger, parse_schedule};
pub use stack::{Chain, FnMiddleware, LayerMiddleware, Middleware, chain_fn, compile, middleware_fn};
pub use task::{Task, TaskData, TaskManager, TaskMiddleware, TaskStack};
