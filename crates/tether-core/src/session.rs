//! The remote session boundary.
//!
//! [`Session`] is everything the engine needs from the messaging platform:
//! the remote command registry, reply delivery, and the two inbound dispatch
//! points (command interactions and typed notifications). Network clients
//! implement it; tests and the demo use [`MemorySession`](crate::MemorySession).

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::command::{CommandSchema, RemoteCommand};
use crate::error::ApiResult;
use crate::interaction::Interaction;
use crate::notification::{NotificationKind, Payload};
use crate::reply::Reply;

/// Callback invoked for every interaction targeting a bound command name.
pub type InteractionCallback =
    Arc<dyn Fn(SharedSession, Arc<Interaction>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callback invoked for every delivered notification of a bound kind.
pub type NotificationCallback =
    Arc<dyn Fn(SharedSession, Payload) -> BoxFuture<'static, ()> + Send + Sync>;

/// A connected session with the messaging platform.
///
/// # Binding semantics
///
/// - Binding a command name that is already bound replaces the earlier
///   callback.
/// - Any number of callbacks may be bound to the same notification kind.
///   A `once` binding is dropped after its first delivery.
/// - Creating a command whose name already exists remotely overwrites it.
#[async_trait]
pub trait Session: Send + Sync {
    /// Returns the application the commands are registered under.
    fn application_id(&self) -> &str;

    /// Lists the commands currently registered remotely.
    async fn list_commands(&self) -> ApiResult<Vec<RemoteCommand>>;

    /// Creates (or overwrites) a remote command.
    async fn create_command(&self, schema: &CommandSchema) -> ApiResult<RemoteCommand>;

    /// Deletes a remote command by ID.
    async fn delete_command(&self, id: &str) -> ApiResult<()>;

    /// Responds to an interaction.
    async fn respond(&self, interaction: &Interaction, reply: Reply) -> ApiResult<()>;

    /// Binds a callback to interactions for the named command.
    fn bind_command_dispatch(&self, name: &str, callback: InteractionCallback);

    /// Binds a callback to notifications of the given kind.
    fn bind_notification(&self, kind: NotificationKind, once: bool, callback: NotificationCallback);

    /// Returns self as an `Arc<dyn Any>` for safe downcasting.
    ///
    /// Implementors should simply return `self`.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A shared session trait object.
pub type SharedSession = Arc<dyn Session>;

/// Attempts to downcast a shared session to a concrete type.
pub fn downcast_session<T: Session + 'static>(session: SharedSession) -> Option<Arc<T>> {
    Arc::downcast::<T>(session.as_any()).ok()
}
