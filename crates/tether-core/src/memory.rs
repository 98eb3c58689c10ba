//! An in-process [`Session`] implementation.
//!
//! `MemorySession` keeps the remote command registry and all bindings in
//! memory. It is the test double for the platform and drives the demo bot:
//! callers push interactions with [`deliver`](MemorySession::deliver) and
//! notifications with [`notify`](MemorySession::notify), and can inject
//! failures into the remote registry calls.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::command::{CommandSchema, RemoteCommand};
use crate::error::{ApiError, ApiResult};
use crate::interaction::Interaction;
use crate::notification::{Notification, NotificationKind, Payload};
use crate::reply::Reply;
use crate::session::{InteractionCallback, NotificationCallback, Session, SharedSession};

/// A reply recorded by [`MemorySession::respond`].
#[derive(Debug, Clone)]
pub struct RecordedReply {
    pub interaction_id: String,
    pub command_name: String,
    pub reply: Reply,
}

struct NotificationBinding {
    kind: NotificationKind,
    once: bool,
    callback: NotificationCallback,
}

#[derive(Default)]
struct State {
    commands: Vec<RemoteCommand>,
    next_id: u64,
    command_bindings: HashMap<String, InteractionCallback>,
    notification_bindings: Vec<NotificationBinding>,
    replies: Vec<RecordedReply>,
    created: Vec<String>,
    deleted: Vec<RemoteCommand>,
    fail_list: Option<ApiError>,
    fail_create: HashMap<String, ApiError>,
    fail_delete: Option<ApiError>,
}

impl State {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn upsert(&mut self, name: &str) -> RemoteCommand {
        if let Some(existing) = self.commands.iter().find(|c| c.name == name) {
            return existing.clone();
        }
        let command = RemoteCommand {
            id: self.allocate_id(),
            name: name.to_string(),
        };
        self.commands.push(command.clone());
        command
    }
}

/// An in-memory session with the platform.
pub struct MemorySession {
    application_id: String,
    state: Mutex<State>,
}

impl MemorySession {
    pub fn new(application_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            application_id: application_id.into(),
            state: Mutex::new(State::default()),
        })
    }

    // ─── Remote registry ───────────────────────────────────────────────

    /// Registers a command remotely without recording it as created.
    pub fn seed_command(&self, name: impl AsRef<str>) -> RemoteCommand {
        self.state.lock().upsert(name.as_ref())
    }

    /// Returns the names of all remote commands, sorted.
    pub fn remote_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .commands
            .iter()
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn remote_commands(&self) -> Vec<RemoteCommand> {
        self.state.lock().commands.clone()
    }

    /// Names passed to `create_command`, in call order.
    pub fn created(&self) -> Vec<String> {
        self.state.lock().created.clone()
    }

    /// Commands removed by `delete_command`, in call order.
    pub fn deleted(&self) -> Vec<RemoteCommand> {
        self.state.lock().deleted.clone()
    }

    /// Clears the created/deleted history.
    pub fn clear_history(&self) {
        let mut state = self.state.lock();
        state.created.clear();
        state.deleted.clear();
    }

    // ─── Failure injection ─────────────────────────────────────────────

    /// Makes every `list_commands` call fail.
    pub fn fail_list_with(&self, error: ApiError) {
        self.state.lock().fail_list = Some(error);
    }

    /// Makes `create_command` fail for the named command.
    pub fn fail_create_for(&self, name: impl Into<String>, error: ApiError) {
        self.state.lock().fail_create.insert(name.into(), error);
    }

    /// Makes every `delete_command` call fail.
    pub fn fail_delete_with(&self, error: ApiError) {
        self.state.lock().fail_delete = Some(error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_list = None;
        state.fail_create.clear();
        state.fail_delete = None;
    }

    // ─── Bindings ──────────────────────────────────────────────────────

    pub fn is_command_bound(&self, name: &str) -> bool {
        self.state.lock().command_bindings.contains_key(name)
    }

    /// Returns how many callbacks are bound to notifications of type `T`.
    pub fn notification_bindings<T: Notification>(&self) -> usize {
        let kind = NotificationKind::of::<T>();
        self.state
            .lock()
            .notification_bindings
            .iter()
            .filter(|b| b.kind == kind)
            .count()
    }

    /// Replies recorded so far.
    pub fn replies(&self) -> Vec<RecordedReply> {
        self.state.lock().replies.clone()
    }

    // ─── Inbound delivery ──────────────────────────────────────────────

    /// Delivers an interaction to the callback bound to its command name.
    ///
    /// Returns `false` if no callback is bound.
    pub async fn deliver(self: &Arc<Self>, interaction: Interaction) -> bool {
        let callback = self
            .state
            .lock()
            .command_bindings
            .get(&interaction.command_name)
            .cloned();

        match callback {
            Some(callback) => {
                trace!(command = %interaction.command_name, "Delivering interaction");
                callback(self.shared(), Arc::new(interaction)).await;
                true
            }
            None => {
                debug!(command = %interaction.command_name, "No dispatch bound for interaction");
                false
            }
        }
    }

    /// Delivers a notification to every callback bound to its type.
    ///
    /// `once` bindings are removed before they run. Returns the number of
    /// callbacks invoked.
    pub async fn notify<T: Notification>(self: &Arc<Self>, notification: T) -> usize {
        let kind = NotificationKind::of::<T>();
        let callbacks: Vec<NotificationCallback> = {
            let mut state = self.state.lock();
            let callbacks = state
                .notification_bindings
                .iter()
                .filter(|b| b.kind == kind)
                .map(|b| b.callback.clone())
                .collect();
            state
                .notification_bindings
                .retain(|b| !(b.once && b.kind == kind));
            callbacks
        };

        trace!(notification = %kind, bindings = callbacks.len(), "Delivering notification");
        let payload: Payload = Arc::new(notification);
        for callback in &callbacks {
            callback(self.shared(), payload.clone()).await;
        }
        callbacks.len()
    }

    fn shared(self: &Arc<Self>) -> SharedSession {
        self.clone()
    }
}

#[async_trait]
impl Session for MemorySession {
    fn application_id(&self) -> &str {
        &self.application_id
    }

    async fn list_commands(&self) -> ApiResult<Vec<RemoteCommand>> {
        let state = self.state.lock();
        if let Some(error) = &state.fail_list {
            return Err(error.clone());
        }
        Ok(state.commands.clone())
    }

    async fn create_command(&self, schema: &CommandSchema) -> ApiResult<RemoteCommand> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_create.get(&schema.name) {
            return Err(error.clone());
        }
        state.created.push(schema.name.clone());
        Ok(state.upsert(&schema.name))
    }

    async fn delete_command(&self, id: &str) -> ApiResult<()> {
        let mut state = self.state.lock();
        if let Some(error) = &state.fail_delete {
            return Err(error.clone());
        }
        let position = state
            .commands
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ApiError::UnknownCommand(id.to_string()))?;
        let removed = state.commands.remove(position);
        state.deleted.push(removed);
        Ok(())
    }

    async fn respond(&self, interaction: &Interaction, reply: Reply) -> ApiResult<()> {
        self.state.lock().replies.push(RecordedReply {
            interaction_id: interaction.id.clone(),
            command_name: interaction.command_name.clone(),
            reply,
        });
        Ok(())
    }

    fn bind_command_dispatch(&self, name: &str, callback: InteractionCallback) {
        self.state
            .lock()
            .command_bindings
            .insert(name.to_string(), callback);
    }

    fn bind_notification(&self, kind: NotificationKind, once: bool, callback: NotificationCallback) {
        self.state.lock().notification_bindings.push(NotificationBinding {
            kind,
            once,
            callback,
        });
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;
    use tokio_test::assert_ok;

    use super::*;
    use crate::notification::Ready;
    use crate::session::downcast_session;

    fn ready() -> Ready {
        Ready {
            user_id: "1".into(),
            username: "tether".into(),
            guilds: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_is_upsert() {
        let session = MemorySession::new("app");
        let first = assert_ok!(session.create_command(&CommandSchema::new("ping", "")).await);
        let second = assert_ok!(session.create_command(&CommandSchema::new("ping", "")).await);

        assert_eq!(first, second);
        assert_eq!(session.remote_names(), vec!["ping"]);
        assert_eq!(session.created(), vec!["ping", "ping"]);
    }

    #[tokio::test]
    async fn test_delete_unknown_command() {
        let session = MemorySession::new("app");
        let result = session.delete_command("404").await;

        assert!(matches!(result, Err(ApiError::UnknownCommand(id)) if id == "404"));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let session = MemorySession::new("app");
        session.fail_list_with(ApiError::Timeout);
        session.fail_create_for("bad", ApiError::remote(50035, "Invalid Form Body"));

        assert!(session.list_commands().await.is_err());
        assert!(session.create_command(&CommandSchema::new("bad", "")).await.is_err());
        assert_ok!(session.create_command(&CommandSchema::new("good", "")).await);

        session.clear_failures();
        assert_eq!(session.list_commands().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rebinding_replaces_dispatch() {
        let session = MemorySession::new("app");
        let hits = Arc::new(AtomicUsize::new(0));

        for weight in [1, 10] {
            let hits = hits.clone();
            session.bind_command_dispatch(
                "ping",
                Arc::new(move |_, _| {
                    hits.fetch_add(weight, Ordering::SeqCst);
                    async {}.boxed()
                }),
            );
        }

        assert!(session.deliver(Interaction::new("1", "ping")).await);
        assert!(!session.deliver(Interaction::new("2", "pong")).await);
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_once_notification_binding_is_dropped() {
        let session = MemorySession::new("app");
        let hits = Arc::new(AtomicUsize::new(0));

        for once in [true, false] {
            let hits = hits.clone();
            session.bind_notification(
                NotificationKind::of::<Ready>(),
                once,
                Arc::new(move |_, payload: Payload| {
                    assert!(payload.downcast::<Ready>().is_ok());
                    hits.fetch_add(1, Ordering::SeqCst);
                    async {}.boxed()
                }),
            );
        }

        assert_eq!(session.notify(ready()).await, 2);
        assert_eq!(session.notify(ready()).await, 1);
        assert_eq!(session.notification_bindings::<Ready>(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_downcast_shared_session() {
        let shared: SharedSession = MemorySession::new("app");
        let concrete = downcast_session::<MemorySession>(shared).unwrap();

        assert_eq!(concrete.application_id(), "app");
    }
}
