//! Request-style commands and their registry.
//!
//! A [`Command`] declares a [`CommandSchema`] and executes interactions for
//! it. Commands are registered into the [`CommandManager`] as
//! [`CommandStack`]s: the command plus its middleware. Publishing reconciles
//! the local registry with the platform:
//!
//! 1. **Flush**: remote commands without a local counterpart are deleted.
//! 2. **Compile**: every stack is compiled on its own task.
//! 3. **Publish**: each compiled stack is created remotely, one at a time,
//!    and bound to the session's dispatch for its name.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Ping;
//!
//! #[async_trait]
//! impl Command for Ping {
//!     fn data(&self) -> CommandSchema {
//!         CommandSchema::new("ping", "Check that the bot is alive")
//!     }
//!
//!     async fn execute(&self, invocation: Invocation<Interaction>) -> Result<(), BoxError> {
//!         invocation.session.respond(&invocation.event, Reply::text("Pong!")).await?;
//!         Ok(())
//!     }
//! }
//!
//! let mut commands = CommandManager::new();
//! commands.register_stack(CommandStack::new(Ping).with(RecoverMiddleware::default()))?;
//! commands.publish(session).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, info, warn};

use tether_core::{CommandSchema, Interaction, InteractionCallback, RemoteCommand, SharedSession};

use crate::context::{HandlerKind, Invocation};
use crate::error::{BoxError, PublishError, PublishResult, RegistryError, RegistryResult};
use crate::guard::invoke_guarded;
use crate::stack::{Chain, Middleware, chain_fn, compile, spawn_compilers};

// ============================================================================
// Command
// ============================================================================

/// A request-style handler.
#[async_trait]
pub trait Command: Send + Sync + 'static {
    /// Returns the command's schema. Called once, when the stack is built.
    fn data(&self) -> CommandSchema;

    /// Handles one interaction.
    async fn execute(&self, invocation: Invocation<Interaction>) -> Result<(), BoxError>;
}

/// Middleware over command chains.
pub type CommandMiddleware = dyn Middleware<dyn Command, Interaction>;

// ============================================================================
// CommandStack
// ============================================================================

/// A command together with its ordered middleware.
pub struct CommandStack {
    command: Arc<dyn Command>,
    schema: CommandSchema,
    middleware: Vec<Arc<CommandMiddleware>>,
}

impl CommandStack {
    pub fn new(command: impl Command) -> Self {
        Self::from_arc(Arc::new(command))
    }

    pub fn from_arc(command: Arc<dyn Command>) -> Self {
        let schema = command.data();
        Self {
            command,
            schema,
            middleware: Vec::new(),
        }
    }

    /// Appends a middleware. Earlier middleware wrap later ones.
    pub fn with(mut self, middleware: impl Middleware<dyn Command, Interaction>) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends shared middleware, in order.
    pub fn with_all(mut self, middleware: impl IntoIterator<Item = Arc<CommandMiddleware>>) -> Self {
        self.middleware.extend(middleware);
        self
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &CommandSchema {
        &self.schema
    }

    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    /// Compiles the stack into a chain.
    pub fn compile(&self) -> Chain<Interaction> {
        let command = self.command.clone();
        let base = chain_fn(move |invocation| {
            let command = command.clone();
            async move { command.execute(invocation).await }
        });
        compile(&self.command, &self.middleware, base)
    }
}

impl std::fmt::Debug for CommandStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandStack")
            .field("name", &self.schema.name)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

// ============================================================================
// CommandManager
// ============================================================================

/// What a flush did to the remote registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Number of remote commands listed.
    pub fetched: usize,
    /// Commands deleted because no local stack claims their name.
    pub deleted: Vec<RemoteCommand>,
    /// Commands whose deletion failed.
    pub failed: Vec<RemoteCommand>,
}

/// The registry of request-style commands.
#[derive(Default)]
pub struct CommandManager {
    stacks: HashMap<String, Arc<CommandStack>>,
}

impl CommandManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command with the given middleware.
    pub fn register_command(
        &mut self,
        command: impl Command,
        middleware: impl IntoIterator<Item = Arc<CommandMiddleware>>,
    ) -> RegistryResult<()> {
        self.register_stack(CommandStack::new(command).with_all(middleware))
    }

    /// Registers a stack under its schema name.
    ///
    /// Fails without modifying the registry if the name is empty or taken.
    pub fn register_stack(&mut self, stack: CommandStack) -> RegistryResult<()> {
        let name = stack.name();
        if name.is_empty() {
            return Err(RegistryError::EmptyName {
                kind: HandlerKind::Command,
            });
        }
        if self.stacks.contains_key(name) {
            return Err(RegistryError::DuplicateName {
                kind: HandlerKind::Command,
                name: name.to_string(),
            });
        }

        debug!(command = %name, middleware = stack.middleware_count(), "Registered command");
        self.stacks.insert(name.to_string(), Arc::new(stack));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stacks.contains_key(name)
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stacks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Deletes every remote command whose name is not registered locally.
    ///
    /// Never fails: a list failure is treated as an empty remote registry and
    /// a delete failure is recorded in the report.
    pub async fn flush(&self, session: &SharedSession) -> FlushReport {
        let remote = match session.list_commands().await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, "Failed to list remote commands, skipping flush");
                return FlushReport::default();
            }
        };

        let mut report = FlushReport {
            fetched: remote.len(),
            ..FlushReport::default()
        };

        for command in remote {
            if self.stacks.contains_key(&command.name) {
                continue;
            }
            match session.delete_command(&command.id).await {
                Ok(()) => {
                    info!(command = %command.name, id = %command.id, "Deleted stale remote command");
                    report.deleted.push(command);
                }
                Err(e) => {
                    warn!(command = %command.name, id = %command.id, error = %e, "Failed to delete remote command");
                    report.failed.push(command);
                }
            }
        }

        report
    }

    /// Flushes, compiles and publishes every registered command.
    ///
    /// The only fatal failure is the platform refusing to create a command.
    pub async fn publish(&self, session: SharedSession) -> PublishResult<()> {
        let report = self.flush(&session).await;

        let stacks: Vec<Arc<CommandStack>> = self.stacks.values().cloned().collect();
        let (mut compiled, expected) = spawn_compilers(stacks, |stack: Arc<CommandStack>| {
            let chain = stack.compile();
            (stack, chain)
        });

        let mut received = 0;
        while let Some((stack, chain)) = compiled.recv().await {
            received += 1;
            let remote = session
                .create_command(stack.schema())
                .await
                .map_err(|source| PublishError::Create {
                    name: stack.name().to_string(),
                    source,
                })?;

            session.bind_command_dispatch(stack.name(), dispatch(stack.name(), chain));
            debug!(command = %stack.name(), id = %remote.id, "Published command");
        }

        if received != expected {
            return Err(PublishError::Compile {
                kind: HandlerKind::Command,
                expected,
                received,
            });
        }

        info!(
            published = received,
            deleted = report.deleted.len(),
            "Commands published"
        );
        Ok(())
    }
}

/// Builds the session callback for one compiled command.
fn dispatch(name: &str, chain: Chain<Interaction>) -> InteractionCallback {
    let name: Arc<str> = Arc::from(name);
    Arc::new(move |session: SharedSession, interaction: Arc<Interaction>| {
        let name = name.clone();
        let chain = chain.clone();
        async move {
            if interaction.command_name != *name {
                return;
            }
            let invocation = Invocation::new(HandlerKind::Command, name, session, interaction);
            invoke_guarded(chain, invocation).await;
        }
        .boxed()
    })
}

impl std::fmt::Debug for CommandManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandManager")
            .field("commands", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tether_core::{ApiError, MemorySession, Reply};
    use tokio_test::assert_ok;

    use super::*;

    struct Echo {
        name: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl Echo {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                calls: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl Command for Echo {
        fn data(&self) -> CommandSchema {
            CommandSchema::new(self.name, "Echo")
        }

        async fn execute(&self, invocation: Invocation<Interaction>) -> Result<(), BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            invocation
                .session
                .respond(&invocation.event, Reply::text(self.name))
                .await?;
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_registration_leaves_registry_unchanged() {
        let mut manager = CommandManager::new();
        assert_ok!(manager.register_stack(CommandStack::new(Echo::new("ping"))));

        let err = manager
            .register_stack(CommandStack::new(Echo::new("ping")))
            .unwrap_err();

        assert_eq!(
            err,
            RegistryError::DuplicateName {
                kind: HandlerKind::Command,
                name: "ping".into()
            }
        );
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut manager = CommandManager::new();
        let err = manager.register_command(Echo::new(""), []).unwrap_err();

        assert_eq!(err, RegistryError::EmptyName { kind: HandlerKind::Command });
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_flush_tolerates_list_failure() {
        let session = MemorySession::new("app");
        session.seed_command("stale");
        session.fail_list_with(ApiError::Timeout);

        let report = CommandManager::new().flush(&(session.clone() as SharedSession)).await;

        assert_eq!(report, FlushReport::default());
        assert_eq!(session.remote_names(), vec!["stale"]);
    }

    #[tokio::test]
    async fn test_flush_records_failed_deletes() {
        let session = MemorySession::new("app");
        session.seed_command("stale");
        session.fail_delete_with(ApiError::remote(10063, "Unknown application command"));

        let report = CommandManager::new().flush(&(session.clone() as SharedSession)).await;

        assert_eq!(report.fetched, 1);
        assert!(report.deleted.is_empty());
        assert_eq!(report.failed[0].name, "stale");
    }

    #[tokio::test]
    async fn test_publish_binds_dispatch() {
        let session = MemorySession::new("app");
        let echo = Echo::new("echo");
        let calls = echo.calls.clone();

        let mut manager = CommandManager::new();
        manager.register_stack(CommandStack::new(echo)).unwrap();
        assert_ok!(manager.publish(session.clone()).await);

        assert!(session.is_command_bound("echo"));
        assert!(session.deliver(Interaction::new("1", "echo")).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.replies()[0].reply, Reply::text("echo"));
    }

    #[tokio::test]
    async fn test_create_failure_aborts_publish() {
        let session = MemorySession::new("app");
        session.fail_create_for("broken", ApiError::remote(50035, "Invalid Form Body"));

        let mut manager = CommandManager::new();
        manager.register_stack(CommandStack::new(Echo::new("broken"))).unwrap();
        let err = manager.publish(session.clone()).await.unwrap_err();

        assert!(matches!(err, PublishError::Create { ref name, .. } if name == "broken"));
        assert!(!session.is_command_bound("broken"));
    }
}
