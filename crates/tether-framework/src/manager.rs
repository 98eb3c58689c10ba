//! Feature modules and their aggregation.
//!
//! A [`Module`] groups related commands, events and tasks. The
//! [`ModuleManager`] asks every registered module for its stacks of one kind,
//! registers them all into the matching registry and then publishes that
//! registry exactly once:
//!
//! ```text
//! on_events ──▶ EventManager   ──▶ bind notification slots
//! on_commands ─▶ CommandManager ─▶ flush, create, bind dispatch
//! on_tasks ───▶ TaskManager    ──▶ add triggers, start scheduler
//! ```
//!
//! Any failure aborts the phase with a [`ModuleError`] naming the module.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use tether_core::SharedSession;

use crate::command::{CommandManager, CommandStack};
use crate::context::HandlerKind;
use crate::error::{BoxError, ModuleError, PublishResult, RegistryResult};
use crate::event::{AnyEventStack, EventManager};
use crate::task::{TaskManager, TaskStack};

// =============================================================================
// Module
// =============================================================================

/// A feature module.
///
/// Each declaration method is called once at startup. The defaults declare
/// nothing.
pub trait Module: Send + Sync {
    /// Name used in errors and log fields.
    fn name(&self) -> &str;

    fn events(&self) -> Result<Vec<AnyEventStack>, BoxError> {
        Ok(Vec::new())
    }

    fn commands(&self) -> Result<Vec<CommandStack>, BoxError> {
        Ok(Vec::new())
    }

    fn tasks(&self) -> Result<Vec<TaskStack>, BoxError> {
        Ok(Vec::new())
    }
}

// =============================================================================
// StackRegistry
// =============================================================================

/// The register-then-publish lifecycle shared by the three registries.
#[async_trait]
pub trait StackRegistry: Send + Sync {
    type Stack: Send;

    const KIND: HandlerKind;

    fn register_stack(&mut self, stack: Self::Stack) -> RegistryResult<()>;

    async fn publish(&self, session: SharedSession) -> PublishResult<()>;
}

#[async_trait]
impl StackRegistry for CommandManager {
    type Stack = CommandStack;

    const KIND: HandlerKind = HandlerKind::Command;

    fn register_stack(&mut self, stack: CommandStack) -> RegistryResult<()> {
        CommandManager::register_stack(self, stack)
    }

    async fn publish(&self, session: SharedSession) -> PublishResult<()> {
        CommandManager::publish(self, session).await
    }
}

#[async_trait]
impl StackRegistry for EventManager {
    type Stack = AnyEventStack;

    const KIND: HandlerKind = HandlerKind::Event;

    fn register_stack(&mut self, stack: AnyEventStack) -> RegistryResult<()> {
        EventManager::register_stack(self, stack)
    }

    async fn publish(&self, session: SharedSession) -> PublishResult<()> {
        EventManager::publish(self, session).await
    }
}

#[async_trait]
impl StackRegistry for TaskManager {
    type Stack = TaskStack;

    const KIND: HandlerKind = HandlerKind::Task;

    fn register_stack(&mut self, stack: TaskStack) -> RegistryResult<()> {
        TaskManager::register_stack(self, stack)
    }

    async fn publish(&self, session: SharedSession) -> PublishResult<()> {
        TaskManager::publish(self, session).await
    }
}

// =============================================================================
// ModuleManager
// =============================================================================

/// Aggregates feature modules into the registries.
#[derive(Default)]
pub struct ModuleManager {
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_module(&mut self, module: impl Module + 'static) {
        self.modules.push(Arc::new(module));
    }

    /// Appends modules. Duplicates are not detected here; duplicate handler
    /// names are still rejected by the registries.
    pub fn register_modules(&mut self, modules: impl IntoIterator<Item = Arc<dyn Module>>) {
        self.modules.extend(modules);
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    pub async fn on_events(
        &self,
        session: SharedSession,
        registry: &mut EventManager,
    ) -> Result<(), ModuleError> {
        self.aggregate(session, registry, |module| module.events())
            .await
    }

    pub async fn on_commands(
        &self,
        session: SharedSession,
        registry: &mut CommandManager,
    ) -> Result<(), ModuleError> {
        self.aggregate(session, registry, |module| module.commands())
            .await
    }

    pub async fn on_tasks(
        &self,
        session: SharedSession,
        registry: &mut TaskManager,
    ) -> Result<(), ModuleError> {
        self.aggregate(session, registry, |module| module.tasks())
            .await
    }

    async fn aggregate<R, F>(
        &self,
        session: SharedSession,
        registry: &mut R,
        declare: F,
    ) -> Result<(), ModuleError>
    where
        R: StackRegistry,
        F: Fn(&dyn Module) -> Result<Vec<R::Stack>, BoxError> + Send,
    {
        for module in &self.modules {
            let stacks = declare(module.as_ref()).map_err(|source| ModuleError::Declare {
                module: module.name().to_string(),
                kind: R::KIND,
                source,
            })?;

            let declared = stacks.len();
            for stack in stacks {
                registry
                    .register_stack(stack)
                    .map_err(|source| ModuleError::Register {
                        module: module.name().to_string(),
                        kind: R::KIND,
                        source,
                    })?;
            }
            debug!(module = %module.name(), kind = %R::KIND, declared, "Registered module stacks");
        }

        registry
            .publish(session)
            .await
            .map_err(|source| ModuleError::Publish {
                kind: R::KIND,
                source,
            })?;

        info!(modules = self.modules.len(), kind = %R::KIND, "Module stacks published");
        Ok(())
    }
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManager")
            .field("modules", &self.module_names())
            .finish()
    }
}
