//! Time-triggered handlers and their registry.
//!
//! A [`Task`] declares a name and a cron expression. The expression is parsed
//! when the stack is registered, so a malformed schedule is rejected before
//! anything reaches the [`Scheduler`]. Publishing compiles every stack, adds
//! one trigger per task and starts the scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cron::Schedule;
use futures::FutureExt;
use tracing::{debug, info};

use tether_core::SharedSession;

use crate::context::{HandlerKind, Invocation};
use crate::error::{BoxError, PublishError, PublishResult, RegistryError, RegistryResult};
use crate::guard::invoke_guarded;
use crate::scheduler::{Job, Scheduler, Tick, Trigger, parse_schedule};
use crate::stack::{Chain, Middleware, chain_fn, compile, spawn_compilers};

/// Identity of a task registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskData {
    pub name: String,
    /// Cron expression, see [`parse_schedule`].
    pub cron: String,
}

impl TaskData {
    pub fn new(name: impl Into<String>, cron: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cron: cron.into(),
        }
    }
}

/// A periodic handler.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    fn data(&self) -> TaskData;

    async fn execute(&self, invocation: Invocation<Tick>) -> Result<(), BoxError>;
}

/// Middleware over task chains.
pub type TaskMiddleware = dyn Middleware<dyn Task, Tick>;

/// A task together with its ordered middleware.
pub struct TaskStack {
    task: Arc<dyn Task>,
    data: TaskData,
    middleware: Vec<Arc<TaskMiddleware>>,
}

impl TaskStack {
    pub fn new(task: impl Task) -> Self {
        let task: Arc<dyn Task> = Arc::new(task);
        let data = task.data();
        Self {
            task,
            data,
            middleware: Vec::new(),
        }
    }

    pub fn with(mut self, middleware: impl Middleware<dyn Task, Tick>) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn with_all(mut self, middleware: impl IntoIterator<Item = Arc<TaskMiddleware>>) -> Self {
        self.middleware.extend(middleware);
        self
    }

    pub fn data(&self) -> &TaskData {
        &self.data
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn compile(&self) -> Chain<Tick> {
        let task = self.task.clone();
        let base = chain_fn(move |invocation| {
            let task = task.clone();
            async move { task.execute(invocation).await }
        });
        compile(&self.task, &self.middleware, base)
    }
}

struct Registered {
    stack: Arc<TaskStack>,
    schedule: Schedule,
}

/// The registry of periodic handlers.
pub struct TaskManager {
    scheduler: Arc<Scheduler>,
    tasks: HashMap<String, Registered>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        Self::with_scheduler(Arc::new(Scheduler::new()))
    }

    /// Creates a manager feeding an existing scheduler.
    pub fn with_scheduler(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            tasks: HashMap::new(),
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Registers a task with the given middleware.
    pub fn register_task(
        &mut self,
        task: impl Task,
        middleware: impl IntoIterator<Item = Arc<TaskMiddleware>>,
    ) -> RegistryResult<()> {
        self.register_stack(TaskStack::new(task).with_all(middleware))
    }

    /// Registers a stack, parsing its cron expression.
    pub fn register_stack(&mut self, stack: TaskStack) -> RegistryResult<()> {
        let name = stack.name();
        if name.is_empty() {
            return Err(RegistryError::EmptyName {
                kind: HandlerKind::Task,
            });
        }
        if self.tasks.contains_key(name) {
            return Err(RegistryError::DuplicateName {
                kind: HandlerKind::Task,
                name: name.to_string(),
            });
        }

        let schedule = parse_schedule(&stack.data.cron).map_err(|e| RegistryError::InvalidSchedule {
            task: name.to_string(),
            expression: stack.data.cron.clone(),
            reason: e.to_string(),
        })?;

        debug!(task = %name, cron = %stack.data.cron, "Registered task");
        self.tasks.insert(
            name.to_string(),
            Registered {
                stack: Arc::new(stack),
                schedule,
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Compiles every task, hands them to the scheduler and starts it.
    ///
    /// Tasks whose name the scheduler already knows are skipped, so
    /// publishing again does not double their firings.
    pub async fn publish(&self, session: SharedSession) -> PublishResult<()> {
        let registered: Vec<(Arc<TaskStack>, Schedule)> = self
            .tasks
            .values()
            .map(|r| (r.stack.clone(), r.schedule.clone()))
            .collect();

        let (mut compiled, expected) =
            spawn_compilers(registered, |(stack, schedule): (Arc<TaskStack>, Schedule)| {
                let chain = stack.compile();
                (stack, schedule, chain)
            });

        let mut received = 0;
        let mut added = 0;
        while let Some((stack, schedule, chain)) = compiled.recv().await {
            received += 1;
            if self.scheduler.has_trigger(stack.name()) {
                debug!(task = %stack.name(), "Task already scheduled, skipping");
                continue;
            }
            let job = firing(stack.name(), chain, session.clone());
            self.scheduler.add(Trigger::new(stack.name(), schedule, job));
            added += 1;
        }

        if received != expected {
            return Err(PublishError::Compile {
                kind: HandlerKind::Task,
                expected,
                received,
            });
        }

        if !self.scheduler.is_running() {
            self.scheduler.start();
        }
        info!(scheduled = added, "Tasks published");
        Ok(())
    }
}

/// Builds the scheduler job for one compiled task.
fn firing(name: &str, chain: Chain<Tick>, session: SharedSession) -> Job {
    let name: Arc<str> = Arc::from(name);
    Arc::new(move |tick: Tick| {
        let invocation = Invocation::new(HandlerKind::Task, name.clone(), session.clone(), Arc::new(tick));
        let chain = chain.clone();
        async move {
            invoke_guarded(chain, invocation).await;
        }
        .boxed()
    })
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("tasks", &self.tasks.len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tether_core::MemorySession;
    use tokio::sync::mpsc;

    use super::*;

    struct Beat {
        cron: &'static str,
        fired: Option<mpsc::UnboundedSender<String>>,
    }

    #[async_trait]
    impl Task for Beat {
        fn data(&self) -> TaskData {
            TaskData::new("beat", self.cron)
        }

        async fn execute(&self, invocation: Invocation<Tick>) -> Result<(), BoxError> {
            if let Some(fired) = &self.fired {
                fired.send(invocation.context.name().to_string())?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_invalid_cron_is_rejected() {
        let mut manager = TaskManager::new();
        let err = manager
            .register_stack(TaskStack::new(Beat {
                cron: "every tuesday",
                fired: None,
            }))
            .unwrap_err();

        assert!(matches!(err, RegistryError::InvalidSchedule { ref task, .. } if task == "beat"));
        assert!(manager.is_empty());
        assert_eq!(manager.scheduler().trigger_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_starts_scheduler() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut manager = TaskManager::new();
        manager
            .register_stack(TaskStack::new(Beat {
                cron: "* * * * * *",
                fired: Some(tx),
            }))
            .unwrap();

        manager.publish(MemorySession::new("app")).await.unwrap();
        assert!(manager.scheduler().is_running());
        assert_eq!(manager.scheduler().trigger_names(), vec!["beat"]);

        let name = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("task should fire within three seconds");
        assert_eq!(name.as_deref(), Some("beat"));

        manager.scheduler().shutdown();
    }

    #[tokio::test]
    async fn test_republish_does_not_duplicate_triggers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut manager = TaskManager::new();
        manager
            .register_stack(TaskStack::new(Beat {
                cron: "* * * * * *",
                fired: Some(tx),
            }))
            .unwrap();

        manager.publish(MemorySession::new("app")).await.unwrap();
        manager.publish(MemorySession::new("app")).await.unwrap();
        assert_eq!(manager.scheduler().trigger_count(), 1);
        assert!(manager.scheduler().is_running());

        // Two consecutive firings must land on distinct seconds.
        let first = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("task should fire within three seconds");
        assert!(first.is_some());
        let second = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(second.is_err(), "a single trigger fires at most once per second");

        manager.scheduler().shutdown();
    }
}
