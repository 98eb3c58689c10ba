//! End-to-end publishing against the in-memory session.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tower::ServiceExt;

use tether_core::{
    ApiError, CommandSchema, Interaction, MemorySession, Ready, SharedSession, async_trait,
    permissions,
};
use tether_framework::{
    BoxError, Chain, Command, CommandManager, CommandStack, Event, EventData, EventManager,
    EventStack, Invocation, LoggingMiddleware, Module, ModuleManager, PermissionMiddleware,
    RecoverMiddleware, RegistryError, Task, TaskData, TaskManager, TaskStack, Tick, middleware_fn,
};

type Log = Arc<Mutex<Vec<String>>>;

struct Echo(&'static str);

#[async_trait]
impl Command for Echo {
    fn data(&self) -> CommandSchema {
        CommandSchema::new(self.0, "Echoes its name")
    }

    async fn execute(&self, invocation: Invocation<Interaction>) -> Result<(), BoxError> {
        invocation
            .session
            .respond(&invocation.event, tether_core::Reply::text(self.0))
            .await?;
        Ok(())
    }
}

struct Explode;

#[async_trait]
impl Command for Explode {
    fn data(&self) -> CommandSchema {
        CommandSchema::new("explode", "Always panics").permissions(permissions::ADMINISTRATOR)
    }

    async fn execute(&self, _invocation: Invocation<Interaction>) -> Result<(), BoxError> {
        panic!("kaboom");
    }
}

fn shared(session: &Arc<MemorySession>) -> SharedSession {
    session.clone()
}

#[tokio::test]
async fn test_publish_reconciles_remote_registry() {
    let session = MemorySession::new("app");
    let seeded: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| session.seed_command(name))
        .collect();

    let mut commands = CommandManager::new();
    for name in ["b", "c", "d"] {
        commands.register_stack(CommandStack::new(Echo(name))).unwrap();
    }
    commands.publish(shared(&session)).await.unwrap();

    let deleted: Vec<String> = session.deleted().into_iter().map(|c| c.name).collect();
    assert_eq!(deleted, vec!["a"]);
    assert_eq!(session.remote_names(), vec!["b", "c", "d"]);
    for name in ["b", "c", "d"] {
        assert!(session.is_command_bound(name));
    }
    assert!(!session.is_command_bound("a"));

    // Surviving commands keep their remote identity.
    let remote = session.remote_commands();
    for kept in &seeded[1..] {
        assert!(remote.contains(kept), "{} lost its remote id", kept.name);
    }
    let mut created = session.created();
    created.sort();
    assert_eq!(created, vec!["b", "c", "d"]);

    assert!(session.deliver(Interaction::new("1", "d")).await);
    assert_eq!(session.replies()[0].reply.content.as_deref(), Some("d"));
}

#[tokio::test]
async fn test_republish_is_idempotent() {
    let session = MemorySession::new("app");
    let mut commands = CommandManager::new();
    commands.register_stack(CommandStack::new(Echo("ping"))).unwrap();

    commands.publish(shared(&session)).await.unwrap();
    session.clear_history();
    commands.publish(shared(&session)).await.unwrap();

    assert!(session.deleted().is_empty());
    assert_eq!(session.created(), vec!["ping"]);
    assert_eq!(session.remote_names(), vec!["ping"]);

    assert!(session.deliver(Interaction::new("1", "ping")).await);
    assert_eq!(session.replies().len(), 1);
}

#[tokio::test]
async fn test_list_failure_still_publishes_every_command() {
    let session = MemorySession::new("app");
    session.seed_command("stale");
    session.fail_list_with(ApiError::Timeout);

    let mut commands = CommandManager::new();
    for name in ["help", "ping"] {
        commands.register_stack(CommandStack::new(Echo(name))).unwrap();
    }
    commands.publish(shared(&session)).await.unwrap();

    let mut created = session.created();
    created.sort();
    assert_eq!(created, vec!["help", "ping"]);
    assert!(session.deleted().is_empty());
    assert_eq!(session.remote_names(), vec!["help", "ping", "stale"]);
    assert!(session.is_command_bound("help"));
    assert!(session.is_command_bound("ping"));
}

#[tokio::test]
async fn test_panicking_command_is_reported_and_dispatch_survives() {
    let session = MemorySession::new("app");
    let mut commands = CommandManager::new();
    commands
        .register_stack(
            CommandStack::new(Explode)
                .with(LoggingMiddleware)
                .with(RecoverMiddleware::new())
                .with(PermissionMiddleware::new()),
        )
        .unwrap();
    commands.register_stack(CommandStack::new(Echo("ping"))).unwrap();
    commands.publish(shared(&session)).await.unwrap();

    // Denied members get the error embed, the handler never runs.
    let denied = Interaction::new("1", "explode").with_permissions(permissions::SEND_MESSAGES);
    assert!(session.deliver(denied).await);

    let admin = Interaction::new("2", "explode").with_permissions(permissions::ADMINISTRATOR);
    assert!(session.deliver(admin).await);

    assert!(session.deliver(Interaction::new("3", "ping")).await);

    let replies = session.replies();
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0].reply.embeds[0].title.as_deref(), Some("Oh no! :("));
    assert_eq!(replies[1].reply.embeds[0].title.as_deref(), Some("Fatal! -w-"));
    assert_eq!(replies[1].reply.attachments.len(), 1);
    assert_eq!(replies[2].reply.content.as_deref(), Some("ping"));
}

#[tokio::test]
async fn test_unrecovered_panic_is_contained_at_dispatch() {
    let session = MemorySession::new("app");
    let mut commands = CommandManager::new();
    commands.register_stack(CommandStack::new(Explode)).unwrap();
    commands.publish(shared(&session)).await.unwrap();

    assert!(session.deliver(Interaction::new("1", "explode")).await);
    assert!(session.deliver(Interaction::new("2", "explode")).await);
    assert!(session.replies().is_empty());
}

#[tokio::test]
async fn test_middleware_runs_in_declaration_order() {
    let log: Log = Arc::default();
    let recording = |label: &'static str| {
        let log = log.clone();
        middleware_fn::<dyn Command, Interaction, _, _>(move |invocation, next: Chain<Interaction>| {
            let log = log.clone();
            async move {
                log.lock().push(format!("enter {label}"));
                let result = next.oneshot(invocation).await;
                log.lock().push(format!("leave {label}"));
                result
            }
        })
    };

    let session = MemorySession::new("app");
    let mut commands = CommandManager::new();
    commands
        .register_stack(
            CommandStack::new(Echo("ping"))
                .with(recording("outer"))
                .with(recording("inner")),
        )
        .unwrap();
    commands.publish(shared(&session)).await.unwrap();
    session.deliver(Interaction::new("1", "ping")).await;

    assert_eq!(
        *log.lock(),
        vec!["enter outer", "enter inner", "leave inner", "leave outer"]
    );
}

// ============================================================================
// Events and tasks
// ============================================================================

struct Greeter {
    name: &'static str,
    once: bool,
    seen: Log,
}

#[async_trait]
impl Event<Ready> for Greeter {
    fn data(&self) -> EventData {
        let data = EventData::new(self.name);
        if self.once { data.once() } else { data }
    }

    async fn execute(&self, invocation: Invocation<Ready>) -> Result<(), BoxError> {
        self.seen
            .lock()
            .push(format!("{} {}", self.name, invocation.event.username));
        Ok(())
    }
}

fn ready(username: &str) -> Ready {
    Ready {
        user_id: "1".into(),
        username: username.into(),
        guilds: vec![],
    }
}

#[tokio::test]
async fn test_once_event_runs_once() {
    let seen: Log = Arc::default();
    let session = MemorySession::new("app");
    let mut events = EventManager::new();
    events
        .register_stack(EventStack::<Ready>::new(Greeter {
            name: "hello",
            once: true,
            seen: seen.clone(),
        }))
        .unwrap();
    events
        .register_stack(EventStack::<Ready>::new(Greeter {
            name: "always",
            once: false,
            seen: seen.clone(),
        }))
        .unwrap();
    events.publish(shared(&session)).await.unwrap();

    session.notify(ready("first")).await;
    session.notify(ready("second")).await;

    let mut seen = seen.lock().clone();
    seen.sort();
    assert_eq!(seen, vec!["always first", "always second", "hello first"]);
}

struct Flaky {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Event<Ready> for Flaky {
    fn data(&self) -> EventData {
        EventData::new("flaky")
    }

    async fn execute(&self, _invocation: Invocation<Ready>) -> Result<(), BoxError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("first delivery explodes");
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_panicking_event_does_not_break_delivery() {
    let calls = Arc::new(AtomicUsize::new(0));
    let session = MemorySession::new("app");
    let mut events = EventManager::new();
    events
        .register_stack(EventStack::<Ready>::new(Flaky {
            calls: calls.clone(),
        }))
        .unwrap();
    events.publish(shared(&session)).await.unwrap();

    assert_eq!(session.notify(ready("first")).await, 1);
    assert_eq!(session.notify(ready("second")).await, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(session.notification_bindings::<Ready>(), 1);
}

struct Beat {
    fired: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl Task for Beat {
    fn data(&self) -> TaskData {
        TaskData::new("ping", "* * * * * *")
    }

    async fn execute(&self, _invocation: Invocation<Tick>) -> Result<(), BoxError> {
        self.fired.send(())?;
        Ok(())
    }
}

struct Stumble {
    calls: Arc<AtomicUsize>,
    fired: mpsc::UnboundedSender<usize>,
}

#[async_trait]
impl Task for Stumble {
    fn data(&self) -> TaskData {
        TaskData::new("stumble", "* * * * * *")
    }

    async fn execute(&self, _invocation: Invocation<Tick>) -> Result<(), BoxError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            panic!("first firing explodes");
        }
        self.fired.send(call)?;
        Ok(())
    }
}

#[tokio::test]
async fn test_panicking_task_keeps_firing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut tasks = TaskManager::new();
    tasks
        .register_stack(TaskStack::new(Stumble {
            calls: calls.clone(),
            fired: tx,
        }))
        .unwrap();
    tasks.publish(shared(&MemorySession::new("app"))).await.unwrap();

    let call = tokio::time::timeout(Duration::from_secs(4), rx.recv())
        .await
        .expect("task should fire again after panicking")
        .unwrap();

    assert!(call >= 1);
    assert!(tasks.scheduler().is_running());
    tasks.scheduler().shutdown();
}

#[test]
fn test_invalid_cron_never_reaches_scheduler() {
    struct Bad;

    #[async_trait]
    impl Task for Bad {
        fn data(&self) -> TaskData {
            TaskData::new("bad", "61 * * * *")
        }

        async fn execute(&self, _invocation: Invocation<Tick>) -> Result<(), BoxError> {
            Ok(())
        }
    }

    let mut tasks = TaskManager::new();
    let err = tasks.register_stack(TaskStack::new(Bad)).unwrap_err();

    assert!(matches!(err, RegistryError::InvalidSchedule { .. }));
    assert_eq!(tasks.scheduler().trigger_count(), 0);
}

// ============================================================================
// Modules
// ============================================================================

struct Everything {
    seen: Log,
    fired: mpsc::UnboundedSender<()>,
}

impl Module for Everything {
    fn name(&self) -> &str {
        "everything"
    }

    fn events(&self) -> Result<Vec<tether_framework::AnyEventStack>, BoxError> {
        Ok(vec![
            EventStack::<Ready>::new(Greeter {
                name: "ping",
                once: false,
                seen: self.seen.clone(),
            })
            .into(),
        ])
    }

    fn commands(&self) -> Result<Vec<CommandStack>, BoxError> {
        Ok(vec![CommandStack::new(Echo("ping"))])
    }

    fn tasks(&self) -> Result<Vec<TaskStack>, BoxError> {
        Ok(vec![TaskStack::new(Beat {
            fired: self.fired.clone(),
        })])
    }
}

#[tokio::test]
async fn test_kinds_have_separate_namespaces() {
    let seen: Log = Arc::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = MemorySession::new("app");

    let mut modules = ModuleManager::new();
    modules.register_module(Everything {
        seen: seen.clone(),
        fired: tx,
    });

    let mut events = EventManager::new();
    let mut commands = CommandManager::new();
    let mut tasks = TaskManager::new();
    modules.on_events(shared(&session), &mut events).await.unwrap();
    modules.on_commands(shared(&session), &mut commands).await.unwrap();
    modules.on_tasks(shared(&session), &mut tasks).await.unwrap();

    assert!(events.contains("ping"));
    assert!(commands.contains("ping"));
    assert!(tasks.contains("ping"));

    session.notify(ready("bot")).await;
    assert_eq!(*seen.lock(), vec!["ping bot"]);

    assert!(session.deliver(Interaction::new("1", "ping")).await);

    tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("task should fire within three seconds");
    tasks.scheduler().shutdown();
}
