//! Notification handlers and their registry.
//!
//! An [`Event<T>`] handles one notification payload type `T`. Its stack is
//! built as a typed [`EventStack<T>`], so the handler, its middleware and the
//! session slot it is bound to all agree on `T` at compile time. The registry
//! stores stacks erased to [`AnyEventStack`], which remembers the slot
//! ([`NotificationKind`]) and how to build the callback.
//!
//! Several registrations may target the same notification type; they are
//! distinguished by [`EventData::name`]. A `once` registration runs at most
//! once.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, info, warn};

use tether_core::{Notification, NotificationCallback, NotificationKind, Payload, SharedSession};

use crate::context::{HandlerKind, Invocation};
use crate::error::{BoxError, PublishError, PublishResult, RegistryError, RegistryResult};
use crate::guard::invoke_guarded;
use crate::stack::{Chain, Middleware, chain_fn, compile, spawn_compilers};

/// Identity of an event registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventData {
    /// Registration name, unique among events.
    pub name: String,
    /// Run at most once.
    pub once: bool,
}

impl EventData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            once: false,
        }
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

/// A handler for notifications of type `T`.
#[async_trait]
pub trait Event<T: Notification>: Send + Sync + 'static {
    fn data(&self) -> EventData;

    async fn execute(&self, invocation: Invocation<T>) -> Result<(), BoxError>;
}

/// Middleware over event chains for payload `T`.
pub type EventMiddleware<T> = dyn Middleware<dyn Event<T>, T>;

// ============================================================================
// EventStack<T>
// ============================================================================

/// An event handler together with its ordered middleware.
pub struct EventStack<T: Notification> {
    event: Arc<dyn Event<T>>,
    data: EventData,
    middleware: Vec<Arc<EventMiddleware<T>>>,
}

impl<T: Notification> EventStack<T> {
    pub fn new(event: impl Event<T>) -> Self {
        let event: Arc<dyn Event<T>> = Arc::new(event);
        let data = event.data();
        Self {
            event,
            data,
            middleware: Vec::new(),
        }
    }

    pub fn with(mut self, middleware: impl Middleware<dyn Event<T>, T>) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn with_all(mut self, middleware: impl IntoIterator<Item = Arc<EventMiddleware<T>>>) -> Self {
        self.middleware.extend(middleware);
        self
    }

    pub fn data(&self) -> &EventData {
        &self.data
    }

    /// Compiles the stack into a chain over `T`.
    pub fn compile(&self) -> Chain<T> {
        let event = self.event.clone();
        let base = chain_fn(move |invocation| {
            let event = event.clone();
            async move { event.execute(invocation).await }
        });
        compile(&self.event, &self.middleware, base)
    }
}

/// Compiles a typed stack into a session callback for the slot of `T`.
pub fn compile_event<T: Notification>(stack: &EventStack<T>) -> (NotificationKind, NotificationCallback) {
    let chain = stack.compile();
    let name: Arc<str> = Arc::from(stack.data.name.as_str());
    let once = stack.data.once;
    let fired = Arc::new(AtomicBool::new(false));

    let callback: NotificationCallback = Arc::new(move |session: SharedSession, payload: Payload| {
        let name = name.clone();
        let chain = chain.clone();
        let fired = fired.clone();
        async move {
            if once && fired.swap(true, Ordering::SeqCst) {
                return;
            }
            let Ok(event) = payload.downcast::<T>() else {
                warn!(event = %name, expected = T::NAME, "Notification payload has unexpected type");
                return;
            };
            let invocation = Invocation::new(HandlerKind::Event, name, session, event);
            invoke_guarded(chain, invocation).await;
        }
        .boxed()
    });

    (NotificationKind::of::<T>(), callback)
}

// ============================================================================
// AnyEventStack
// ============================================================================

type CompileFn = dyn Fn() -> NotificationCallback + Send + Sync;

/// An event stack with its payload type erased.
pub struct AnyEventStack {
    data: EventData,
    kind: NotificationKind,
    compile: Box<CompileFn>,
}

impl AnyEventStack {
    pub fn data(&self) -> &EventData {
        &self.data
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// The notification slot this stack binds to.
    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn compile(&self) -> NotificationCallback {
        (self.compile)()
    }
}

impl<T: Notification> From<EventStack<T>> for AnyEventStack {
    fn from(stack: EventStack<T>) -> Self {
        let data = stack.data.clone();
        Self {
            data,
            kind: NotificationKind::of::<T>(),
            compile: Box::new(move || compile_event(&stack).1),
        }
    }
}

impl std::fmt::Debug for AnyEventStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyEventStack")
            .field("data", &self.data)
            .field("kind", &self.kind.name())
            .finish()
    }
}

// ============================================================================
// EventManager
// ============================================================================

/// The registry of notification handlers.
#[derive(Default)]
pub struct EventManager {
    stacks: HashMap<String, Arc<AnyEventStack>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler with the given middleware.
    pub fn register_event<T: Notification>(
        &mut self,
        event: impl Event<T>,
        middleware: impl IntoIterator<Item = Arc<EventMiddleware<T>>>,
    ) -> RegistryResult<()> {
        self.register_stack(EventStack::new(event).with_all(middleware))
    }

    /// Registers a stack under its registration name.
    pub fn register_stack(&mut self, stack: impl Into<AnyEventStack>) -> RegistryResult<()> {
        let stack = stack.into();
        let name = stack.name();
        if name.is_empty() {
            return Err(RegistryError::EmptyName {
                kind: HandlerKind::Event,
            });
        }
        if self.stacks.contains_key(name) {
            return Err(RegistryError::DuplicateName {
                kind: HandlerKind::Event,
                name: name.to_string(),
            });
        }

        debug!(event = %name, notification = %stack.kind(), once = stack.data().once, "Registered event");
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

    /// Compiles every stack and binds it to its notification slot.
    pub async fn publish(&self, session: SharedSession) -> PublishResult<()> {
        let stacks: Vec<Arc<AnyEventStack>> = self.stacks.values().cloned().collect();
        let (mut compiled, expected) = spawn_compilers(stacks, |stack: Arc<AnyEventStack>| {
            let callback = stack.compile();
            (stack, callback)
        });

        let mut received = 0;
        while let Some((stack, callback)) = compiled.recv().await {
            received += 1;
            session.bind_notification(stack.kind(), stack.data().once, callback);
            debug!(event = %stack.name(), notification = %stack.kind(), "Bound event");
        }

        if received != expected {
            return Err(PublishError::Compile {
                kind: HandlerKind::Event,
                expected,
                received,
            });
        }

        info!(bound = received, "Events published");
        Ok(())
    }
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager")
            .field("events", &self.stacks.len())
            .finish()
    }
}
