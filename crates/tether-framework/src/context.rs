//! Per-invocation context.
//!
//! Every call through a compiled chain carries an [`Invocation`]: a fresh
//! [`InvocationContext`] identifying this one call, the shared session, and
//! the payload that triggered it (an interaction, a notification, or a tick).
//!
//! Middleware can hand values to inner layers through the context's typed
//! state map:
//!
//! ```rust,ignore
//! // outer middleware
//! invocation.context.set_state(Locale("en-GB".into()));
//! // inner handler
//! let locale = invocation.context.get_state::<Locale>();
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tether_core::SharedSession;

// =============================================================================
// HandlerKind
// =============================================================================

/// The three kinds of registrable handlers.
///
/// Each kind has its own name namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Command,
    Event,
    Task,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Event => "event",
            Self::Task => "task",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// InvocationContext
// =============================================================================

/// Identity and scratch state of a single handler invocation.
pub struct InvocationContext {
    id: Uuid,
    kind: HandlerKind,
    name: Arc<str>,
    started_at: DateTime<Utc>,
    started: Instant,
    /// Never cancelled by the engine itself.
    cancellation: CancellationToken,
    state: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl InvocationContext {
    pub fn new(kind: HandlerKind, name: impl Into<Arc<str>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: name.into(),
            started_at: Utc::now(),
            started: Instant::now(),
            cancellation: CancellationToken::new(),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Unique ID of this invocation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Registered name of the handler being invoked.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wall-clock time the invocation started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time elapsed since the invocation started.
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    // ─── State map ────────────────────────────────────────────────────────────

    /// Stores a value in the invocation's state map.
    ///
    /// Only one value per type can be stored; subsequent calls overwrite.
    pub fn set_state<T: Send + Sync + 'static>(&self, value: T) {
        self.state.lock().insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a cloned value from the state map.
    pub fn get_state<T: Clone + 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn has_state<T: 'static>(&self) -> bool {
        self.state.lock().contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns a value from the state map.
    pub fn take_state<T: 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Invocation
// =============================================================================

/// The request type flowing through a compiled chain.
pub struct Invocation<E> {
    pub context: Arc<InvocationContext>,
    pub session: SharedSession,
    pub event: Arc<E>,
}

impl<E> Invocation<E> {
    /// Creates an invocation with a fresh context.
    pub fn new(kind: HandlerKind, name: impl Into<Arc<str>>, session: SharedSession, event: Arc<E>) -> Self {
        Self {
            context: Arc::new(InvocationContext::new(kind, name)),
            session,
            event,
        }
    }
}

// Manual impl: `E` itself need not be `Clone`.
impl<E> Clone for Invocation<E> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            session: self.session.clone(),
            event: self.event.clone(),
        }
    }
}

impl<E> fmt::Debug for Invocation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("context", &self.context)
            .field("application_id", &self.session.application_id())
            .finish_non_exhaustive()
    }
}
