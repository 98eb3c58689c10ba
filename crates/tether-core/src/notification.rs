//! Typed notifications delivered by the platform.
//!
//! Every notification payload implements [`Notification`]. Bindings on the
//! session are keyed by [`NotificationKind`], which pairs the payload's
//! `TypeId` with its wire name, so a handler typed to one payload can never
//! be bound to another payload's delivery slot.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Marker trait for notification payloads.
pub trait Notification: Send + Sync + 'static {
    /// The platform's name for this notification, e.g. `"READY"`.
    const NAME: &'static str;
}

/// A type-erased notification payload as it travels through the session.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Identifies a notification payload type.
#[derive(Debug, Clone, Copy)]
pub struct NotificationKind {
    type_id: TypeId,
    name: &'static str,
}

impl NotificationKind {
    /// Returns the kind of the notification type `T`.
    pub fn of<T: Notification>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: T::NAME,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for NotificationKind {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for NotificationKind {}

impl Hash for NotificationKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Sent once the session has connected and identified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ready {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub guilds: Vec<String>,
}

impl Notification for Ready {
    const NAME: &'static str = "READY";
}

/// Sent for every message the session can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCreate {
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
}

impl Notification for MessageCreate {
    const NAME: &'static str = "MESSAGE_CREATE";
}
