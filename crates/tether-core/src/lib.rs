//! # Tether Core
//!
//! The platform model of the Tether bot engine.
//!
//! This crate describes everything the engine exchanges with the messaging
//! platform, without implementing any engine behavior itself:
//!
//! - **Commands**: schemas declared by feature modules ([`CommandSchema`]) and
//!   the platform's handles for them ([`RemoteCommand`])
//! - **Interactions**: inbound command invocations ([`Interaction`]) and typed
//!   option lookups ([`OptionLookup`])
//! - **Notifications**: typed inbound events ([`Notification`], [`NotificationKind`])
//! - **Replies**: responses to interactions ([`Reply`], [`Embed`])
//! - **Session**: the remote boundary ([`Session`]) and an in-memory
//!   implementation ([`MemorySession`])
//!
//! The registration and dispatch engine lives in `tether-framework`.

pub mod command;
pub mod error;
pub mod interaction;
pub mod memory;
pub mod notification;
pub mod reply;
pub mod session;

pub use command::{
    CommandSchema, OptionKind, OptionSchema, Permissions, RemoteCommand, permissions,
};
pub use error::{ApiError, ApiResult, OptionError, OptionResult};
pub use interaction::{Interaction, InteractionOption, OptionLookup, OptionValue};
pub use memory::{MemorySession, RecordedReply};
pub use notification::{MessageCreate, Notification, NotificationKind, Payload, Ready};
pub use reply::{Attachment, Embed, EmbedColors, EmbedField, Reply};
pub use session::{
    InteractionCallback, NotificationCallback, Session, SharedSession, downcast_session,
};

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use futures::future::BoxFuture;
