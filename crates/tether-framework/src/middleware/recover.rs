//! Error and panic recovery for commands.
//!
//! [`RecoverMiddleware`] is a tower [`Layer`] as well as a command
//! [`Middleware`]. Wrapped around a command chain it:
//!
//! - replies to the user with an ephemeral error embed when the chain returns
//!   an error, carrying the invocation ID so the report can be matched with
//!   the logs;
//! - catches a panic, replies with a "fatal" embed plus the backtrace as a
//!   `st-<id>.txt` attachment, and logs the fault.
//!
//! In both cases the chain then completes with `Ok(())`, so outer middleware
//! and the dispatch boundary see a handled invocation.

use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Layer, Service, ServiceExt};
use tracing::{debug, error, warn};
use uuid::Uuid;

use tether_core::{Attachment, Embed, EmbedColors, Interaction, Reply};

use crate::command::Command;
use crate::context::Invocation;
use crate::guard::FaultBoundary;
use crate::stack::{Chain, Middleware};

const FOOTER: &str = "The following error was reported!";

/// Surfaces command errors and panics to the invoking user.
#[derive(Debug, Clone, Default)]
pub struct RecoverMiddleware {
    colors: EmbedColors,
    contact: Option<String>,
}

impl RecoverMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the embed palette.
    pub fn colors(mut self, colors: EmbedColors) -> Self {
        self.colors = colors;
        self
    }

    /// Sets the user to mention as the point of contact in error embeds.
    pub fn contact(mut self, user_id: impl Into<String>) -> Self {
        self.contact = Some(user_id.into());
        self
    }

    fn contact_line(&self) -> String {
        match &self.contact {
            Some(user_id) => format!("\nIf this keeps happening contact <@{user_id}>."),
            None => String::new(),
        }
    }

    /// Builds the embed sent when a command returns an error.
    pub fn error_embed(&self, message: &str, id: Uuid, at: DateTime<Utc>) -> Embed {
        Embed::new()
            .title("Oh no! :(")
            .color(self.colors.error)
            .description(format!(
                "Sorry! An unexpected error occurred while executing this command.{}",
                self.contact_line()
            ))
            .field("Error Message", message, false)
            .field("Error ID", format!("`{id}`"), true)
            .field("Server Time", format!("<t:{}:f>", at.timestamp()), true)
            .footer(FOOTER)
    }

    /// Builds the embed sent when a command panics.
    pub fn fatal_embed(&self, id: Uuid, at: DateTime<Utc>) -> Embed {
        Embed::new()
            .title("Fatal! -w-")
            .color(self.colors.error)
            .description(format!(
                "You have encountered a fatal error! This should never happen.{}",
                self.contact_line()
            ))
            .field("Error ID", format!("`{id}`"), true)
            .field("Server Time", format!("<t:{}:f>", at.timestamp()), true)
            .footer(FOOTER)
    }
}

impl<S> Layer<S> for RecoverMiddleware {
    type Service = RecoverService<S>;

    fn layer(&self, inner: S) -> RecoverService<S> {
        RecoverService {
            inner,
            config: Arc::new(self.clone()),
        }
    }
}

impl Middleware<dyn Command, Interaction> for RecoverMiddleware {
    fn handle(&self, _command: &Arc<dyn Command>, next: Chain<Interaction>) -> Chain<Interaction> {
        BoxCloneSyncService::new(self.layer(next))
    }
}

/// The [`Service`] produced by [`RecoverMiddleware`].
pub struct RecoverService<S> {
    inner: S,
    config: Arc<RecoverMiddleware>,
}

impl<S: Clone> Clone for RecoverService<S> {
    fn clone(&self) -> Self {
        RecoverService {
            inner: self.inner.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S> Service<Invocation<Interaction>> for RecoverService<S>
where
    S: Service<Invocation<Interaction>, Response = (), Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation<Interaction>) -> Self::Future {
        let inner = self.inner.clone();
        let config = self.config.clone();

        async move {
            let context = invocation.context.clone();
            let session = invocation.session.clone();
            let interaction = invocation.event.clone();
            let id = context.id();

            let reply = match FaultBoundary::new(context.name(), inner.oneshot(invocation)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => {
                    error!(
                        command = %context.name(),
                        error_id = %id,
                        error = %e,
                        "Caught an error while executing interaction"
                    );
                    Reply::embed(config.error_embed(&e.to_string(), id, Utc::now())).ephemeral()
                }
                Err(fault) => {
                    error!(
                        command = %context.name(),
                        error_id = %id,
                        panic_msg = %fault.message,
                        location = fault.location.as_deref().unwrap_or("unknown"),
                        "Recovered from panic in command execution"
                    );
                    debug!(backtrace = %fault.backtrace, "Panic backtrace");
                    Reply::embed(config.fatal_embed(id, Utc::now()))
                        .ephemeral()
                        .attach(Attachment::text(format!("st-{id}.txt"), fault.backtrace))
                }
            };

            if let Err(e) = session.respond(&interaction, reply).await {
                warn!(command = %context.name(), error = %e, "Failed to reply to interaction");
            }
            Ok(())
        }
        .boxed()
    }
}
