//! Member permission checks for commands.

use std::sync::Arc;

use tower::ServiceExt;
use tracing::debug;

use tether_core::{Interaction, Permissions, permissions};

use crate::command::Command;
use crate::context::Invocation;
use crate::error::PermissionDenied;
use crate::stack::{Chain, Middleware, chain_fn};

/// Rejects invocations from members lacking the command's permission bits.
///
/// By default the required bits are the command's
/// `default_member_permissions`; [`PermissionMiddleware::requiring`]
/// overrides them. Members holding [`permissions::ADMINISTRATOR`] always pass.
/// An interaction without member permissions (a direct message) is denied
/// whenever any bit is required.
///
/// A denied invocation fails with [`PermissionDenied`] without running the
/// handler. Put a [`RecoverMiddleware`](super::RecoverMiddleware) in front
/// of it to tell the user.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionMiddleware {
    required: Option<Permissions>,
}

impl PermissionMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `bits` regardless of what the command declares.
    pub fn requiring(bits: Permissions) -> Self {
        Self {
            required: Some(bits),
        }
    }
}

/// Returns the required bits the member is missing, or zero.
fn missing_bits(required: Permissions, granted: Option<Permissions>) -> Permissions {
    match granted {
        Some(bits) if bits & permissions::ADMINISTRATOR != 0 => 0,
        Some(bits) => required & !bits,
        None => required,
    }
}

impl Middleware<dyn Command, Interaction> for PermissionMiddleware {
    fn handle(&self, command: &Arc<dyn Command>, next: Chain<Interaction>) -> Chain<Interaction> {
        let schema = command.data();
        let required = self
            .required
            .or(schema.default_member_permissions)
            .unwrap_or(0);
        if required == 0 {
            return next;
        }

        let command: Arc<str> = Arc::from(schema.name);
        chain_fn(move |invocation: Invocation<Interaction>| {
            let next = next.clone();
            let command = command.clone();
            async move {
                let missing = missing_bits(required, invocation.event.member_permissions);
                if missing != 0 {
                    debug!(command = %command, user = ?invocation.event.user_id, missing, "Permission denied");
                    return Err(PermissionDenied {
                        command: command.to_string(),
                        required,
                        missing,
                    }
                    .into());
                }
                next.oneshot(invocation).await
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tether_core::{CommandSchema, MemorySession};
    use tower::BoxError;

    use super::*;
    use crate::context::HandlerKind;
    use crate::stack::compile;

    struct Purge {
        ran: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl Command for Purge {
        fn data(&self) -> CommandSchema {
            CommandSchema::new("purge", "Deletes messages").permissions(permissions::MANAGE_MESSAGES)
        }

        async fn execute(&self, _invocation: Invocation<Interaction>) -> Result<(), BoxError> {
            *self.ran.lock() += 1;
            Ok(())
        }
    }

    async fn invoke(
        middleware: PermissionMiddleware,
        granted: Option<Permissions>,
    ) -> (Result<(), BoxError>, u32) {
        let ran = Arc::new(Mutex::new(0));
        let command: Arc<dyn Command> = Arc::new(Purge { ran: ran.clone() });
        let base = {
            let command = command.clone();
            chain_fn(move |invocation| {
                let command = command.clone();
                async move { command.execute(invocation).await }
            })
        };
        let layers: Vec<Arc<dyn Middleware<dyn Command, Interaction>>> = vec![Arc::new(middleware)];
        let chain = compile(&command, &layers, base);

        let mut interaction = Interaction::new("1", "purge").with_user("u1");
        if let Some(bits) = granted {
            interaction = interaction.with_permissions(bits);
        }
        let invocation = Invocation::new(
            HandlerKind::Command,
            "purge",
            MemorySession::new("app"),
            Arc::new(interaction),
        );
        let result = chain.oneshot(invocation).await;
        let count = *ran.lock();
        (result, count)
    }

    #[test]
    fn test_missing_bits() {
        let required = permissions::MANAGE_MESSAGES | permissions::MANAGE_GUILD;

        assert_eq!(missing_bits(required, Some(required)), 0);
        assert_eq!(
            missing_bits(required, Some(permissions::MANAGE_GUILD)),
            permissions::MANAGE_MESSAGES
        );
        assert_eq!(missing_bits(required, Some(permissions::ADMINISTRATOR)), 0);
        assert_eq!(missing_bits(required, None), required);
    }

    #[tokio::test]
    async fn test_member_with_bits_passes() {
        let (result, ran) = invoke(
            PermissionMiddleware::new(),
            Some(permissions::MANAGE_MESSAGES | permissions::SEND_MESSAGES),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(ran, 1);
    }

    #[tokio::test]
    async fn test_member_without_bits_is_denied() {
        let (result, ran) = invoke(PermissionMiddleware::new(), Some(permissions::SEND_MESSAGES)).await;

        let err = result.unwrap_err();
        let denied = err.downcast_ref::<PermissionDenied>().unwrap();
        assert_eq!(denied.command, "purge");
        assert_eq!(denied.missing, permissions::MANAGE_MESSAGES);
        assert_eq!(ran, 0);
    }

    #[tokio::test]
    async fn test_direct_message_is_denied() {
        let (result, ran) = invoke(PermissionMiddleware::new(), None).await;

        assert!(result.is_err());
        assert_eq!(ran, 0);
    }

    #[tokio::test]
    async fn test_override_replaces_declared_bits() {
        let (result, ran) = invoke(
            PermissionMiddleware::requiring(permissions::ADMINISTRATOR),
            Some(permissions::MANAGE_MESSAGES),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(ran, 0);
    }
}
