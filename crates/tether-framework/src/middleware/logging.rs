//! Per-invocation logging.

use std::sync::Arc;

use tower::ServiceExt;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::context::Invocation;
use crate::stack::{Chain, Middleware, chain_fn};

/// Logs the start and outcome of every invocation, with its duration.
///
/// Works for any handler kind. Placed first in a stack it also measures the
/// time spent in the other middleware.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl<H, E> Middleware<H, E> for LoggingMiddleware
where
    H: ?Sized + 'static,
    E: Send + Sync + 'static,
{
    fn handle(&self, _handler: &Arc<H>, next: Chain<E>) -> Chain<E> {
        chain_fn(move |invocation: Invocation<E>| {
            let next = next.clone();
            let context = invocation.context.clone();
            let span = info_span!(
                "handler",
                kind = %context.kind(),
                name = %context.name(),
                invocation = %context.id(),
            );

            async move {
                debug!("Handler started");
                let result = next.oneshot(invocation).await;
                let elapsed_ms = context.elapsed().as_millis() as u64;
                match &result {
                    Ok(()) => info!(elapsed_ms, "Handler finished"),
                    Err(e) => warn!(elapsed_ms, error = %e, "Handler failed"),
                }
                result
            }
            .instrument(span)
        })
    }
}

#[cfg(test)]
mod tests {
    use tether_core::{Interaction, MemorySession};
    use tower::BoxError;

    use super::*;
    use crate::context::HandlerKind;
    use crate::stack::compile;

    struct Probe;

    fn invocation() -> Invocation<Interaction> {
        Invocation::new(
            HandlerKind::Command,
            "probe",
            MemorySession::new("app"),
            Arc::new(Interaction::new("1", "probe")),
        )
    }

    #[tokio::test]
    async fn test_outcome_passes_through() {
        let middleware: Vec<Arc<dyn Middleware<Probe, Interaction>>> = vec![Arc::new(LoggingMiddleware)];

        let ok = compile(&Arc::new(Probe), &middleware, chain_fn(|_| async { Ok(()) }));
        assert!(ok.oneshot(invocation()).await.is_ok());

        let failing = compile(
            &Arc::new(Probe),
            &middleware,
            chain_fn(|_| async { Err::<(), BoxError>("boom".into()) }),
        );
        let err = failing.oneshot(invocation()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
