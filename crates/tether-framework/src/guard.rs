//! Guarded invocation at the dispatch boundary.
//!
//! Every chain bound to the session (command dispatch, notification delivery,
//! scheduler firing) is invoked through [`invoke_guarded`]. A returned error
//! is logged; a panic anywhere in the chain is caught, converted into a
//! [`HandlerFault`] with the backtrace captured at the panic site, logged,
//! and swallowed so later invocations keep working.
//!
//! Backtraces are recorded by a process-wide panic hook that is installed on
//! first use. The hook only captures for panics raised while a
//! [`FaultBoundary`] is being polled on the current thread; every other panic
//! is forwarded to the previously installed hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Once};
use std::task::{Context, Poll};

use tower::{BoxError, ServiceExt};
use tracing::{Instrument, debug, debug_span, error};

use crate::context::Invocation;
use crate::error::HandlerFault;
use crate::stack::Chain;

struct PanicCapture {
    location: Option<String>,
    backtrace: String,
}

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_PANIC: RefCell<Option<PanicCapture>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }
            let capture = PanicCapture {
                location: info.location().map(ToString::to_string),
                backtrace: Backtrace::force_capture().to_string(),
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(capture));
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

// ============================================================================
// FaultBoundary
// ============================================================================

/// A future that converts a panic in `F` into a [`HandlerFault`].
pub struct FaultBoundary<F> {
    inner: Pin<Box<F>>,
    handler: Arc<str>,
}

impl<F: Future> FaultBoundary<F> {
    pub fn new(handler: impl Into<Arc<str>>, inner: F) -> Self {
        install_hook();
        Self {
            inner: Box::pin(inner),
            handler: handler.into(),
        }
    }
}

impl<F: Future> Future for FaultBoundary<F> {
    type Output = Result<F::Output, HandlerFault>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
        let polled = panic::catch_unwind(AssertUnwindSafe(|| this.inner.as_mut().poll(cx)));
        GUARD_DEPTH.with(|depth| depth.set(depth.get() - 1));

        match polled {
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => {
                let capture = LAST_PANIC.with(|slot| slot.borrow_mut().take());
                let (location, backtrace) = match capture {
                    Some(c) => (c.location, c.backtrace),
                    None => (None, String::from("<backtrace unavailable>")),
                };
                Poll::Ready(Err(HandlerFault {
                    handler: this.handler.to_string(),
                    message: panic_message(payload.as_ref()),
                    location,
                    backtrace,
                }))
            }
        }
    }
}

// ============================================================================
// Guarded invocation
// ============================================================================

/// The result of a guarded invocation.
#[derive(Debug)]
pub enum Outcome {
    /// The chain returned `Ok(())`.
    Completed,
    /// The chain returned an error.
    Failed(BoxError),
    /// The chain panicked.
    Faulted(HandlerFault),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Invokes a chain, logging errors and recovering from panics.
pub async fn invoke_guarded<E>(chain: Chain<E>, invocation: Invocation<E>) -> Outcome
where
    E: Send + Sync + 'static,
{
    let context = invocation.context.clone();
    let span = debug_span!(
        "dispatch",
        kind = %context.kind(),
        name = %context.name(),
        invocation = %context.id(),
    );

    let result = FaultBoundary::new(context.name(), chain.oneshot(invocation))
        .instrument(span)
        .await;

    match result {
        Ok(Ok(())) => {
            debug!(
                kind = %context.kind(),
                name = %context.name(),
                elapsed_ms = context.elapsed().as_millis() as u64,
                "Handler completed"
            );
            Outcome::Completed
        }
        Ok(Err(e)) => {
            error!(
                kind = %context.kind(),
                name = %context.name(),
                invocation = %context.id(),
                error = %e,
                "Handler returned error"
            );
            Outcome::Failed(e)
        }
        Err(fault) => {
            error!(
                kind = %context.kind(),
                name = %context.name(),
                invocation = %context.id(),
                panic_msg = %fault.message,
                location = fault.location.as_deref().unwrap_or("unknown"),
                "Handler panicked, recovered at dispatch boundary"
            );
            debug!(backtrace = %fault.backtrace, "Panic backtrace");
            Outcome::Faulted(fault)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tether_core::{Interaction, MemorySession};

    use super::*;
    use crate::context::HandlerKind;
    use crate::stack::chain_fn;

    fn invocation() -> Invocation<Interaction> {
        Invocation::new(
            HandlerKind::Command,
            "explode",
            MemorySession::new("app"),
            Arc::new(Interaction::new("1", "explode")),
        )
    }

    #[tokio::test]
    async fn test_boundary_passes_output_through() {
        let output = FaultBoundary::new("plain", async { 7 }).await;
        assert_eq!(output.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_boundary_catches_panic_with_location() {
        let fault = FaultBoundary::new("explode", async {
            panic!("boom");
        })
        .await
        .unwrap_err();

        assert_eq!(fault.handler, "explode");
        assert_eq!(fault.message, "boom");
        assert!(fault.location.unwrap().contains("guard.rs"));
        assert!(!fault.backtrace.is_empty());
    }

    #[tokio::test]
    async fn test_invoke_guarded_outcomes() {
        let ok: Chain<Interaction> = chain_fn(|_| async { Ok(()) });
        let failing: Chain<Interaction> = chain_fn(|_| async { Err("nope".into()) });

        assert!(invoke_guarded(ok, invocation()).await.is_completed());
        assert!(matches!(
            invoke_guarded(failing, invocation()).await,
            Outcome::Failed(e) if e.to_string() == "nope"
        ));
    }

    #[tokio::test]
    async fn test_chain_survives_panic() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let chain: Chain<Interaction> = chain_fn(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    panic!("first call explodes");
                }
                Ok(())
            }
        });

        let first = invoke_guarded(chain.clone(), invocation()).await;
        let second = invoke_guarded(chain, invocation()).await;

        assert!(matches!(first, Outcome::Faulted(f) if f.message == "first call explodes"));
        assert!(second.is_completed());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
