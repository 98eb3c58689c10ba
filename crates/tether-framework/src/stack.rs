//! The stack compiler.
//!
//! A *stack* is one handler plus an ordered list of middleware. Compiling it
//! produces a single [`Chain`]: a boxed, cloneable tower service that takes an
//! [`Invocation`] and returns `Result<(), BoxError>`.
//!
//! The first middleware in the list is the outermost layer: it sees the call
//! first and the outcome last. Compilation folds the list back to front:
//!
//! ```text
//! compile(h, [m0, m1, m2], base)
//!     = m0.handle(h, m1.handle(h, m2.handle(h, base)))
//!
//! call ─▶ m0 ─▶ m1 ─▶ m2 ─▶ h
//! outcome ◀─ m0 ◀─ m1 ◀─ m2 ◀─┘
//! ```
//!
//! Middleware are ordinary values implementing [`Middleware`]. Closures can be
//! lifted with [`middleware_fn`], and any tower [`Layer`] over a chain can be
//! used through [`LayerMiddleware`].

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::mpsc;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Layer, Service, ServiceExt, service_fn};
use tracing::trace;

use crate::context::Invocation;

/// A compiled call chain.
pub type Chain<E> = BoxCloneSyncService<Invocation<E>, (), BoxError>;

/// Wraps a chain with a cross-cutting concern.
///
/// `H` is the handler type the middleware is attached to (usually a trait
/// object such as `dyn Command`), and `E` the payload flowing through the
/// chain. Implementations receive the handler so they can inspect its
/// declaration, e.g. a command's permission bits.
pub trait Middleware<H: ?Sized, E>: Send + Sync + 'static {
    /// Returns a chain that wraps `next`.
    fn handle(&self, handler: &Arc<H>, next: Chain<E>) -> Chain<E>;
}

/// Compiles a handler and its middleware into one chain.
///
/// `base` is the chain that finally runs the handler. The returned chain
/// runs `middleware[0]` first; the handler runs exactly once unless a
/// middleware short-circuits.
pub fn compile<H: ?Sized + 'static, E: 'static>(
    handler: &Arc<H>,
    middleware: &[Arc<dyn Middleware<H, E>>],
    base: Chain<E>,
) -> Chain<E> {
    middleware
        .iter()
        .rev()
        .fold(base, |next, layer| layer.handle(handler, next))
}

/// Builds a chain from an async function.
pub fn chain_fn<E, F, Fut>(f: F) -> Chain<E>
where
    E: Send + Sync + 'static,
    F: Fn(Invocation<E>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    BoxCloneSyncService::new(service_fn(f))
}

// ============================================================================
// Closure middleware
// ============================================================================

/// A middleware built from a closure.
///
/// See [`middleware_fn`].
pub struct FnMiddleware<F, H: ?Sized, E> {
    f: Arc<F>,
    _marker: PhantomData<fn(&H, E)>,
}

/// Creates a middleware from an async closure receiving the invocation and
/// the next chain.
///
/// # Example
///
/// ```rust,ignore
/// let audit = middleware_fn(|invocation: Invocation<Interaction>, next: Chain<Interaction>| async move {
///     info!(user = ?invocation.event.user_id, "command used");
///     next.oneshot(invocation).await
/// });
/// ```
pub fn middleware_fn<H, E, F, Fut>(f: F) -> FnMiddleware<F, H, E>
where
    H: ?Sized + 'static,
    E: Send + Sync + 'static,
    F: Fn(Invocation<E>, Chain<E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    FnMiddleware {
        f: Arc::new(f),
        _marker: PhantomData,
    }
}

impl<F, H, E, Fut> Middleware<H, E> for FnMiddleware<F, H, E>
where
    H: ?Sized + 'static,
    E: Send + Sync + 'static,
    F: Fn(Invocation<E>, Chain<E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn handle(&self, _handler: &Arc<H>, next: Chain<E>) -> Chain<E> {
        let f = self.f.clone();
        chain_fn(move |invocation| f(invocation, next.clone()))
    }
}

// ============================================================================
// Tower layers
// ============================================================================

/// Adapts a tower [`Layer`] into a middleware.
///
/// ```rust,ignore
/// let stack = CommandStack::new(Ping)
///     .with(LayerMiddleware::new(TimeoutLayer::new(Duration::from_secs(3))));
/// ```
pub struct LayerMiddleware<L, H: ?Sized, E> {
    layer: L,
    _marker: PhantomData<fn(&H, E)>,
}

impl<L, H: ?Sized, E> LayerMiddleware<L, H, E> {
    pub fn new(layer: L) -> Self {
        Self {
            layer,
            _marker: PhantomData,
        }
    }
}

impl<L, S, H, E> Middleware<H, E> for LayerMiddleware<L, H, E>
where
    L: Layer<Chain<E>, Service = S> + Send + Sync + 'static,
    S: Service<Invocation<E>, Response = ()> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    H: ?Sized + 'static,
    E: Send + Sync + 'static,
{
    fn handle(&self, _handler: &Arc<H>, next: Chain<E>) -> Chain<E> {
        BoxCloneSyncService::new(self.layer.layer(next).map_err(Into::<BoxError>::into))
    }
}

// ============================================================================
// Concurrent compilation
// ============================================================================

/// Compiles every stack on its own task and streams the results.
///
/// Returns the receiving end of a channel bounded to the number of stacks,
/// plus that number. Results arrive in completion order. If a compilation
/// task dies the channel closes with fewer results than expected.
pub(crate) fn spawn_compilers<S, T, F>(stacks: Vec<S>, compile: F) -> (mpsc::Receiver<T>, usize)
where
    S: Send + 'static,
    T: Send + 'static,
    F: Fn(S) -> T + Clone + Send + 'static,
{
    let expected = stacks.len();
    let (tx, rx) = mpsc::channel(expected.max(1));

    for stack in stacks {
        let tx = tx.clone();
        let compile = compile.clone();
        tokio::spawn(async move {
            if tx.send(compile(stack)).await.is_err() {
                trace!("Publisher stopped before the compiled stack was received");
            }
        });
    }

    (rx, expected)
}
