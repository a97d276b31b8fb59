// Completion signals - uniform awaiting for sync and async lifecycle callbacks

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures::future::{self, BoxFuture, FutureExt};

/// Anything the machine can thread through callbacks as a navigation context.
pub trait RouteContext: Clone + Send + Sync + 'static {}

impl<T> RouteContext for T where T: Clone + Send + Sync + 'static {}

/// The normalized asynchronous result of invoking a callback.
pub type CompletionSignal = BoxFuture<'static, Result<()>>;

/// What a callback hands back: either an already-settled result or an
/// in-progress computation.
pub enum Completion {
    Settled(Result<()>),
    Pending(CompletionSignal),
}

impl Completion {
    /// Wrap any future, whatever its concrete origin.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Completion::Pending(future.boxed())
    }

    pub fn is_thenable(&self) -> bool {
        matches!(self, Completion::Pending(_))
    }

    /// Turn the result into something awaitable. Settled results resolve
    /// on first poll.
    pub fn into_signal(self) -> CompletionSignal {
        match self {
            Completion::Settled(result) => future::ready(result).boxed(),
            Completion::Pending(signal) => signal,
        }
    }
}

impl From<()> for Completion {
    fn from(_: ()) -> Self {
        Completion::Settled(Ok(()))
    }
}

impl From<Result<()>> for Completion {
    fn from(result: Result<()>) -> Self {
        Completion::Settled(result)
    }
}

impl From<CompletionSignal> for Completion {
    fn from(signal: CompletionSignal) -> Self {
        Completion::Pending(signal)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Settled(result) => f.debug_tuple("Settled").field(result).finish(),
            Completion::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// True iff the value represents an asynchronous computation still to be awaited.
pub fn is_thenable(completion: &Completion) -> bool {
    completion.is_thenable()
}

type CallbackFn<C> = dyn Fn(Option<C>, Option<C>) -> Completion + Send + Sync;

/// One lifecycle callback slot. Cloning shares the underlying function.
pub struct Callback<C> {
    func: Option<Arc<CallbackFn<C>>>,
}

impl<C: RouteContext> Callback<C> {
    /// Build a callback from any function whose return value converts into a
    /// [`Completion`]: `()`, `anyhow::Result<()>`, a boxed signal or a
    /// `Completion` itself.
    pub fn new<F, R>(func: F) -> Self
    where
        F: Fn(Option<C>, Option<C>) -> R + Send + Sync + 'static,
        R: Into<Completion>,
    {
        Self {
            func: Some(Arc::new(move |first, second| -> Completion { func(first, second).into() })),
        }
    }

    /// Build a callback from an async function.
    pub fn future<F, Fut>(func: F) -> Self
    where
        F: Fn(Option<C>, Option<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(move |first, second| Completion::pending(func(first, second)))
    }

    /// Invoke the callback. The no-op settles successfully right away.
    pub fn call(&self, first: Option<C>, second: Option<C>) -> Completion {
        match &self.func {
            Some(func) => func(first, second),
            None => Completion::Settled(Ok(())),
        }
    }
}

impl<C> Callback<C> {
    pub fn noop() -> Self {
        Self { func: None }
    }

    pub fn is_noop(&self) -> bool {
        self.func.is_none()
    }

    /// Identity comparison: both handles refer to the same function.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.func, &other.func) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<C> Clone for Callback<C> {
    fn clone(&self) -> Self {
        Self {
            func: self.func.clone(),
        }
    }
}

impl<C> Default for Callback<C> {
    fn default() -> Self {
        Self::noop()
    }
}

impl<C> fmt::Debug for Callback<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_noop() {
            f.write_str("Callback(noop)")
        } else {
            f.write_str("Callback(..)")
        }
    }
}

/// Call `callback` and normalize whatever it returns into an awaitable signal.
pub fn to_completion_signal<C: RouteContext>(
    callback: &Callback<C>,
    first: Option<C>,
    second: Option<C>,
) -> CompletionSignal {
    callback.call(first, second).into_signal()
}

/// Run `first`, wait for it to succeed, then run `second` with the same
/// arguments. A failure in `first` skips `second` and is returned unchanged.
pub fn sequence<C: RouteContext>(first: Callback<C>, second: Callback<C>) -> Callback<C> {
    Callback::new(move |a: Option<C>, b: Option<C>| {
        let started = first.call(a.clone(), b.clone());
        let second = second.clone();
        Completion::pending(async move {
            started.into_signal().await?;
            second.call(a, b).into_signal().await
        })
    })
}
