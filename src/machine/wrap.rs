// Route factories and wrapper composition

use std::fmt;
use std::sync::Arc;

use crate::completion::{sequence, RouteContext};
use crate::route::{CallbackBag, Hook, Route, RouteCallbacks};

/// The handler given to a dispatcher. Call [`RouteHandler::hit`] once per
/// matching navigation event.
pub struct RouteHandler<C> {
    handle: Arc<dyn Fn(C) + Send + Sync>,
}

impl<C> RouteHandler<C> {
    pub fn new<F>(handle: F) -> Self
    where
        F: Fn(C) + Send + Sync + 'static,
    {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Report a route hit. Never blocks and never fails.
    pub fn hit(&self, context: C) {
        (self.handle)(context)
    }
}

impl<C> Clone for RouteHandler<C> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
        }
    }
}

impl<C> fmt::Debug for RouteHandler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RouteHandler(..)")
    }
}

/// Anything that turns route callbacks into a dispatcher handler.
pub trait MakeRoute<C>: Send + Sync {
    fn make_route(&self, callbacks: RouteCallbacks<C>) -> RouteHandler<C>;
}

impl<C, F> MakeRoute<C> for F
where
    F: Fn(RouteCallbacks<C>) -> RouteHandler<C> + Send + Sync,
{
    fn make_route(&self, callbacks: RouteCallbacks<C>) -> RouteHandler<C> {
        self(callbacks)
    }
}

/// Build the composite callbacks for `inner` wrapped by `wrapper`.
///
/// `before_enter` and `leave` run the inner hook first; `enter` and
/// `after_leave` run the wrapper hook first.
pub fn compose<C: RouteContext>(wrapper: &Route<C>, inner: &Route<C>) -> CallbackBag<C> {
    let pair = |first: &Route<C>, second: &Route<C>, hook: Hook| {
        sequence(first.slot(hook).clone(), second.slot(hook).clone())
    };

    CallbackBag::new()
        .with(Hook::BeforeEnter, pair(inner, wrapper, Hook::BeforeEnter))
        .with(Hook::Enter, pair(wrapper, inner, Hook::Enter))
        .with(Hook::Leave, pair(inner, wrapper, Hook::Leave))
        .with(Hook::AfterLeave, pair(wrapper, inner, Hook::AfterLeave))
}

/// A route factory layering shared callbacks around every route it makes.
pub struct WrappedMakeRoute<C> {
    wrapper: Arc<Route<C>>,
    base: Arc<dyn MakeRoute<C>>,
}

impl<C: RouteContext> WrappedMakeRoute<C> {
    pub fn new(callbacks: impl Into<RouteCallbacks<C>>, base: impl MakeRoute<C> + 'static) -> Self {
        Self {
            wrapper: Arc::new(Route::new(callbacks)),
            base: Arc::new(base),
        }
    }

    pub fn make_route(&self, callbacks: impl Into<RouteCallbacks<C>>) -> RouteHandler<C> {
        let inner = Route::new(callbacks);
        self.base
            .make_route(RouteCallbacks::Bag(compose(&self.wrapper, &inner)))
    }
}

impl<C> Clone for WrappedMakeRoute<C> {
    fn clone(&self) -> Self {
        Self {
            wrapper: self.wrapper.clone(),
            base: self.base.clone(),
        }
    }
}

impl<C: RouteContext> MakeRoute<C> for WrappedMakeRoute<C> {
    fn make_route(&self, callbacks: RouteCallbacks<C>) -> RouteHandler<C> {
        WrappedMakeRoute::make_route(self, callbacks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    type Ctx = &'static str;
    type Log = Arc<Mutex<Vec<String>>>;

    /// A base factory that keeps the composite route instead of registering it.
    fn capturing_base(captured: Arc<Mutex<Option<Route<Ctx>>>>) -> impl MakeRoute<Ctx> {
        move |callbacks: RouteCallbacks<Ctx>| {
            *captured.lock().unwrap() = Some(Route::new(callbacks));
            RouteHandler::new(|_: Ctx| {})
        }
    }

    fn logging_bag(log: &Log, who: &'static str) -> CallbackBag<Ctx> {
        let mut bag = CallbackBag::new();
        for hook in Hook::ALL {
            let log = log.clone();
            bag = bag.with(
                hook,
                crate::completion::Callback::new(move |_, _| {
                    log.lock().unwrap().push(format!("{} {}", who, hook));
                }),
            );
        }
        bag
    }

    fn wrapped(log: &Log) -> Route<Ctx> {
        let captured = Arc::new(Mutex::new(None));
        let factory =
            WrappedMakeRoute::new(logging_bag(log, "wrapper"), capturing_base(captured.clone()));
        factory.make_route(logging_bag(log, "inner"));
        let route = captured.lock().unwrap().take();
        route.expect("base factory was not called")
    }

    #[tokio::test]
    async fn test_composed_hook_order() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let route = wrapped(&log);

        for hook in Hook::ALL {
            assert_ok!(route.callback(hook, Some("A"), Some("B")).await);
        }

        assert_eq!(
            log.lock().unwrap().as_slice(),
            [
                "inner before_enter",
                "wrapper before_enter",
                "wrapper enter",
                "inner enter",
                "inner leave",
                "wrapper leave",
                "wrapper after_leave",
                "inner after_leave",
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_first_half_skips_second() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::new(Mutex::new(None));
        let enter_log = log.clone();
        let factory = WrappedMakeRoute::new(
            CallbackBag::<Ctx>::new()
                .enter(|_, _| -> anyhow::Result<()> { anyhow::bail!("layout broke") }),
            capturing_base(captured.clone()),
        );
        factory.make_route(RouteCallbacks::<Ctx>::enter_only(move |_, _| {
            enter_log.lock().unwrap().push("inner enter".to_string());
        }));

        let route = captured.lock().unwrap().take().unwrap();
        let err = assert_err!(route.callback(Hook::Enter, Some("A"), None).await);
        assert_eq!(err.to_string(), "layout broke");
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrappers_nest() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::new(Mutex::new(None));

        let outer =
            WrappedMakeRoute::new(logging_bag(&log, "outer"), capturing_base(captured.clone()));
        let inner = WrappedMakeRoute::new(logging_bag(&log, "middle"), outer);
        inner.make_route(logging_bag(&log, "page"));

        let route = captured.lock().unwrap().take().unwrap();
        assert_ok!(route.callback(Hook::Enter, Some("A"), None).await);
        assert_ok!(route.callback(Hook::Leave, Some("A"), Some("B")).await);

        assert_eq!(
            log.lock().unwrap().as_slice(),
            [
                "outer enter",
                "middle enter",
                "page enter",
                "page leave",
                "middle leave",
                "outer leave",
            ]
        );
    }

    #[test]
    fn test_route_handler_forwards_context() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: RouteHandler<Ctx> =
            RouteHandler::new(move |context| sink.lock().unwrap().push(context));

        handler.hit("C1");
        handler.clone().hit("C2");
        assert_eq!(seen.lock().unwrap().as_slice(), ["C1", "C2"]);
    }
}
