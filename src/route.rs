// Route definitions - four normalized lifecycle callback slots per route

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::completion::{
    to_completion_signal, Callback, Completion, CompletionSignal, RouteContext,
};

/// The four lifecycle hooks of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    /// `before_enter(next, prev)`
    BeforeEnter,
    /// `enter(curr, prev)`
    Enter,
    /// `leave(curr, next)`
    Leave,
    /// `after_leave(curr, next)`
    AfterLeave,
}

impl Hook {
    pub const ALL: [Hook; 4] = [Hook::BeforeEnter, Hook::Enter, Hook::Leave, Hook::AfterLeave];

    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::BeforeEnter => "before_enter",
            Hook::Enter => "enter",
            Hook::Leave => "leave",
            Hook::AfterLeave => "after_leave",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bag holding any subset of the four callbacks.
pub struct CallbackBag<C> {
    pub before_enter: Option<Callback<C>>,
    pub enter: Option<Callback<C>>,
    pub leave: Option<Callback<C>>,
    pub after_leave: Option<Callback<C>>,
}

impl<C: RouteContext> CallbackBag<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_enter<F, R>(mut self, func: F) -> Self
    where
        F: Fn(Option<C>, Option<C>) -> R + Send + Sync + 'static,
        R: Into<Completion>,
    {
        self.before_enter = Some(Callback::new(func));
        self
    }

    pub fn enter<F, R>(mut self, func: F) -> Self
    where
        F: Fn(Option<C>, Option<C>) -> R + Send + Sync + 'static,
        R: Into<Completion>,
    {
        self.enter = Some(Callback::new(func));
        self
    }

    pub fn leave<F, R>(mut self, func: F) -> Self
    where
        F: Fn(Option<C>, Option<C>) -> R + Send + Sync + 'static,
        R: Into<Completion>,
    {
        self.leave = Some(Callback::new(func));
        self
    }

    pub fn after_leave<F, R>(mut self, func: F) -> Self
    where
        F: Fn(Option<C>, Option<C>) -> R + Send + Sync + 'static,
        R: Into<Completion>,
    {
        self.after_leave = Some(Callback::new(func));
        self
    }

    /// Set a slot from an existing callback handle.
    pub fn with(mut self, hook: Hook, callback: Callback<C>) -> Self {
        let slot = match hook {
            Hook::BeforeEnter => &mut self.before_enter,
            Hook::Enter => &mut self.enter,
            Hook::Leave => &mut self.leave,
            Hook::AfterLeave => &mut self.after_leave,
        };
        *slot = Some(callback);
        self
    }
}

impl<C> Default for CallbackBag<C> {
    fn default() -> Self {
        Self {
            before_enter: None,
            enter: None,
            leave: None,
            after_leave: None,
        }
    }
}

/// How a route was described by the caller.
pub enum RouteCallbacks<C> {
    /// Shorthand: a single function used as `enter`.
    Enter(Callback<C>),
    Bag(CallbackBag<C>),
}

impl<C: RouteContext> RouteCallbacks<C> {
    pub fn enter_only<F, R>(func: F) -> Self
    where
        F: Fn(Option<C>, Option<C>) -> R + Send + Sync + 'static,
        R: Into<Completion>,
    {
        RouteCallbacks::Enter(Callback::new(func))
    }
}

impl<C> RouteCallbacks<C> {
    pub fn is_enter_only(&self) -> bool {
        matches!(self, RouteCallbacks::Enter(_))
    }
}

impl<C> Default for RouteCallbacks<C> {
    fn default() -> Self {
        RouteCallbacks::Bag(CallbackBag::default())
    }
}

impl<C> From<Callback<C>> for RouteCallbacks<C> {
    fn from(callback: Callback<C>) -> Self {
        RouteCallbacks::Enter(callback)
    }
}

impl<C> From<CallbackBag<C>> for RouteCallbacks<C> {
    fn from(bag: CallbackBag<C>) -> Self {
        RouteCallbacks::Bag(bag)
    }
}

/// A route with all four slots resolved; absent callbacks are no-ops.
pub struct Route<C> {
    before_enter: Callback<C>,
    enter: Callback<C>,
    leave: Callback<C>,
    after_leave: Callback<C>,
}

impl<C> Route<C> {
    pub fn new(callbacks: impl Into<RouteCallbacks<C>>) -> Self {
        match callbacks.into() {
            RouteCallbacks::Enter(enter) => Self {
                enter,
                ..Self::empty()
            },
            RouteCallbacks::Bag(bag) => Self {
                before_enter: bag.before_enter.unwrap_or_default(),
                enter: bag.enter.unwrap_or_default(),
                leave: bag.leave.unwrap_or_default(),
                after_leave: bag.after_leave.unwrap_or_default(),
            },
        }
    }

    /// The "no route yet" placeholder.
    pub fn empty() -> Self {
        Self {
            before_enter: Callback::noop(),
            enter: Callback::noop(),
            leave: Callback::noop(),
            after_leave: Callback::noop(),
        }
    }

    pub fn slot(&self, hook: Hook) -> &Callback<C> {
        match hook {
            Hook::BeforeEnter => &self.before_enter,
            Hook::Enter => &self.enter,
            Hook::Leave => &self.leave,
            Hook::AfterLeave => &self.after_leave,
        }
    }
}

impl<C: RouteContext> Route<C> {
    /// Invoke the named hook. Failures are not caught here.
    pub fn callback(&self, hook: Hook, first: Option<C>, second: Option<C>) -> CompletionSignal {
        to_completion_signal(self.slot(hook), first, second)
    }
}

impl<C> Default for Route<C> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<C> fmt::Debug for Route<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("before_enter", &self.before_enter)
            .field("enter", &self.enter)
            .field("leave", &self.leave)
            .field("after_leave", &self.after_leave)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio_test::{assert_err, assert_ok};

    type Ctx = &'static str;

    #[test]
    fn test_single_callback_becomes_enter() {
        let f: Callback<Ctx> = Callback::new(|_, _| ());
        let callbacks = RouteCallbacks::from(f.clone());
        assert!(callbacks.is_enter_only());

        let route = Route::new(callbacks);
        assert!(route.slot(Hook::Enter).ptr_eq(&f));
        assert!(route.slot(Hook::BeforeEnter).is_noop());
        assert!(route.slot(Hook::Leave).is_noop());
        assert!(route.slot(Hook::AfterLeave).is_noop());
    }

    #[test]
    fn test_bag_fills_missing_slots_with_noop() {
        let leave: Callback<Ctx> = Callback::new(|_, _| ());
        let route = Route::new(CallbackBag::new().with(Hook::Leave, leave.clone()));

        assert!(route.slot(Hook::Leave).ptr_eq(&leave));
        for hook in [Hook::BeforeEnter, Hook::Enter, Hook::AfterLeave] {
            assert!(route.slot(hook).is_noop(), "{} should default to noop", hook);
        }
    }

    #[test]
    fn test_default_callbacks_give_empty_route() {
        let callbacks = RouteCallbacks::<Ctx>::default();
        assert!(!callbacks.is_enter_only());

        let route = Route::new(callbacks);
        assert!(Hook::ALL.iter().all(|hook| route.slot(*hook).is_noop()));
    }

    #[tokio::test]
    async fn test_callback_invokes_named_slot_with_both_contexts() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let enter_seen = seen.clone();
        let leave_seen = seen.clone();

        let route = Route::new(
            CallbackBag::<Ctx>::new()
                .enter(move |curr, prev| {
                    enter_seen.lock().unwrap().push(("enter", curr, prev));
                })
                .leave(move |curr, next| {
                    leave_seen.lock().unwrap().push(("leave", curr, next));
                }),
        );

        assert_ok!(route.callback(Hook::Enter, Some("C2"), Some("C1")).await);
        assert_ok!(route.callback(Hook::Leave, Some("C2"), Some("C3")).await);
        assert_ok!(route.callback(Hook::AfterLeave, Some("C2"), Some("C3")).await);

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [
                ("enter", Some("C2"), Some("C1")),
                ("leave", Some("C2"), Some("C3")),
            ]
        );
    }

    #[tokio::test]
    async fn test_callback_propagates_failures() {
        let route = Route::new(
            CallbackBag::<Ctx>::new()
                .before_enter(|_, _| -> anyhow::Result<()> { anyhow::bail!("not allowed") }),
        );

        let err = assert_err!(route.callback(Hook::BeforeEnter, Some("C1"), None).await);
        assert_eq!(err.to_string(), "not allowed");
    }

    #[test]
    fn test_hook_names() {
        let names: Vec<_> = Hook::ALL.iter().map(|hook| hook.to_string()).collect();
        assert_eq!(names, ["before_enter", "enter", "leave", "after_leave"]);
    }
}
