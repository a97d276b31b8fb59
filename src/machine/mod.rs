// Route Machine - serializes route transitions driven by dispatcher hits
//
// Only one transition (LEAVING or ENTERING) is ever in flight. Hits arriving
// meanwhile land in a two-deep buffer and are picked up automatically once the
// running phase settles.

pub mod state;
pub mod wrap;


use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use statig::prelude::*;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::completion::{sequence, RouteContext};
use crate::config::ObservabilityConfig;
use crate::error::MachineError;
use crate::observer::{TracingObserver, TransitionEvent, TransitionObserver};
use crate::route::{Hook, Route, RouteCallbacks};
use crate::telemetry::{generate_transition_id, transition_span};

pub use state::{BufferSlot, MachineState, MachineStatus, Phase};
pub use wrap::{compose, MakeRoute, RouteHandler, WrappedMakeRoute};

/// What moves the lifecycle from one state to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleEvent {
    /// `run()` was called; `enqueued` tells whether a hit is waiting.
    Run { enqueued: bool },
    PhaseSettled(Phase),
    PhaseFailed(Phase),
    Reset,
}

/// The transition lifecycle. Buffers and routes live in [`MachineInner`];
/// this only decides which state follows which.
#[derive(Debug, Default)]
struct RouteLifecycle {
    entries: u64,
}

#[state_machine(initial = "State::entered()")]
impl RouteLifecycle {
    #[state]
    fn entered(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Run { enqueued: true } => Transition(State::leaving()),
            _ => Handled,
        }
    }

    #[state]
    fn leaving(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::PhaseSettled(Phase::Leaving) => Transition(State::left()),
            LifecycleEvent::PhaseFailed(Phase::Leaving) => Transition(State::error()),
            _ => Handled,
        }
    }

    #[state]
    fn left(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Run { enqueued: true } => Transition(State::entering()),
            // Only reachable with a hit enqueued; fall back to idle.
            LifecycleEvent::Run { enqueued: false } => Transition(State::entered()),
            _ => Handled,
        }
    }

    #[state]
    fn entering(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::PhaseSettled(Phase::Entering) => {
                self.entries += 1;
                Transition(State::entered())
            }
            LifecycleEvent::PhaseFailed(Phase::Entering) => Transition(State::error()),
            _ => Handled,
        }
    }

    #[state]
    fn error(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Reset => Transition(State::entered()),
            _ => Handled,
        }
    }
}

/// A route paired with the context it was hit with.
struct Hit<C> {
    route: Arc<Route<C>>,
    context: C,
}

struct Current<C> {
    route: Arc<Route<C>>,
    context: Option<C>,
}

struct MachineInner<C> {
    lifecycle: StateMachine<RouteLifecycle>,
    current: Current<C>,
    enqueued: Option<Hit<C>>,
    after_enqueued: Option<Hit<C>>,
    transition: Option<Uuid>,
    last_error: Option<Arc<MachineError>>,
    runtime: Option<Handle>,
}

/// Everything a LEAVING phase needs, captured under the lock.
struct LeavePlan<C> {
    current_route: Arc<Route<C>>,
    current_context: Option<C>,
    next_route: Arc<Route<C>>,
    next_context: C,
    transition: Uuid,
}

struct EnterPlan<C> {
    route: Arc<Route<C>>,
    context: C,
    last_context: Option<C>,
    transition: Uuid,
}

enum Step<C> {
    Leave(LeavePlan<C>),
    Enter(EnterPlan<C>),
}

impl<C: RouteContext> MachineInner<C> {
    fn new(runtime: Option<Handle>) -> Self {
        Self {
            lifecycle: RouteLifecycle::default().state_machine(),
            current: Current {
                route: Arc::new(Route::empty()),
                context: None,
            },
            enqueued: None,
            after_enqueued: None,
            transition: None,
            last_error: None,
            runtime,
        }
    }

    fn state(&self) -> MachineState {
        match self.lifecycle.state() {
            State::Entered { .. } => MachineState::Entered,
            State::Leaving { .. } => MachineState::Leaving,
            State::Left { .. } => MachineState::Left,
            State::Entering { .. } => MachineState::Entering,
            State::Error { .. } => MachineState::Error,
        }
    }

    fn pending(&self) -> usize {
        usize::from(self.enqueued.is_some()) + usize::from(self.after_enqueued.is_some())
    }

    fn status(&self) -> MachineStatus {
        MachineStatus {
            state: self.state(),
            pending: self.pending(),
            entered: self.lifecycle.inner().entries,
        }
    }

    /// The runtime phases are spawned on. The first one seen is kept so
    /// later hits may come from threads outside any runtime.
    fn runtime(&mut self) -> Option<Handle> {
        if self.runtime.is_none() {
            self.runtime = Handle::try_current().ok();
        }
        self.runtime.clone()
    }

    /// ENTERED: capture what leaving the current route needs.
    fn leave_plan(&mut self) -> Option<LeavePlan<C>> {
        let next = self.enqueued.as_ref()?;
        let transition = generate_transition_id();
        let plan = LeavePlan {
            current_route: self.current.route.clone(),
            current_context: self.current.context.clone(),
            next_route: next.route.clone(),
            next_context: next.context.clone(),
            transition,
        };
        self.transition = Some(transition);
        Some(plan)
    }

    /// LEFT: make the enqueued hit current and shift the buffer.
    fn promote_enqueued(&mut self) -> Option<EnterPlan<C>> {
        let next = self.enqueued.take()?;
        let last_context = self.current.context.take();
        self.current = Current {
            route: next.route.clone(),
            context: Some(next.context.clone()),
        };
        self.enqueued = self.after_enqueued.take();

        let transition = *self.transition.get_or_insert_with(generate_transition_id);
        Some(EnterPlan {
            route: next.route,
            context: next.context,
            last_context,
            transition,
        })
    }
}

struct Shared<C> {
    inner: Mutex<MachineInner<C>>,
    status: watch::Sender<MachineStatus>,
    observer: Arc<dyn TransitionObserver>,
}

/// The route transition state machine.
///
/// Cheap to clone; all clones drive the same machine. Phases are spawned on
/// the Tokio runtime the machine was built in (or the one given with
/// [`RouteMachine::with_handle`]), so hits may come from any thread.
pub struct RouteMachine<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for RouteMachine<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C: RouteContext> Default for RouteMachine<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: RouteContext> RouteMachine<C> {
    /// A machine logging through [`TracingObserver`] with tracing turned off.
    pub fn new() -> Self {
        Self::with_observer(TracingObserver::default())
    }

    pub fn from_config(config: &ObservabilityConfig) -> Self {
        Self::with_observer(TracingObserver::new(config.trace_transitions))
    }

    pub fn with_observer(observer: impl TransitionObserver + 'static) -> Self {
        let (status, _) = watch::channel(MachineStatus::initial());
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(MachineInner::new(Handle::try_current().ok())),
                status,
                observer: Arc::new(observer),
            }),
        }
    }

    /// Spawn transition phases on `handle` instead of the runtime the
    /// machine was built in.
    pub fn with_handle(self, handle: Handle) -> Self {
        self.lock().runtime = Some(handle);
        self
    }

    /// Wrap `callbacks` into a handler for the dispatcher. Each call of the
    /// handler enqueues this route with the given context.
    pub fn make_route(&self, callbacks: impl Into<RouteCallbacks<C>>) -> RouteHandler<C> {
        let route = Arc::new(Route::new(callbacks));
        let machine = self.clone();
        RouteHandler::new(move |context| machine.accept(route.clone(), context))
    }

    /// A route factory that layers `callbacks` around every route it makes
    /// and registers the result with this machine.
    pub fn wrap_make_route(&self, callbacks: impl Into<RouteCallbacks<C>>) -> WrappedMakeRoute<C> {
        WrappedMakeRoute::new(callbacks, self.clone())
    }

    /// Like [`RouteMachine::wrap_make_route`] but forwarding to `base`.
    pub fn wrap_make_route_with(
        &self,
        callbacks: impl Into<RouteCallbacks<C>>,
        base: impl MakeRoute<C> + 'static,
    ) -> WrappedMakeRoute<C> {
        WrappedMakeRoute::new(callbacks, base)
    }

    pub fn state(&self) -> MachineState {
        self.lock().state()
    }

    pub fn status(&self) -> MachineStatus {
        self.lock().status()
    }

    /// Watch status snapshots as the machine moves.
    pub fn subscribe(&self) -> watch::Receiver<MachineStatus> {
        self.shared.status.subscribe()
    }

    /// Wait until the machine is idle with nothing buffered, or failed.
    pub async fn settled(&self) -> MachineStatus {
        let mut updates = self.subscribe();
        let settled = updates.wait_for(MachineStatus::is_settled).await.map(|status| *status);
        // The sender lives in `self`, so the channel cannot close here.
        settled.unwrap_or_else(|_| self.status())
    }

    pub fn current_context(&self) -> Option<C> {
        self.lock().current.context.clone()
    }

    pub fn enqueued_context(&self) -> Option<C> {
        self.lock().enqueued.as_ref().map(|hit| hit.context.clone())
    }

    pub fn after_enqueued_context(&self) -> Option<C> {
        self.lock().after_enqueued.as_ref().map(|hit| hit.context.clone())
    }

    pub fn is_healthy(&self) -> bool {
        self.state() != MachineState::Error
    }

    pub fn last_error(&self) -> Option<Arc<MachineError>> {
        self.lock().last_error.clone()
    }

    /// Leave the ERROR state and resume servicing buffered hits.
    ///
    /// After a failed ENTERING phase the route whose `enter` failed stays
    /// current; after a failed LEAVING phase the enqueued hit is retried.
    pub fn reset(&self) -> Result<(), MachineError> {
        let transition = {
            let mut inner = self.lock();
            let state = inner.state();
            if state != MachineState::Error {
                return Err(MachineError::NotFailed { state });
            }
            inner.lifecycle.handle(&LifecycleEvent::Reset);
            inner.last_error = None;
            self.publish(&inner);
            inner.transition.take()
        };

        self.emit(TransitionEvent::StateChanged {
            from: MachineState::Error,
            to: MachineState::Entered,
            transition,
        });
        self.run();
        Ok(())
    }

    /// Advance the machine if it is idle with work waiting. Safe to call at
    /// any time: while a phase is in flight, or after a failure, it does
    /// nothing.
    ///
    /// Without a runtime to spawn on, the hit stays enqueued until `run` is
    /// called again from inside one.
    pub fn run(&self) {
        let (from, to, step) = {
            let mut inner = self.lock();
            let from = inner.state();
            let enqueued = inner.enqueued.is_some();
            if !enqueued || !matches!(from, MachineState::Entered | MachineState::Left) {
                if from == MachineState::Left {
                    inner.lifecycle.handle(&LifecycleEvent::Run { enqueued });
                    self.publish(&inner);
                }
                let to = inner.state();
                (from, to, None)
            } else {
                let Some(runtime) = inner.runtime() else {
                    warn!(
                        state = %from,
                        "No Tokio runtime to drive the next phase; hit stays enqueued"
                    );
                    return;
                };
                let step = match from {
                    MachineState::Entered => inner.leave_plan().map(Step::Leave),
                    _ => inner.promote_enqueued().map(Step::Enter),
                };
                inner.lifecycle.handle(&LifecycleEvent::Run { enqueued });
                self.publish(&inner);
                (from, inner.state(), step.map(|step| (runtime, step)))
            }
        };

        if from != to {
            let transition = match &step {
                Some((_, Step::Leave(plan))) => Some(plan.transition),
                Some((_, Step::Enter(plan))) => Some(plan.transition),
                None => None,
            };
            self.emit(TransitionEvent::StateChanged { from, to, transition });
        }

        match step {
            Some((runtime, Step::Leave(plan))) => self.drive_leaving(&runtime, plan),
            Some((runtime, Step::Enter(plan))) => self.drive_entering(&runtime, plan),
            None => {}
        }
    }

    fn accept(&self, route: Arc<Route<C>>, context: C) {
        let (slot, replaced) = {
            let mut inner = self.lock();
            let accepted = if inner.enqueued.is_none() {
                inner.enqueued = Some(Hit { route, context });
                (BufferSlot::Enqueued, false)
            } else {
                let replaced = inner.after_enqueued.replace(Hit { route, context }).is_some();
                (BufferSlot::AfterEnqueued, replaced)
            };
            self.publish(&inner);
            accepted
        };

        self.emit(TransitionEvent::HitAccepted { slot, replaced });

        // A full enqueued slot means the machine is already busy with it.
        if slot == BufferSlot::Enqueued {
            self.run();
        }
    }

    fn drive_leaving(&self, runtime: &Handle, plan: LeavePlan<C>) {
        // Both groups get the enqueued context as "next".
        let next = Some(plan.next_context);
        let before_enter =
            plan.next_route
                .callback(Hook::BeforeEnter, next.clone(), plan.current_context.clone());
        let leave = sequence(
            plan.current_route.slot(Hook::Leave).clone(),
            plan.current_route.slot(Hook::AfterLeave).clone(),
        )
        .call(plan.current_context, next)
        .into_signal();

        let machine = self.clone();
        self.spawn_phase(runtime, Phase::Leaving, plan.transition, async move {
            let (entered, left) = tokio::join!(before_enter, leave);
            match entered.and(left) {
                Ok(()) => machine.complete(Phase::Leaving),
                Err(error) => machine.fail(Phase::Leaving, MachineError::Transition {
                    phase: Phase::Leaving,
                    source: error,
                }),
            }
        });
    }

    fn drive_entering(&self, runtime: &Handle, plan: EnterPlan<C>) {
        let enter = plan
            .route
            .callback(Hook::Enter, Some(plan.context), plan.last_context);

        let machine = self.clone();
        self.spawn_phase(runtime, Phase::Entering, plan.transition, async move {
            match enter.await {
                Ok(()) => machine.complete(Phase::Entering),
                Err(error) => machine.fail(Phase::Entering, MachineError::Transition {
                    phase: Phase::Entering,
                    source: error,
                }),
            }
        });
    }

    fn spawn_phase<F>(&self, runtime: &Handle, phase: Phase, transition: Uuid, phase_future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(phase = %phase, transition.id = %transition, "Spawning transition phase");
        runtime.spawn(phase_future.instrument(transition_span(phase, transition)));
    }

    /// A phase settled successfully: move on and look for more work.
    fn complete(&self, phase: Phase) {
        let (from, to, transition) = {
            let mut inner = self.lock();
            let from = inner.state();
            let transition = inner.transition;
            inner.lifecycle.handle(&LifecycleEvent::PhaseSettled(phase));
            if phase == Phase::Entering {
                inner.transition = None;
            }
            self.publish(&inner);
            (from, inner.state(), transition)
        };

        self.emit(TransitionEvent::StateChanged { from, to, transition });
        self.run();
    }

    fn fail(&self, phase: Phase, error: MachineError) {
        let error = Arc::new(error);
        let (from, to, transition) = {
            let mut inner = self.lock();
            let from = inner.state();
            inner.lifecycle.handle(&LifecycleEvent::PhaseFailed(phase));
            inner.last_error = Some(error.clone());
            self.publish(&inner);
            (from, inner.state(), inner.transition)
        };

        self.emit(TransitionEvent::StateChanged { from, to, transition });
        self.emit(TransitionEvent::Failed {
            phase,
            transition,
            error,
        });
    }

    fn lock(&self) -> MutexGuard<'_, MachineInner<C>> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &MachineInner<C>) {
        self.shared.status.send_replace(inner.status());
    }

    fn emit(&self, event: TransitionEvent) {
        self.shared.observer.on_event(&event);
    }
}

impl<C: RouteContext> MakeRoute<C> for RouteMachine<C> {
    fn make_route(&self, callbacks: RouteCallbacks<C>) -> RouteHandler<C> {
        RouteMachine::make_route(self, callbacks)
    }
}
