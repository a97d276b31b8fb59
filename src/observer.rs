// Transition observers - structured events out of the route machine

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::error::MachineError;
use crate::machine::{BufferSlot, MachineState, Phase};

/// Something the machine did, reported after the fact.
#[derive(Debug, Clone)]
pub enum TransitionEvent {
    /// A route hit was written to a buffer slot. `replaced` is set when an
    /// earlier after-enqueued hit was dropped without ever being run.
    HitAccepted { slot: BufferSlot, replaced: bool },
    StateChanged {
        from: MachineState,
        to: MachineState,
        transition: Option<Uuid>,
    },
    Failed {
        phase: Phase,
        transition: Option<Uuid>,
        error: Arc<MachineError>,
    },
}

/// Receives transition events. Implementations must not block.
pub trait TransitionObserver: Send + Sync {
    fn on_event(&self, event: &TransitionEvent);
}

impl<F> TransitionObserver for F
where
    F: Fn(&TransitionEvent) + Send + Sync,
{
    fn on_event(&self, event: &TransitionEvent) {
        self(event)
    }
}

/// Default observer: logs through `tracing`.
///
/// Hits and state changes are only logged when `trace_transitions` is set;
/// failures are always logged.
#[derive(Debug, Clone, Default)]
pub struct TracingObserver {
    trace_transitions: bool,
}

impl TracingObserver {
    pub fn new(trace_transitions: bool) -> Self {
        Self { trace_transitions }
    }

    pub fn trace_transitions(&self) -> bool {
        self.trace_transitions
    }
}

impl TransitionObserver for TracingObserver {
    fn on_event(&self, event: &TransitionEvent) {
        match event {
            TransitionEvent::HitAccepted { slot, replaced } => {
                if self.trace_transitions {
                    info!(slot = ?slot, replaced = %replaced, "Route hit accepted");
                }
            }
            TransitionEvent::StateChanged {
                from,
                to,
                transition,
            } => {
                if self.trace_transitions {
                    info!(
                        from = %from,
                        to = %to,
                        transition.id = ?transition,
                        "Route machine state changed"
                    );
                }
            }
            TransitionEvent::Failed {
                phase,
                transition,
                error,
            } => {
                error!(
                    phase = %phase,
                    transition.id = ?transition,
                    error = %error,
                    "Route transition failed"
                );
            }
        }
    }
}
