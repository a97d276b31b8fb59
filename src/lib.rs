// Route Machine Library - serialized route lifecycle transitions
// This exposes the core components for dispatchers, tests and the demo binary

pub mod completion;
pub mod route;
pub mod machine;
pub mod observer;
pub mod error;
pub mod config;
pub mod telemetry;

// Re-export key types for easy access
pub use completion::{
    is_thenable, sequence, to_completion_signal, Callback, Completion, CompletionSignal,
    RouteContext,
};
pub use route::{CallbackBag, Hook, Route, RouteCallbacks};
pub use machine::{
    compose, BufferSlot, MachineState, MachineStatus, MakeRoute, Phase, RouteHandler, RouteMachine,
    WrappedMakeRoute,
};
pub use observer::{TracingObserver, TransitionEvent, TransitionObserver};
pub use error::MachineError;
pub use config::{config, init_config, ObservabilityConfig, RouteMachineConfig, SimulationConfig};
pub use telemetry::{init_telemetry, transition_span};
