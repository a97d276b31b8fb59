use thiserror::Error;

use crate::machine::{MachineState, Phase};

/// Failures reported by the route machine.
#[derive(Debug, Error)]
pub enum MachineError {
    /// A lifecycle callback failed while the machine was leaving or entering.
    #[error("{phase} phase failed: {source}")]
    Transition {
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },
    #[error("cannot reset a machine in {state} state")]
    NotFailed { state: MachineState },
}

impl MachineError {
    pub fn phase(&self) -> Option<Phase> {
        match self {
            MachineError::Transition { phase, .. } => Some(*phase),
            MachineError::NotFailed { .. } => None,
        }
    }
}
