use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the machine is in its transition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineState {
    Entered,
    Leaving,
    Left,
    Entering,
    /// Terminal until an explicit reset.
    Error,
}

impl MachineState {
    /// A callback group is in flight.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, MachineState::Leaving | MachineState::Entering)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MachineState::Entered => "ENTERED",
            MachineState::Leaving => "LEAVING",
            MachineState::Left => "LEFT",
            MachineState::Entering => "ENTERING",
            MachineState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// The two halves of a transition that run user callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Leaving,
    Entering,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Leaving => f.write_str("leaving"),
            Phase::Entering => f.write_str("entering"),
        }
    }
}

/// Which buffer slot an incoming hit was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferSlot {
    Enqueued,
    AfterEnqueued,
}

/// Snapshot published on every mutation of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineStatus {
    pub state: MachineState,
    /// Buffered hits waiting behind the current route (0..=2).
    pub pending: usize,
    /// Number of enter phases that completed successfully.
    pub entered: u64,
}

impl MachineStatus {
    pub(crate) fn initial() -> Self {
        Self {
            state: MachineState::Entered,
            pending: 0,
            entered: 0,
        }
    }

    /// Nothing left to do without outside help: idle with an empty buffer,
    /// or stuck in `Error`.
    pub fn is_settled(&self) -> bool {
        match self.state {
            MachineState::Entered => self.pending == 0,
            MachineState::Error => true,
            _ => false,
        }
    }
}
