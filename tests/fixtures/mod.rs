// Shared helpers for driving a route machine from integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use route_machine::{
    Callback, CallbackBag, Completion, Hook, MachineState, MachineStatus, RouteMachine,
};
use tokio::sync::Notify;

pub type Ctx = &'static str;

/// Ordered log of every callback invocation.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|call| call == entry)
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.calls.lock().unwrap().iter().position(|call| call == entry)
    }

    /// A callback that logs `name.hook(first, second)` and settles at once.
    pub fn callback(&self, name: &'static str, hook: Hook) -> Callback<Ctx> {
        let recorder = self.clone();
        Callback::new(move |first: Option<Ctx>, second: Option<Ctx>| {
            recorder.push(format_call(name, hook, first, second));
        })
    }

    /// A callback that logs, then waits for `gate` before settling.
    pub fn gated(&self, name: &'static str, hook: Hook, gate: &Arc<Notify>) -> Callback<Ctx> {
        let recorder = self.clone();
        let gate = gate.clone();
        Callback::new(move |first: Option<Ctx>, second: Option<Ctx>| {
            recorder.push(format_call(name, hook, first, second));
            let gate = gate.clone();
            Completion::pending(async move {
                gate.notified().await;
                Ok(())
            })
        })
    }

    /// A callback that logs and rejects the first time it runs only.
    pub fn fail_once(&self, name: &'static str, hook: Hook) -> Callback<Ctx> {
        let recorder = self.clone();
        let failed = Arc::new(AtomicBool::new(false));
        Callback::new(move |first: Option<Ctx>, second: Option<Ctx>| {
            recorder.push(format_call(name, hook, first, second));
            let first_call = !failed.swap(true, Ordering::SeqCst);
            Completion::pending(async move {
                if first_call {
                    anyhow::bail!("{} {} rejected", name, hook);
                }
                Ok(())
            })
        })
    }

    /// A bag with all four hooks logging under `name`.
    pub fn bag(&self, name: &'static str) -> CallbackBag<Ctx> {
        Hook::ALL
            .into_iter()
            .fold(CallbackBag::new(), |bag, hook| bag.with(hook, self.callback(name, hook)))
    }
}

pub fn format_call(name: &str, hook: Hook, first: Option<Ctx>, second: Option<Ctx>) -> String {
    format!(
        "{}.{}({}, {})",
        name,
        hook,
        first.unwrap_or("-"),
        second.unwrap_or("-")
    )
}

pub async fn settle(machine: &RouteMachine<Ctx>) -> MachineStatus {
    tokio::time::timeout(Duration::from_secs(5), machine.settled())
        .await
        .expect("route machine never settled")
}

pub async fn wait_for_state(machine: &RouteMachine<Ctx>, state: MachineState) {
    let mut updates = machine.subscribe();
    tokio::time::timeout(Duration::from_secs(5), updates.wait_for(|status| status.state == state))
        .await
        .expect("timed out waiting for state")
        .expect("status channel closed");
}

/// Wait until `entry` shows up in the recorder.
pub async fn wait_for_call(recorder: &Recorder, entry: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !recorder.contains(entry) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} was never called; saw {:?}", entry, recorder.calls()));
}
