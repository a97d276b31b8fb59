use anyhow::Result;
use route_machine::{
    Callback, CallbackBag, Hook, MachineState, RouteHandler, RouteMachine, SimulationConfig,
    TracingObserver,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the demo dispatcher hands to each route hit.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationContext {
    pub path: String,
    pub seq: u64,
}

impl NavigationContext {
    fn describe(context: &Option<NavigationContext>) -> String {
        match context {
            Some(context) => format!("{}#{}", context.path, context.seq),
            None => "-".to_string(),
        }
    }
}

type Transcript = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub state: MachineState,
    pub entered: u64,
    pub pending: usize,
    pub current: Option<NavigationContext>,
    pub error: Option<String>,
    pub transcript: Vec<String>,
}

pub struct SimulateCommand {
    pub paths: Vec<String>,
    pub fail_enter: Vec<String>,
    pub fail_leave: Vec<String>,
    pub settings: SimulationConfig,
    pub trace: bool,
    pub json: bool,
}

impl SimulateCommand {
    pub fn new(paths: Vec<String>, settings: SimulationConfig) -> Self {
        Self {
            paths,
            fail_enter: Vec::new(),
            fail_leave: Vec::new(),
            settings,
            trace: false,
            json: false,
        }
    }

    pub fn with_failures(mut self, fail_enter: Vec<String>, fail_leave: Vec<String>) -> Self {
        self.fail_enter = fail_enter;
        self.fail_leave = fail_leave;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub async fn execute(&self) -> Result<()> {
        let report = self.run().await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }

        if let Some(error) = report.error {
            anyhow::bail!("navigation stopped: {}", error);
        }
        Ok(())
    }

    /// Register one route per distinct path, replay the hits and wait for
    /// the machine to settle.
    pub async fn run(&self) -> SimulationReport {
        let machine: RouteMachine<NavigationContext> =
            RouteMachine::with_observer(TracingObserver::new(self.trace));
        let transcript: Transcript = Arc::new(Mutex::new(Vec::new()));

        let layout = machine.wrap_make_route(
            CallbackBag::new()
                .with(Hook::Enter, step(&transcript, "layout.enter", Duration::ZERO, false))
                .with(Hook::Leave, step(&transcript, "layout.leave", Duration::ZERO, false)),
        );

        let enter_delay = Duration::from_millis(self.settings.enter_delay_ms);
        let leave_delay = Duration::from_millis(self.settings.leave_delay_ms);
        let mut table: BTreeMap<String, RouteHandler<NavigationContext>> = BTreeMap::new();
        for path in &self.paths {
            if table.contains_key(path) {
                continue;
            }
            let fail_enter = self.fail_enter.contains(path);
            let fail_leave = self.fail_leave.contains(path);
            let label = |hook: Hook| format!("{}.{}", path, hook);
            let bag = CallbackBag::new()
                .with(
                    Hook::BeforeEnter,
                    step(&transcript, &label(Hook::BeforeEnter), Duration::ZERO, false),
                )
                .with(
                    Hook::Enter,
                    step(&transcript, &label(Hook::Enter), enter_delay, fail_enter),
                )
                .with(
                    Hook::Leave,
                    step(&transcript, &label(Hook::Leave), leave_delay, fail_leave),
                )
                .with(
                    Hook::AfterLeave,
                    step(&transcript, &label(Hook::AfterLeave), Duration::ZERO, false),
                );
            table.insert(path.clone(), layout.make_route(bag));
        }

        let interval = Duration::from_millis(self.settings.hit_interval_ms);
        for (seq, path) in self.paths.iter().enumerate() {
            if let Some(handler) = table.get(path) {
                tracing::debug!(path = %path, seq = seq, "Dispatching route hit");
                handler.hit(NavigationContext {
                    path: path.clone(),
                    seq: seq as u64,
                });
            }
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }

        let status = machine.settled().await;
        let transcript = transcript
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default();

        SimulationReport {
            state: status.state,
            entered: status.entered,
            pending: status.pending,
            current: machine.current_context(),
            error: machine.last_error().map(|error| error.to_string()),
            transcript,
        }
    }
}

/// A demo callback: note the call, take `delay`, optionally fail.
fn step(
    transcript: &Transcript,
    label: &str,
    delay: Duration,
    fail: bool,
) -> Callback<NavigationContext> {
    let transcript = transcript.clone();
    let label = label.to_string();
    Callback::future(move |first, second| {
        let line = format!(
            "{}({}, {})",
            label,
            NavigationContext::describe(&first),
            NavigationContext::describe(&second)
        );
        if let Ok(mut entries) = transcript.lock() {
            entries.push(line);
        }
        let label = label.clone();
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if fail {
                anyhow::bail!("{} failed", label);
            }
            Ok(())
        }
    })
}

fn print_report(report: &SimulationReport) {
    println!("🧭 ROUTE MACHINE SIMULATION");
    println!("===========================");
    for line in &report.transcript {
        println!("   {}", line);
    }
    println!();
    println!("📊 Final state: {}", report.state);
    println!("   ✅ Routes entered: {}", report.entered);
    println!("   📋 Pending hits: {}", report.pending);
    if let Some(current) = &report.current {
        println!("   📍 Current route: {} (hit #{})", current.path, current.seq);
    }
    if let Some(error) = &report.error {
        println!("   ❌ Error: {}", error);
    }
}
