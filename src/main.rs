use anyhow::Result;
use clap::Parser;

mod cli;

use cli::commands::{ConfigCommand, SimulateCommand};
use cli::{Cli, Commands};
use route_machine::{init_config, init_telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_config()?;
    let mut settings = route_machine::config()?.clone();
    if cli.trace {
        settings.observability.trace_transitions = true;
    }
    init_telemetry(&settings.observability)?;

    match cli.command {
        Commands::Simulate {
            paths,
            fail_enter,
            fail_leave,
            enter_delay_ms,
            leave_delay_ms,
            hit_interval_ms,
            json,
        } => {
            let mut simulation = settings.simulation.clone();
            if let Some(ms) = enter_delay_ms {
                simulation.enter_delay_ms = ms;
            }
            if let Some(ms) = leave_delay_ms {
                simulation.leave_delay_ms = ms;
            }
            if let Some(ms) = hit_interval_ms {
                simulation.hit_interval_ms = ms;
            }

            let command = SimulateCommand::new(paths, simulation)
                .with_failures(fail_enter, fail_leave)
                .with_trace(settings.observability.trace_transitions)
                .with_json(json);
            tokio::runtime::Runtime::new()?.block_on(async { command.execute().await })
        }
        Commands::Config { write } => ConfigCommand::new(settings).with_output(write).execute(),
    }
}
