use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "route-machine")]
#[command(about = "Serialize route lifecycle transitions for a navigation dispatcher")]
#[command(
    long_about = "route-machine orders beforeEnter/enter/leave/afterLeave callbacks so that only \
                  one route transition is ever in flight. Use 'route-machine simulate' to replay \
                  a sequence of route hits against demo routes."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log every route hit and state change
    #[arg(long, global = true, help = "Enable transition tracing")]
    pub trace: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dispatch route hits against demo routes and report where the machine ends up
    Simulate {
        /// Paths to hit, in order (e.g. / /about /users)
        #[arg(required = true)]
        paths: Vec<String>,
        /// Make the enter callback of this path fail
        #[arg(long = "fail-enter", value_name = "PATH")]
        fail_enter: Vec<String>,
        /// Make the leave callback of this path fail
        #[arg(long = "fail-leave", value_name = "PATH")]
        fail_leave: Vec<String>,
        /// Override how long each enter callback takes
        #[arg(long, value_name = "MS")]
        enter_delay_ms: Option<u64>,
        /// Override how long each leave callback takes
        #[arg(long, value_name = "MS")]
        leave_delay_ms: Option<u64>,
        /// Override the pause between hits
        #[arg(long, value_name = "MS")]
        hit_interval_ms: Option<u64>,
        /// Print the report as JSON
        #[arg(long, help = "Emit the final report as JSON")]
        json: bool,
    },
    /// Show the effective configuration
    Config {
        /// Save the effective configuration to this file instead of printing it
        #[arg(long, value_name = "FILE")]
        write: Option<PathBuf>,
    },
}
