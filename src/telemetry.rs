use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::machine::Phase;

/// Initialize structured logging.
///
/// `RUST_LOG` wins over the configured level when set. Logs go to stderr
/// so reports on stdout stay machine readable.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    tracing::debug!(
        json = config.json_logs,
        trace_transitions = config.trace_transitions,
        "Route machine telemetry initialized"
    );
    Ok(())
}

/// Generate a correlation ID for one leave+enter transition
pub fn generate_transition_id() -> Uuid {
    Uuid::new_v4()
}

/// Span wrapping the callbacks of one transition phase
pub fn transition_span(phase: Phase, transition: Uuid) -> tracing::Span {
    tracing::info_span!(
        "route_transition",
        phase = %phase,
        transition.id = %transition,
        otel.kind = "internal"
    )
}
