use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for the route machine and its demo binary
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RouteMachineConfig {
    /// Logging and transition tracing
    pub observability: ObservabilityConfig,
    /// Defaults for `route-machine simulate`
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ObservabilityConfig {
    /// Log every hit and state change (the diagnostic flag)
    pub trace_transitions: bool,
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SimulationConfig {
    /// How long each simulated `enter` callback takes
    pub enter_delay_ms: u64,
    /// How long each simulated `leave` callback takes
    pub leave_delay_ms: u64,
    /// Pause between dispatched route hits
    pub hit_interval_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            trace_transitions: false,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enter_delay_ms: 20,
            leave_delay_ms: 10,
            hit_interval_ms: 5,
        }
    }
}

impl Default for RouteMachineConfig {
    fn default() -> Self {
        Self {
            observability: ObservabilityConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl RouteMachineConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (route-machine.toml, .route-machine-rc)
    /// 3. Environment variables (prefixed with ROUTE_MACHINE__)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`RouteMachineConfig::load`], looking for files in `dir`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        let toml_file = dir.join("route-machine.toml");
        if toml_file.exists() {
            builder = builder.add_source(File::from(toml_file));
        }

        let rc_file = dir.join(".route-machine-rc");
        if rc_file.exists() {
            builder = builder.add_source(File::from(rc_file).format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("ROUTE_MACHINE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<RouteMachineConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = RouteMachineConfig::load_env_file();
        RouteMachineConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static RouteMachineConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::debug!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_files() {
        let dir = TempDir::new().unwrap();
        let config = RouteMachineConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.simulation, SimulationConfig::default());
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("route-machine.toml"),
            "[observability]\ntrace_transitions = true\n\n[simulation]\nenter_delay_ms = 1\n",
        )
        .unwrap();

        let config = RouteMachineConfig::load_from(dir.path()).unwrap();
        assert!(config.observability.trace_transitions);
        assert_eq!(config.simulation.enter_delay_ms, 1);
        assert_eq!(config.simulation.leave_delay_ms, 10);
    }

    #[test]
    fn test_rc_file_overrides_toml_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("route-machine.toml"),
            "[simulation]\nenter_delay_ms = 1\nleave_delay_ms = 2\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(".route-machine-rc"),
            "[simulation]\nleave_delay_ms = 3\n",
        )
        .unwrap();

        let config = RouteMachineConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.simulation.enter_delay_ms, 1);
        assert_eq!(config.simulation.leave_delay_ms, 3);
        assert_eq!(config.simulation.hit_interval_ms, 5);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut config = RouteMachineConfig::default();
        config.simulation.hit_interval_ms = 42;
        config.observability.json_logs = true;
        config.save_to_file(dir.path().join("route-machine.toml")).unwrap();

        let loaded = RouteMachineConfig::load_from(dir.path()).unwrap();
        assert_eq!(loaded.simulation.hit_interval_ms, 42);
        assert!(loaded.observability.json_logs);
    }
}
