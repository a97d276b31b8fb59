use anyhow::Result;
use route_machine::RouteMachineConfig;
use std::path::PathBuf;

pub struct ConfigCommand {
    pub settings: RouteMachineConfig,
    pub output: Option<PathBuf>,
}

impl ConfigCommand {
    pub fn new(settings: RouteMachineConfig) -> Self {
        Self {
            settings,
            output: None,
        }
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }

    pub fn execute(&self) -> Result<()> {
        match &self.output {
            Some(path) => {
                self.settings.save_to_file(path)?;
                println!("✅ Configuration written to {}", path.display());
            }
            None => print!("{}", toml::to_string_pretty(&self.settings)?),
        }
        Ok(())
    }
}
