//! HID relay CLI configuration
//!
//! Configuration comes from an optional TOML file, then command-line overrides are
//! applied on top. Every field has a default, so an empty file is valid.

use std::path::Path;
use std::time::Duration;

use hidrelay_ble::RelayConfig;
use hidrelay_core::KeyTagStyle;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cli::Cli;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Transport configuration handed to the relay
    pub relay: RelayConfig,
    /// CLI-specific settings
    pub cli: CliConfig,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// How long `send` waits for the relay before giving up, in seconds
    pub ready_timeout_secs: u64,
    /// Print transport events (connected, disconnected, notifications) to stdout
    pub print_events: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: 30,
            print_events: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&mut self, cli: &Cli) -> Result<()> {
        if let Some(name) = &cli.name {
            self.relay.identity.name_contains = Some(name.clone());
        }
        if let Some(service) = &cli.service {
            let identity = std::mem::take(&mut self.relay.identity);
            self.relay.identity = identity.with_service_str(service)?;
        }
        if let Some(secs) = cli.scan_timeout {
            self.relay.scan_timeout = Duration::from_secs(secs);
        }
        if cli.long_tags {
            self.relay.key_tags = KeyTagStyle::Long;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.relay.validate()?;
        if self.cli.ready_timeout_secs == 0 {
            return Err(CliError::Config(
                "ready_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.cli.ready_timeout_secs)
    }

    /// Render as TOML, in the same shape `load_from_file` reads
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load from `path` if given, otherwise use defaults, then apply overrides
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                info!("Loading configuration from: {}", path);
                AppConfig::load_from_file(path)?
            }
            None => AppConfig::default(),
        };
        config.apply_overrides(cli)?;
        config.validate()?;
        Ok(config)
    }
}
