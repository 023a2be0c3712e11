//! Error handling for the HID relay CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Relay transport error: {0}")]
    Transport(#[from] hidrelay_ble::BleRelayError),

    #[error("Relay protocol error: {0}")]
    Protocol(#[from] hidrelay_core::RelayError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Relay did not become ready within {0} seconds")]
    NotReady(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlWriting(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Config(format!("{:#}", err))
    }
}
