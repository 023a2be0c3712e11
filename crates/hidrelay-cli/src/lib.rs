//! HID relay CLI library
//!
//! Argument parsing, configuration loading and command handlers for the `hidrelay`
//! binary, which feeds input events typed on stdin to a BLE relay peripheral.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod input;

pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};
