//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Substring the relay's advertised name must contain
    #[arg(short, long)]
    pub name: Option<String>,

    /// Service UUID the relay must advertise
    #[arg(long)]
    pub service: Option<String>,

    /// Scan timeout in seconds
    #[arg(long)]
    pub scan_timeout: Option<u64>,

    /// Use the long key tags (KP/KR) understood by older relay firmware
    #[arg(long)]
    pub long_tags: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List advertising BLE devices
    Scan {
        /// How long to scan, in seconds
        #[arg(short, long, default_value_t = 5)]
        timeout: u64,
    },
    /// Connect and forward events read from stdin, one per line, until EOF or Ctrl+C
    Run,
    /// Connect, send the given events and exit
    Send {
        /// Events such as "down 0x41" or "move 100 200"
        #[arg(required = true)]
        events: Vec<String>,
    },
    /// Map a viewport pixel to the relay's normalized coordinates
    Normalize {
        /// Source video size, e.g. 1920x1080
        #[arg(long)]
        video: String,
        /// Viewport size the video is fitted into, e.g. 800x600
        #[arg(long)]
        viewport: String,
        /// Viewport x in pixels
        x: f64,
        /// Viewport y in pixels
        y: f64,
    },
    /// Print the effective configuration as TOML
    Config,
}
