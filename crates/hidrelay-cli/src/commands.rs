//! Command handlers for the HID relay CLI

use std::io::BufRead;
use std::time::Duration;

use hidrelay_ble::{BtleplugCentral, Relay, RelayEvent, RelayHandle};
use hidrelay_core::{DisplayRect, Size};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::input::{parse_line, InputLine};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(command: Commands, config: AppConfig) -> Result<()> {
        match command {
            Commands::Scan { timeout } => Self::handle_scan_command(&config, timeout).await,
            Commands::Run => Self::handle_run_command(config).await,
            Commands::Send { events } => Self::handle_send_command(config, events).await,
            Commands::Normalize {
                video,
                viewport,
                x,
                y,
            } => Self::handle_normalize_command(&video, &viewport, x, y),
            Commands::Config => {
                print!("{}", config.to_toml_string()?);
                Ok(())
            }
        }
    }

    /// Handle the scan command
    async fn handle_scan_command(config: &AppConfig, timeout: u64) -> Result<()> {
        let central = BtleplugCentral::new().await?;
        info!("Scanning for {} seconds...", timeout);
        let mut devices = central.list_devices(Duration::from_secs(timeout)).await?;
        devices.sort_by_key(|d| std::cmp::Reverse(d.rssi.unwrap_or(i16::MIN)));

        if devices.is_empty() {
            println!("No devices found");
            return Ok(());
        }

        let identity = &config.relay.identity;
        for device in devices {
            let marker = if identity.matches(device.name.as_deref(), &device.services) {
                "*"
            } else {
                " "
            };
            let rssi = device
                .rssi
                .map(|r| format!("{} dBm", r))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{} {:<20} {:<8} {}",
                marker,
                device.address,
                rssi,
                device.name.as_deref().unwrap_or("<unnamed>")
            );
        }
        println!("\n* matches the configured relay identity");
        Ok(())
    }

    /// Handle the run command: forward stdin lines until EOF or Ctrl+C
    async fn handle_run_command(config: AppConfig) -> Result<()> {
        let (handle, supervisor) = start_relay(&config).await?;
        if config.cli.print_events {
            tokio::spawn(print_events(handle.subscribe()));
        }

        let mut lines = spawn_stdin_reader()?;
        info!("Reading events from stdin. Press Ctrl+C to stop");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C");
                    break;
                }
                line = lines.recv() => {
                    let Some(line) = line else {
                        info!("End of input");
                        break;
                    };
                    match parse_line(&line) {
                        Ok(input) => {
                            if !submit(&handle, input) {
                                println!("(not connected, dropped)");
                            }
                        }
                        Err(e) => warn!("{:#}", e),
                    }
                }
            }
        }

        stop_relay(handle, supervisor).await;
        Ok(())
    }

    /// Handle the send command: deliver each argument as one event, then exit
    async fn handle_send_command(config: AppConfig, events: Vec<String>) -> Result<()> {
        let inputs = events
            .iter()
            .map(|line| parse_line(line))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let (handle, supervisor) = start_relay(&config).await?;
        let mut observer = handle.subscribe();

        let ready_timeout = config.ready_timeout();
        let became_ready = tokio::time::timeout(ready_timeout, handle.wait_ready())
            .await
            .unwrap_or(false);
        if !became_ready {
            stop_relay(handle, supervisor).await;
            return Err(CliError::NotReady(config.cli.ready_timeout_secs));
        }

        let submitted = inputs
            .into_iter()
            .filter(|input| *input != InputLine::Skip)
            .filter(|input| submit(&handle, input.clone()))
            .count();

        // Wait for each submitted message to be written or to fail
        let mut settled = 0;
        let waited = tokio::time::timeout(ready_timeout, async {
            while settled < submitted {
                match observer.recv().await {
                    Ok(RelayEvent::MessageSent { message, chunks }) => {
                        println!("sent {} ({} chunks)", message, chunks);
                        settled += 1;
                    }
                    Ok(RelayEvent::WriteFailed { message, error }) => {
                        println!("failed {}: {}", message, error);
                        settled += 1;
                    }
                    Ok(RelayEvent::Disconnected { .. }) => break,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
        .await;
        if waited.is_err() {
            warn!("Timed out waiting for {} messages", submitted - settled);
        }

        stop_relay(handle, supervisor).await;
        Ok(())
    }

    /// Handle the normalize command
    fn handle_normalize_command(video: &str, viewport: &str, x: f64, y: f64) -> Result<()> {
        let video: Size = video.parse()?;
        let viewport: Size = viewport.parse()?;
        let rect = DisplayRect::fit(video, viewport)?;
        let point = rect.normalize(x, y);

        println!(
            "video area {}x{} at ({}, {})",
            rect.width(),
            rect.height(),
            rect.x(),
            rect.y()
        );
        println!("normalized {}", point);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

async fn start_relay(config: &AppConfig) -> Result<(RelayHandle, JoinHandle<()>)> {
    let central = BtleplugCentral::new().await?;
    let (handle, supervisor) = Relay::supervise(central, config.relay.clone())?;
    Ok((handle, tokio::spawn(supervisor.run())))
}

async fn stop_relay(handle: RelayHandle, supervisor: JoinHandle<()>) {
    handle.shutdown();
    if let Err(e) = supervisor.await {
        error!("Relay supervisor task failed: {}", e);
    }
}

fn submit(handle: &RelayHandle, input: InputLine) -> bool {
    match input {
        InputLine::Event(event) => handle.submit(event),
        InputLine::Raw(text) => handle.submit_text(text),
        InputLine::Skip => true,
    }
}

/// Read stdin lines on a plain thread; the channel closes at EOF
fn spawn_stdin_reader() -> Result<mpsc::UnboundedReceiver<String>> {
    let (sender, receiver) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if sender.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })?;
    Ok(receiver)
}

async fn print_events(mut events: broadcast::Receiver<RelayEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Missed {} relay events", missed);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            RelayEvent::DeviceFound { name, address } => println!(
                "found {} ({})",
                name.as_deref().unwrap_or("<unnamed>"),
                address
            ),
            RelayEvent::Connected { address, .. } => println!("connected to {}", address),
            RelayEvent::Ready { max_write_len, .. } => {
                println!("ready (chunks of {} bytes)", max_write_len)
            }
            RelayEvent::Notification { data } => {
                println!("relay: {}", String::from_utf8_lossy(&data))
            }
            RelayEvent::WriteFailed { message, error } => {
                println!("write failed for {}: {}", message, error)
            }
            RelayEvent::Disconnected { .. } => println!("disconnected"),
            RelayEvent::SessionFailed { error, .. } => println!("connection failed: {}", error),
            _ => {}
        }
    }
}
