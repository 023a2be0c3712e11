//! The submit facade
//!
//! [`RelayHandle`] is what the rest of the host holds. `submit` can be called from any
//! thread without blocking on the radio; it drops the event when no session is ready.
//! Accepted events are tagged with the generation that was ready at submit time, so a
//! session never writes an event that was aimed at its predecessor.

use std::future::Future;
use std::sync::Arc;
use std::thread;

use hidrelay_core::InputEvent;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info};

use crate::backend::GattCentral;
use crate::config::RelayConfig;
use crate::error::{BleRelayError, Result};
use crate::events::{EventPublisher, RelayEvent};
use crate::platform::BtleplugCentral;
use crate::state::{ConnectionState, SessionSlot};
use crate::supervisor::Supervisor;

const WORKER_THREAD_NAME: &str = "hidrelay-transport";

/// Work handed from the facade to the serving session
#[derive(Debug, Clone, PartialEq)]
pub enum RelayCommand {
    /// Encode and write an input event
    Send { generation: u64, event: InputEvent },
    /// Write pre-formatted relay text as-is
    SendText { generation: u64, text: String },
}

// ----------------------------------------------------------------------------
// Relay Handle
// ----------------------------------------------------------------------------

/// Cloneable, thread-safe entry point for submitting input
#[derive(Debug, Clone)]
pub struct RelayHandle {
    commands: mpsc::UnboundedSender<RelayCommand>,
    slot: Arc<SessionSlot>,
    events: EventPublisher,
    shutdown: Arc<watch::Sender<bool>>,
}

impl RelayHandle {
    /// Queue `event` for the current session.
    ///
    /// Returns `false`, and drops the event, when no session is ready.
    pub fn submit(&self, event: InputEvent) -> bool {
        let Some(generation) = self.slot.ready_generation() else {
            debug!("Relay not ready, dropping {} event", event.kind());
            return false;
        };
        self.enqueue(RelayCommand::Send { generation, event })
    }

    /// Queue raw relay text, written without encoding
    pub fn submit_text(&self, text: impl Into<String>) -> bool {
        let Some(generation) = self.slot.ready_generation() else {
            debug!("Relay not ready, dropping raw message");
            return false;
        };
        self.enqueue(RelayCommand::SendText {
            generation,
            text: text.into(),
        })
    }

    fn enqueue(&self, command: RelayCommand) -> bool {
        if self.commands.send(command).is_err() {
            debug!("Relay transport has stopped, dropping message");
            return false;
        }
        true
    }

    /// Observer events; slow subscribers lag rather than block the transport
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.slot.state()
    }

    pub fn generation(&self) -> u64 {
        self.slot.generation()
    }

    pub fn is_ready(&self) -> bool {
        self.slot.ready_generation().is_some()
    }

    /// Ask the supervisor to tear down the current session and stop
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait until a session is ready or shutdown is requested; returns whether it is ready
    pub async fn wait_ready(&self) -> bool {
        let mut events = self.subscribe();
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if self.is_ready() {
                return true;
            }
            let stopping = *shutdown.borrow_and_update();
            if stopping {
                return false;
            }
            tokio::select! {
                event = events.recv() => {
                    if let Err(broadcast::error::RecvError::Closed) = event {
                        return self.is_ready();
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return self.is_ready();
                    }
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Relay
// ----------------------------------------------------------------------------

/// A relay transport running on its own thread
#[derive(Debug)]
pub struct Relay {
    handle: RelayHandle,
    worker: Option<thread::JoinHandle<()>>,
}

impl Relay {
    /// Build the facade and its supervisor without starting anything.
    ///
    /// For hosts that already run tokio: spawn [`Supervisor::run`] on their runtime.
    pub fn supervise<C: GattCentral>(
        central: C,
        config: RelayConfig,
    ) -> Result<(RelayHandle, Supervisor<C>)> {
        config.validate()?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let slot = Arc::new(SessionSlot::new());
        let events = EventPublisher::new(config.event_buffer);

        let handle = RelayHandle {
            commands: commands_tx,
            slot: Arc::clone(&slot),
            events: events.clone(),
            shutdown: Arc::new(shutdown_tx),
        };
        let supervisor = Supervisor::new(
            Arc::new(central),
            Arc::new(config),
            slot,
            events,
            commands_rx,
            shutdown_rx,
        );
        Ok((handle, supervisor))
    }

    /// Start the transport on a dedicated thread with its own runtime.
    ///
    /// `connect` builds the central inside that runtime, so backends that bind to the
    /// runtime they were created on keep working. Blocks until the central is built and
    /// returns its error if that fails.
    pub fn spawn<C, F, Fut>(config: RelayConfig, connect: F) -> Result<Relay>
    where
        C: GattCentral,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<C>>,
    {
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let started = match connect().await {
                        Ok(central) => Relay::supervise(central, config),
                        Err(e) => Err(e),
                    };
                    match started {
                        Ok((handle, supervisor)) => {
                            let _ = ready_tx.send(Ok(handle));
                            supervisor.run().await;
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                        }
                    }
                });
            })?;

        let handle = match ready_rx.recv() {
            Ok(started) => started?,
            Err(_) => {
                error!("Relay transport thread exited during startup");
                let _ = worker.join();
                return Err(BleRelayError::ManagerFailed(
                    "transport thread exited during startup".to_string(),
                ));
            }
        };

        info!("Relay transport running on thread {}", WORKER_THREAD_NAME);
        Ok(Relay {
            handle,
            worker: Some(worker),
        })
    }

    /// [`Relay::spawn`] on the host's first Bluetooth adapter
    pub fn spawn_btleplug(config: RelayConfig) -> Result<Relay> {
        Relay::spawn(config, BtleplugCentral::new)
    }

    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    pub fn submit(&self, event: InputEvent) -> bool {
        self.handle.submit(event)
    }

    /// Stop the transport and wait for the last session's teardown
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.handle.shutdown();
        if worker.join().is_err() {
            error!("Relay transport thread panicked");
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.stop();
    }
}
