//! Connection supervisor
//!
//! Runs transport sessions back to back for the lifetime of the host. No session exit
//! is fatal short of shutdown; the supervisor starts
//! the next generation according to the [`RestartPolicy`](crate::RestartPolicy) until
//! shutdown is requested or every submit handle has been dropped.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::backend::GattCentral;
use crate::config::RelayConfig;
use crate::events::{EventPublisher, RelayEvent};
use crate::relay::RelayCommand;
use crate::session::{shutdown_requested, SessionOutcome, TransportSession};
use crate::state::SessionSlot;

// ----------------------------------------------------------------------------
// Supervisor
// ----------------------------------------------------------------------------

/// Owns the command receiver and drives one session at a time
pub struct Supervisor<C: GattCentral> {
    central: Arc<C>,
    config: Arc<RelayConfig>,
    slot: Arc<SessionSlot>,
    events: EventPublisher,
    commands: mpsc::UnboundedReceiver<RelayCommand>,
    shutdown: watch::Receiver<bool>,
}

impl<C: GattCentral> Supervisor<C> {
    pub(crate) fn new(
        central: Arc<C>,
        config: Arc<RelayConfig>,
        slot: Arc<SessionSlot>,
        events: EventPublisher,
        commands: mpsc::UnboundedReceiver<RelayCommand>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            central,
            config,
            slot,
            events,
            commands,
            shutdown,
        }
    }

    /// Run sessions until shutdown. Teardown of the last session has completed when
    /// this returns.
    pub async fn run(mut self) {
        info!("Relay supervisor starting");
        let mut consecutive_failures: u32 = 0;

        loop {
            let stopping = *self.shutdown.borrow();
            if stopping {
                break;
            }

            let generation = self.slot.begin_session();
            let mut session = TransportSession::new(
                generation,
                Arc::clone(&self.central),
                Arc::clone(&self.config),
                Arc::clone(&self.slot),
                self.events.clone(),
            );

            let outcome = session.run(&mut self.commands, &mut self.shutdown).await;
            match &outcome {
                SessionOutcome::DeviceNotFound => {
                    debug!(generation, "Session ended without finding the relay");
                }
                SessionOutcome::Disconnected => {
                    info!(generation, "Session ended on disconnect");
                }
                SessionOutcome::Failed(e) => {
                    warn!(generation, "Session failed: {}", e);
                    self.events.publish(RelayEvent::SessionFailed {
                        generation,
                        error: e.to_string(),
                    });
                }
                SessionOutcome::Shutdown | SessionOutcome::Closed => {}
            }

            if !outcome.should_restart() {
                break;
            }

            if session.reached_ready() {
                consecutive_failures = 0;
            } else {
                consecutive_failures = consecutive_failures.saturating_add(1);
            }

            let delay = self.config.restart.delay(consecutive_failures);
            if !delay.is_zero() {
                debug!("Restarting in {:?}", delay);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_requested(&mut self.shutdown) => break,
                }
            }
        }

        info!("Relay supervisor stopped");
    }
}
