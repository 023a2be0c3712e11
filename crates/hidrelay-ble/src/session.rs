//! One connection attempt, from scan to teardown
//!
//! A [`TransportSession`] owns at most one link. It scans for the relay, connects,
//! enables notifications, resolves the write characteristic and then serves submitted
//! messages until the link drops or it is asked to stop.
//! Every exit path runs [`TransportSession::teardown`].

use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::StreamExt;
use hidrelay_core::{chunk, Encoder, RelayMessage};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::backend::{GattCentral, GattLink, NotificationStream, WriteTarget};
use crate::config::RelayConfig;
use crate::error::{BleRelayError, Result};
use crate::events::{EventPublisher, RelayEvent};
use crate::relay::RelayCommand;
use crate::state::{ConnectionState, SessionSlot};

// ----------------------------------------------------------------------------
// Session Outcome
// ----------------------------------------------------------------------------

/// Why a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// The scan timed out without a matching device
    DeviceNotFound,
    /// The link dropped, during setup or while serving
    Disconnected,
    /// Setup failed on an error other than a disconnect
    Failed(BleRelayError),
    /// The host asked the transport to stop
    Shutdown,
    /// Every submit handle is gone
    Closed,
}

impl SessionOutcome {
    /// Whether the supervisor should start another session after this one
    pub fn should_restart(&self) -> bool {
        !matches!(self, SessionOutcome::Shutdown | SessionOutcome::Closed)
    }
}

/// Write characteristic plus the chunk size used for it
#[derive(Debug, Clone, Copy)]
struct ResolvedTarget {
    target: WriteTarget,
    max_write_len: NonZeroUsize,
}

// ----------------------------------------------------------------------------
// Transport Session
// ----------------------------------------------------------------------------

/// A single scan/connect/serve/teardown attempt for one generation
pub struct TransportSession<C: GattCentral> {
    generation: u64,
    central: Arc<C>,
    config: Arc<RelayConfig>,
    slot: Arc<SessionSlot>,
    events: EventPublisher,
    encoder: Encoder,
    link: Option<Arc<C::Link>>,
    target: Option<ResolvedTarget>,
    reached_ready: bool,
    torn_down: bool,
}

impl<C: GattCentral> TransportSession<C> {
    /// Create a session for `generation`, which must come from
    /// [`SessionSlot::begin_session`] on the same slot
    pub fn new(
        generation: u64,
        central: Arc<C>,
        config: Arc<RelayConfig>,
        slot: Arc<SessionSlot>,
        events: EventPublisher,
    ) -> Self {
        let encoder = Encoder::new(config.key_tags);
        Self {
            generation,
            central,
            config,
            slot,
            events,
            encoder,
            link: None,
            target: None,
            reached_ready: false,
            torn_down: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this session ever became ready for writes
    pub fn reached_ready(&self) -> bool {
        self.reached_ready
    }

    /// Run the session to completion, tearing down on every exit path
    pub async fn run(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<RelayCommand>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionOutcome {
        let generation = self.generation;
        let stopping = *shutdown.borrow();
        let outcome = if stopping {
            SessionOutcome::Shutdown
        } else {
            tokio::select! {
                outcome = self.drive(commands) => outcome,
                _ = shutdown_requested(shutdown) => {
                    info!(generation, "Shutdown requested, stopping session");
                    SessionOutcome::Shutdown
                }
            }
        };

        self.teardown().await;
        outcome
    }

    async fn drive(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<RelayCommand>,
    ) -> SessionOutcome {
        match self.establish().await {
            Ok(Some(notifications)) => self.serve(commands, notifications).await,
            Ok(None) => SessionOutcome::DeviceNotFound,
            Err(BleRelayError::Disconnected) => SessionOutcome::Disconnected,
            Err(e) => SessionOutcome::Failed(e),
        }
    }

    /// Scan, connect, subscribe and resolve; on success the session is `Ready`.
    ///
    /// Returns `Ok(None)` when the scan timed out. A link that drops before setup
    /// completes yields [`BleRelayError::Disconnected`].
    pub async fn establish(&mut self) -> Result<Option<NotificationStream>> {
        let config = Arc::clone(&self.config);
        let generation = self.generation;

        // Scan
        self.enter(ConnectionState::Scanning);
        self.events.publish(RelayEvent::Scanning { generation });
        info!(generation, "Scanning for relay peripheral");

        let device = match self
            .central
            .scan(&config.identity, config.scan_timeout)
            .await?
        {
            Some(device) => device,
            None => {
                info!(
                    generation,
                    "No relay peripheral found within {:?}", config.scan_timeout
                );
                self.events
                    .publish(RelayEvent::DeviceNotFound { generation });
                return Ok(None);
            }
        };

        info!(
            "Found relay peripheral {} ({})",
            device.name.as_deref().unwrap_or("<unnamed>"),
            device.address
        );
        self.events.publish(RelayEvent::DeviceFound {
            name: device.name.clone(),
            address: device.address.clone(),
        });

        // Connect
        self.enter(ConnectionState::Connecting);
        let link = match tokio::time::timeout(
            config.connection_timeout,
            self.central.connect(&device),
        )
        .await
        {
            Ok(Ok(link)) => Arc::new(link),
            Ok(Err(e)) => {
                error!("Failed to connect to {}: {}", device.address, e);
                return Err(e);
            }
            Err(_) => {
                error!("Connection to {} timed out", device.address);
                return Err(BleRelayError::ConnectionTimeout);
            }
        };

        // Owned from here on so teardown releases it on any exit
        self.link = Some(Arc::clone(&link));
        info!(generation, "Connected to relay peripheral {}", link.address());
        self.events.publish(RelayEvent::Connected {
            generation,
            address: link.address(),
        });

        // Subscribe and resolve, unwinding if the link drops underneath
        let (notifications, target) = tokio::select! {
            biased;
            _ = link.disconnected() => {
                warn!(generation, "Relay peripheral disconnected during setup");
                return Err(BleRelayError::Disconnected);
            }
            prepared = self.prepare(&*link) => prepared?,
        };

        let max_write_len = target
            .max_write_len
            .unwrap_or(config.fallback_write_size);
        self.target = Some(ResolvedTarget {
            target,
            max_write_len,
        });
        self.reached_ready = true;
        self.enter(ConnectionState::Ready);
        info!(
            generation,
            "Relay ready, writing in chunks of {} bytes", max_write_len
        );
        self.events.publish(RelayEvent::Ready {
            generation,
            max_write_len: max_write_len.get(),
        });

        Ok(Some(notifications))
    }

    async fn prepare(&self, link: &C::Link) -> Result<(NotificationStream, WriteTarget)> {
        let service = &self.config.service;

        self.enter(ConnectionState::SubscribingNotify);
        let notifications = link.subscribe(service.notify_characteristic).await?;
        debug!("Notifications enabled on {}", service.notify_characteristic);
        self.events.publish(RelayEvent::NotifyEnabled {
            generation: self.generation,
        });

        self.enter(ConnectionState::ResolvingCharacteristic);
        let target = link
            .resolve_write_target(service.service, service.write_characteristic)
            .await?;
        debug!("Resolved write characteristic {}", target.characteristic);

        Ok((notifications, target))
    }

    /// Serve submitted messages and inbound notifications until the link drops
    async fn serve(
        &self,
        commands: &mut mpsc::UnboundedReceiver<RelayCommand>,
        mut notifications: NotificationStream,
    ) -> SessionOutcome {
        let link = match &self.link {
            Some(link) => Arc::clone(link),
            None => return SessionOutcome::Failed(BleRelayError::NotReady),
        };
        let disconnected = link.disconnected();
        tokio::pin!(disconnected);
        let mut notifications_open = true;

        loop {
            tokio::select! {
                biased;

                _ = &mut disconnected => {
                    info!(generation = self.generation, "Relay peripheral disconnected");
                    return SessionOutcome::Disconnected;
                }

                command = commands.recv() => match command {
                    Some(command) => {
                        if let Some(outcome) = self.handle_command(command).await {
                            return outcome;
                        }
                    }
                    None => {
                        info!("Command channel closed, stopping session");
                        return SessionOutcome::Closed;
                    }
                },

                notification = notifications.next(), if notifications_open => match notification {
                    Some(data) => {
                        debug!("Notification from relay: {} bytes", data.len());
                        self.events.publish(RelayEvent::Notification { data });
                    }
                    None => {
                        debug!("Notification stream ended");
                        notifications_open = false;
                    }
                },
            }
        }
    }

    /// Returns an outcome only when the link dropped under an in-flight write
    async fn handle_command(&self, command: RelayCommand) -> Option<SessionOutcome> {
        let (generation, message) = match command {
            RelayCommand::Send { generation, event } => (generation, self.encoder.encode(&event)),
            RelayCommand::SendText { generation, text } => (generation, RelayMessage::new(text)),
        };

        if generation != self.generation {
            debug!(
                "Dropping {} submitted to session {}, current is {}",
                message, generation, self.generation
            );
            return None;
        }

        match self.send(&message).await {
            Ok(chunks) => {
                self.events
                    .publish(RelayEvent::message_sent(&message, chunks));
                None
            }
            Err(BleRelayError::Disconnected) => {
                info!(
                    generation = self.generation,
                    "Relay peripheral disconnected while sending {}", message
                );
                Some(SessionOutcome::Disconnected)
            }
            Err(e) => {
                warn!("Failed to send {}: {}", message, e);
                self.events.publish(RelayEvent::WriteFailed {
                    message: message.to_string(),
                    error: e.to_string(),
                });
                None
            }
        }
    }

    /// Write `message` in order, one chunk per write-without-response.
    ///
    /// Returns the number of chunks written. The first failing write abandons the
    /// rest of the message.
    pub async fn send(&self, message: &RelayMessage) -> Result<usize> {
        let resolved = match self.target {
            Some(resolved) if self.slot.is_ready(self.generation) => resolved,
            _ => return Err(BleRelayError::NotReady),
        };
        let link = self.link.as_ref().ok_or(BleRelayError::NotReady)?;

        let mut written = 0;
        for piece in chunk(message.as_bytes(), resolved.max_write_len) {
            tokio::select! {
                biased;

                _ = link.disconnected() => return Err(BleRelayError::Disconnected),
                result = link.write_without_response(&resolved.target, piece) => result?,
            }
            written += 1;
        }

        debug!("Sent {} ({} bytes, {} chunks)", message, message.len(), written);
        Ok(written)
    }

    /// Release the link and mark the slot `Disconnected`. Safe to call repeatedly.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        // Leave Ready before anything is released so submit stops here
        self.enter(ConnectionState::Disconnecting);
        self.target = None;

        if let Some(link) = self.link.take() {
            if let Err(e) = link.disconnect().await {
                debug!("Disconnect during teardown: {}", e);
            }
            self.events.publish(RelayEvent::Disconnected {
                generation: self.generation,
            });
        }

        self.enter(ConnectionState::Disconnected);
        debug!(generation = self.generation, "Session torn down");
    }

    fn enter(&self, state: ConnectionState) {
        if !self.slot.transition(self.generation, state) {
            debug!(
                "Session {} is no longer current, not entering {}",
                self.generation, state
            );
        }
    }
}

/// Resolves once shutdown is signalled or the signalling side is gone
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
