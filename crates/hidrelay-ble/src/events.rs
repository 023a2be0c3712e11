//! Observer events for UI feedback
//!
//! Collaborators subscribe to follow the connection; the transport publishes whether or
//! not anyone is listening.

use hidrelay_core::RelayMessage;
use tokio::sync::broadcast;

/// Something observable happened on the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A session started scanning
    Scanning { generation: u64 },
    /// The relay was found
    DeviceFound {
        name: Option<String>,
        address: String,
    },
    /// The scan timed out without a match
    DeviceNotFound { generation: u64 },
    /// Link is up
    Connected { generation: u64, address: String },
    /// Notifications enabled on the notify characteristic
    NotifyEnabled { generation: u64 },
    /// Write characteristic resolved; submissions are now delivered
    Ready {
        generation: u64,
        max_write_len: usize,
    },
    /// Inbound notification payload
    Notification { data: Vec<u8> },
    /// A message was written in full
    MessageSent { message: String, chunks: usize },
    /// A write failed; the rest of that message was abandoned
    WriteFailed { message: String, error: String },
    /// The session's link went away
    Disconnected { generation: u64 },
    /// A session ended on an error before or while serving
    SessionFailed { generation: u64, error: String },
}

impl RelayEvent {
    pub(crate) fn message_sent(message: &RelayMessage, chunks: usize) -> Self {
        RelayEvent::MessageSent {
            message: message.to_string(),
            chunks,
        }
    }
}

/// Cloneable publishing side of the observer channel
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<RelayEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to current subscribers; a no-op when there are none
    pub fn publish(&self, event: RelayEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
