//! Connection state and the shared current-session slot

use std::fmt;
use std::sync::{PoisonError, RwLock};

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Lifecycle position of the current transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Scanning,
    Connecting,
    SubscribingNotify,
    ResolvingCharacteristic,
    Ready,
    Disconnecting,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Scanning => "scanning",
            ConnectionState::Connecting => "connecting",
            ConnectionState::SubscribingNotify => "subscribing",
            ConnectionState::ResolvingCharacteristic => "resolving",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Snapshot of the slot: which session is current and where it is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    /// Session generation; 0 before the first session starts
    pub generation: u64,
    pub state: ConnectionState,
}

// ----------------------------------------------------------------------------
// Session Slot
// ----------------------------------------------------------------------------

/// The single "current session" record shared by the supervisor and the facade
///
/// Generation and state change together under one lock, so a reader never sees a
/// `Ready` state paired with a generation that is being torn down. Only the
/// supervisor starts generations; sessions may only move their own generation.
#[derive(Debug)]
pub struct SessionSlot {
    status: RwLock<SessionStatus>,
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSlot {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(SessionStatus {
                generation: 0,
                state: ConnectionState::Disconnected,
            }),
        }
    }

    /// Current generation and state
    pub fn snapshot(&self) -> SessionStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot().state
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Generation of the current session if it is ready for writes
    pub fn ready_generation(&self) -> Option<u64> {
        let status = self.snapshot();
        (status.state == ConnectionState::Ready).then_some(status.generation)
    }

    /// Whether `generation` is current and ready
    pub fn is_ready(&self, generation: u64) -> bool {
        self.ready_generation() == Some(generation)
    }

    /// Start a new generation in the `Scanning` state and return it
    ///
    /// Called by the supervisor before each session; hosts driving a
    /// [`TransportSession`](crate::TransportSession) by hand call it themselves.
    pub fn begin_session(&self) -> u64 {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        status.generation += 1;
        status.state = ConnectionState::Scanning;
        status.generation
    }

    /// Move `generation` to `state`; ignored if another generation is current.
    ///
    /// Returns whether the transition happened.
    pub(crate) fn transition(&self, generation: u64, state: ConnectionState) -> bool {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        if status.generation != generation {
            return false;
        }
        status.state = state;
        true
    }
}
