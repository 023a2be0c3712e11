//! Error types for the BLE relay transport

use hidrelay_core::RelayError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the BLE relay transport
#[derive(Error, Debug)]
pub enum BleRelayError {
    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("Failed to initialize BLE manager: {0}")]
    ManagerFailed(String),

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Failed to connect to peripheral: {0}")]
    ConnectionFailed(String),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Failed to discover services: {0}")]
    ServiceDiscoveryFailed(String),

    #[error("Characteristic not found: {characteristic}")]
    CharacteristicNotFound { characteristic: String },

    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    #[error("Failed to get notifications stream: {0}")]
    NotificationStreamFailed(String),

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("Failed to write to characteristic: {0}")]
    WriteFailed(String),

    #[error("Peripheral disconnected")]
    Disconnected,

    #[error("Session is not ready for writes")]
    NotReady,

    #[error("Failed to start transport worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Configuration(#[from] RelayError),
}

/// Result type for BLE relay operations
pub type Result<T> = std::result::Result<T, BleRelayError>;
