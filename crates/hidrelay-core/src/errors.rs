//! Error types for the relay protocol

use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised while building or parsing relay protocol values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Invalid input event: {0}")]
    InvalidEvent(String),

    #[error("Invalid key code: {0}")]
    InvalidKeyCode(String),

    #[error("Coordinate {value} outside normalized range 0..={max}")]
    CoordinateOutOfRange { value: i64, max: u16 },

    #[error("Unknown pointer button: {0}")]
    UnknownButton(String),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(String),

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

impl From<uuid::Error> for RelayError {
    fn from(err: uuid::Error) -> Self {
        RelayError::InvalidUuid(err.to_string())
    }
}

/// Result type for relay protocol operations
pub type Result<T> = core::result::Result<T, RelayError>;
