//! Bluetooth Low Energy transport for the HID relay
//!
//! This crate keeps a long-lived connection to a single relay peripheral and delivers
//! encoded input events to it over GATT write-without-response.
//!
//! ## Architecture
//!
//! - [`config`] - Relay configuration and restart policy
//! - [`error`] - Error types specific to the BLE transport
//! - [`backend`] - The `GattCentral` / `GattLink` seam the session is written against
//! - [`platform`] - btleplug implementation of the backend
//! - [`state`] - Connection state and the shared current-session slot
//! - [`events`] - Observer events for UI feedback
//! - [`session`] - One scan/connect/serve/teardown attempt
//! - [`supervisor`] - Restarts sessions forever until shutdown
//! - [`relay`] - The thread-safe `submit` facade
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hidrelay_ble::{BtleplugCentral, Relay, RelayConfig};
//! use hidrelay_core::InputEvent;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let central = BtleplugCentral::new().await?;
//! let (handle, supervisor) = Relay::supervise(central, RelayConfig::default())?;
//! tokio::spawn(supervisor.run());
//!
//! // From any thread; dropped with a diagnostic while no peripheral is ready
//! handle.submit(InputEvent::key_down(0x41));
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod platform;
pub mod relay;
pub mod session;
pub mod state;
pub mod supervisor;

// Public API exports
pub use backend::{FoundDevice, GattCentral, GattLink, NotificationStream, WriteTarget};
pub use config::{RelayConfig, RestartPolicy};
pub use error::{BleRelayError, Result};
pub use events::{EventPublisher, RelayEvent};
pub use platform::{BtleplugCentral, BtleplugLink, DeviceSummary};
pub use relay::{Relay, RelayCommand, RelayHandle};
pub use session::{SessionOutcome, TransportSession};
pub use state::{ConnectionState, SessionSlot, SessionStatus};
pub use supervisor::Supervisor;
