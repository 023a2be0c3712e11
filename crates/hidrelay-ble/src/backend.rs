//! Backend seam between the transport session and a BLE stack
//!
//! The session only needs a handful of central-role operations, so it is written
//! against these two traits. [`crate::platform`] implements them with btleplug; tests
//! implement them in memory.

use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use hidrelay_core::PeripheralIdentity;
use uuid::Uuid;

use crate::error::Result;

// ----------------------------------------------------------------------------
// Backend Types
// ----------------------------------------------------------------------------

/// Inbound notification payloads from the notify characteristic
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

/// A device that matched the peripheral identity during a scan
#[derive(Debug, Clone)]
pub struct FoundDevice<P> {
    /// Advertised local name
    pub name: Option<String>,
    /// Platform address, for diagnostics
    pub address: String,
    /// Advertised service UUIDs
    pub services: Vec<Uuid>,
    /// Backend handle used to connect
    pub peripheral: P,
}

/// The resolved write characteristic of a connected link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTarget {
    pub characteristic: Uuid,
    /// Negotiated max write-without-response size, if the platform reports one
    pub max_write_len: Option<NonZeroUsize>,
}

// ----------------------------------------------------------------------------
// Backend Traits
// ----------------------------------------------------------------------------

/// Central-role operations needed to find and connect to the relay
#[async_trait]
pub trait GattCentral: Send + Sync + 'static {
    /// Backend-specific handle of a discovered device
    type Peripheral: Send + Sync + 'static;
    /// Connected link type
    type Link: GattLink;

    /// Scan for a device matching `identity`.
    ///
    /// Returns `Ok(None)` when nothing matched within `timeout`.
    async fn scan(
        &self,
        identity: &PeripheralIdentity,
        timeout: Duration,
    ) -> Result<Option<FoundDevice<Self::Peripheral>>>;

    /// Open a link to `device`.
    ///
    /// The returned link's [`GattLink::disconnected`] must observe every disconnect
    /// that happens after the physical connection came up, so implementations arm
    /// their disconnect watcher before (or atomically with) connecting.
    async fn connect(&self, device: &FoundDevice<Self::Peripheral>) -> Result<Self::Link>;
}

/// One connected link, exclusively owned by a transport session
#[async_trait]
pub trait GattLink: Send + Sync + 'static {
    /// Peer address, for diagnostics
    fn address(&self) -> String;

    /// Enable notifications on `characteristic` and return the inbound stream
    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream>;

    /// Locate `characteristic` within `service`
    async fn resolve_write_target(&self, service: Uuid, characteristic: Uuid)
        -> Result<WriteTarget>;

    /// Issue one write-without-response and wait for the stack to accept it
    async fn write_without_response(&self, target: &WriteTarget, chunk: &[u8]) -> Result<()>;

    /// Resolves once the link has dropped, for any reason.
    ///
    /// Level-triggered: calling it after the drop resolves immediately.
    async fn disconnected(&self);

    /// Tear the link down
    async fn disconnect(&self) -> Result<()>;
}
