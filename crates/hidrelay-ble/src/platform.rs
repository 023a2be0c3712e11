//! btleplug implementation of the backend traits
//!
//! Scanning, connecting and GATT access go through the first adapter btleplug reports.
//! Disconnects are observed on the adapter's central event stream, which is opened
//! before the connect call so a drop that races the connection is not missed.

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::{BoxStream, Stream, StreamExt};
use hidrelay_core::PeripheralIdentity;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{FoundDevice, GattCentral, GattLink, NotificationStream, WriteTarget};
use crate::error::{BleRelayError, Result};

type CentralEvents = BoxStream<'static, CentralEvent>;

// ----------------------------------------------------------------------------
// Central
// ----------------------------------------------------------------------------

/// Central role on the host's first Bluetooth adapter
#[derive(Clone)]
pub struct BtleplugCentral {
    adapter: Adapter,
}

/// One advertising device seen by [`BtleplugCentral::list_devices`]
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSummary {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub services: Vec<Uuid>,
}

impl BtleplugCentral {
    /// Initialize the BLE manager and pick the first adapter
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|e| BleRelayError::ManagerFailed(e.to_string()))?;

        let adapters = manager
            .adapters()
            .await
            .map_err(|e| {
                BleRelayError::ManagerFailed(format!("Failed to get BLE adapters: {}", e))
            })?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(BleRelayError::AdapterNotAvailable)?;

        info!("BLE adapter initialized");
        Ok(Self { adapter })
    }

    /// Wrap an adapter the host already holds
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Scan without a filter for `duration` and report every device seen
    pub async fn list_devices(&self, duration: Duration) -> Result<Vec<DeviceSummary>> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| BleRelayError::ScanFailed(e.to_string()))?;

        tokio::time::sleep(duration).await;

        let peripherals = self.adapter.peripherals().await;
        self.stop_scan().await;
        let peripherals = peripherals.map_err(|e| BleRelayError::ScanFailed(e.to_string()))?;

        let mut devices = Vec::with_capacity(peripherals.len());
        for peripheral in peripherals {
            let properties = match peripheral.properties().await {
                Ok(Some(properties)) => properties,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Skipping {}: {}", peripheral.address(), e);
                    continue;
                }
            };
            devices.push(DeviceSummary {
                address: peripheral.address().to_string(),
                name: properties.local_name,
                rssi: properties.rssi,
                services: properties.services,
            });
        }
        Ok(devices)
    }

    async fn events(&self) -> Result<CentralEvents> {
        let events = self
            .adapter
            .events()
            .await
            .map_err(|e| BleRelayError::EventStreamFailed(e.to_string()))?;
        Ok(events.boxed())
    }

    async fn stop_scan(&self) {
        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Failed to stop BLE scan: {}", e);
        }
    }

    /// Follow discovery events until one matches.
    ///
    /// Peripherals the adapter already caches are not consulted: on BlueZ they can
    /// outlive the device, and connecting to a stale entry fails only after the
    /// connection timeout. A device that stopped advertising before the scan started
    /// is therefore not found until it advertises again.
    async fn find_match(
        &self,
        identity: &PeripheralIdentity,
        events: &mut CentralEvents,
    ) -> Result<FoundDevice<Peripheral>> {
        first_match(events, advertised, |id| async move {
            let peripheral = self.adapter.peripheral(&id).await.ok()?;
            inspect(identity, peripheral).await
        })
        .await
        .ok_or_else(|| {
            BleRelayError::EventStreamFailed("adapter event stream ended during scan".to_string())
        })
    }
}

/// Peripheral whose advertisement produced `event`, if any
fn advertised(event: CentralEvent) -> Option<PeripheralId> {
    match event {
        CentralEvent::DeviceDiscovered(id)
        | CentralEvent::DeviceUpdated(id)
        | CentralEvent::ServicesAdvertisement { id, .. } => Some(id),
        _ => None,
    }
}

/// First advertised id that `inspect` accepts; `None` once the stream ends
async fn first_match<S, I, T, F, Fut>(
    events: &mut S,
    advertised: impl Fn(S::Item) -> Option<I>,
    mut inspect: F,
) -> Option<T>
where
    S: Stream + Unpin,
    F: FnMut(I) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    while let Some(event) = events.next().await {
        if let Some(id) = advertised(event) {
            if let Some(found) = inspect(id).await {
                return Some(found);
            }
        }
    }
    None
}

/// Match one peripheral's advertisement against the identity
async fn inspect(
    identity: &PeripheralIdentity,
    peripheral: Peripheral,
) -> Option<FoundDevice<Peripheral>> {
    let properties = peripheral.properties().await.ok().flatten()?;
    let name = properties.local_name;

    if !identity.matches(name.as_deref(), &properties.services) {
        if let (Some(name), Some(wanted)) = (&name, &identity.name_contains) {
            if name.contains(wanted.as_str()) {
                debug!("{} matches by name but does not advertise the relay service", name);
            }
        }
        return None;
    }

    Some(FoundDevice {
        name,
        address: peripheral.address().to_string(),
        services: properties.services,
        peripheral,
    })
}

#[async_trait]
impl GattCentral for BtleplugCentral {
    type Peripheral = Peripheral;
    type Link = BtleplugLink;

    async fn scan(
        &self,
        identity: &PeripheralIdentity,
        timeout: Duration,
    ) -> Result<Option<FoundDevice<Peripheral>>> {
        let mut events = self.events().await?;

        let scan_filter = ScanFilter {
            services: identity.required_service.into_iter().collect(),
        };
        self.adapter
            .start_scan(scan_filter)
            .await
            .map_err(|e| BleRelayError::ScanFailed(format!("Failed to start BLE scan: {}", e)))?;

        let result = tokio::time::timeout(timeout, self.find_match(identity, &mut events)).await;
        self.stop_scan().await;

        match result {
            Ok(found) => found.map(Some),
            Err(_) => Ok(None),
        }
    }

    async fn connect(&self, device: &FoundDevice<Peripheral>) -> Result<BtleplugLink> {
        let peripheral = device.peripheral.clone();

        let events = self.events().await?;
        let (dropped_tx, dropped_rx) = watch::channel(false);
        let watcher = tokio::spawn(watch_disconnect(events, peripheral.id(), dropped_tx));

        if let Err(e) = peripheral.connect().await {
            watcher.abort();
            return Err(BleRelayError::ConnectionFailed(e.to_string()));
        }

        if let Err(e) = peripheral.discover_services().await {
            watcher.abort();
            if let Err(e) = peripheral.disconnect().await {
                debug!("Disconnect after failed service discovery: {}", e);
            }
            return Err(BleRelayError::ServiceDiscoveryFailed(e.to_string()));
        }

        Ok(BtleplugLink {
            peripheral,
            dropped: dropped_rx,
            watcher,
            write_characteristic: OnceLock::new(),
        })
    }
}

/// Flip `dropped` when the adapter reports this peripheral disconnected
async fn watch_disconnect(
    mut events: CentralEvents,
    id: PeripheralId,
    dropped: watch::Sender<bool>,
) {
    while let Some(event) = events.next().await {
        if let CentralEvent::DeviceDisconnected(gone) = event {
            if gone == id {
                debug!("Adapter reported disconnect of {:?}", id);
                let _ = dropped.send(true);
                return;
            }
        }
    }
    // No more events means no more disconnect reports either; treat as dropped
    let _ = dropped.send(true);
}

// ----------------------------------------------------------------------------
// Link
// ----------------------------------------------------------------------------

/// A connected btleplug peripheral
pub struct BtleplugLink {
    peripheral: Peripheral,
    dropped: watch::Receiver<bool>,
    watcher: JoinHandle<()>,
    write_characteristic: OnceLock<Characteristic>,
}

impl BtleplugLink {
    fn characteristic(&self, service: Option<Uuid>, uuid: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid && service.map_or(true, |s| c.service_uuid == s))
            .ok_or_else(|| BleRelayError::CharacteristicNotFound {
                characteristic: uuid.to_string(),
            })
    }
}

impl Drop for BtleplugLink {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

#[async_trait]
impl GattLink for BtleplugLink {
    fn address(&self) -> String {
        self.peripheral.address().to_string()
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        let notify_char = self.characteristic(None, characteristic)?;

        // Open the stream first so nothing sent right after subscribing is lost
        let notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| BleRelayError::NotificationStreamFailed(e.to_string()))?;

        self.peripheral
            .subscribe(&notify_char)
            .await
            .map_err(|e| BleRelayError::SubscriptionFailed(e.to_string()))?;

        Ok(notifications
            .filter_map(move |n| {
                futures::future::ready((n.uuid == characteristic).then_some(n.value))
            })
            .boxed())
    }

    async fn resolve_write_target(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<WriteTarget> {
        let write_char = self.characteristic(Some(service), characteristic)?;
        if !write_char
            .properties
            .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
        {
            warn!(
                "Characteristic {} does not advertise write-without-response",
                characteristic
            );
        }

        let _ = self.write_characteristic.set(write_char);

        // btleplug does not expose the negotiated ATT MTU
        Ok(WriteTarget {
            characteristic,
            max_write_len: None,
        })
    }

    async fn write_without_response(&self, target: &WriteTarget, chunk: &[u8]) -> Result<()> {
        let write_char = self
            .write_characteristic
            .get()
            .filter(|c| c.uuid == target.characteristic)
            .ok_or(BleRelayError::NotReady)?;

        self.peripheral
            .write(write_char, chunk, WriteType::WithoutResponse)
            .await
            .map_err(|e| BleRelayError::WriteFailed(e.to_string()))
    }

    async fn disconnected(&self) {
        let mut dropped = self.dropped.clone();
        let _ = dropped.wait_for(|gone| *gone).await;
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| BleRelayError::ConnectionFailed(format!("disconnect: {}", e)))
    }
}
