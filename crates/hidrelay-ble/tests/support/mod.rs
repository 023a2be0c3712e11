//! In-memory BLE backend for transport tests
//!
//! `MockCentral` hands out scan results from a queue of plans; each successful connect
//! creates a `LinkState` the test can inspect and drive.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use hidrelay_ble::{
    BleRelayError, FoundDevice, GattCentral, GattLink, NotificationStream, Result, WriteTarget,
};
use hidrelay_core::{PeripheralIdentity, DEFAULT_PERIPHERAL_NAME, RELAY_SERVICE_UUID};
use tokio::sync::{watch, Notify};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Central
// ----------------------------------------------------------------------------

/// An advertising device as the mock radio sees it
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub name: Option<String>,
    pub services: Vec<Uuid>,
    refuses_connect: bool,
}

impl MockDevice {
    /// A device that matches the default identity
    pub fn relay() -> Self {
        Self {
            name: Some(DEFAULT_PERIPHERAL_NAME.to_string()),
            services: vec![RELAY_SERVICE_UUID],
            refuses_connect: false,
        }
    }

    pub fn named(name: &str, services: Vec<Uuid>) -> Self {
        Self {
            name: Some(name.to_string()),
            services,
            refuses_connect: false,
        }
    }
}

/// What the next scan produces
#[derive(Debug, Clone)]
pub enum Plan {
    /// The scan times out immediately
    NotFound,
    /// The device advertises; connecting succeeds
    Found(MockDevice),
    /// The device advertises; connecting fails
    ConnectFails(MockDevice),
}

#[derive(Default)]
struct CentralState {
    plans: Mutex<VecDeque<Plan>>,
    scans: AtomicUsize,
    connects: AtomicUsize,
    links: Mutex<Vec<Arc<LinkState>>>,
    max_write_len: Mutex<Option<NonZeroUsize>>,
    fail_write_at: Mutex<Option<usize>>,
    drop_during_setup: AtomicBool,
    pushed: Notify,
}

/// Cloneable handle; clones share plans and recorded links
#[derive(Clone, Default)]
pub struct MockCentral {
    state: Arc<CentralState>,
}

impl MockCentral {
    /// Scans follow `plans` in order; with none left they wait for [`MockCentral::push`]
    /// or time out
    pub fn new(plans: impl IntoIterator<Item = Plan>) -> Self {
        let central = Self::default();
        central.state.plans.lock().unwrap().extend(plans);
        central
    }

    pub fn push(&self, plan: Plan) {
        self.state.plans.lock().unwrap().push_back(plan);
        self.state.pushed.notify_one();
    }

    /// Max write length reported by links created from now on
    pub fn set_max_write_len(&self, len: usize) {
        *self.state.max_write_len.lock().unwrap() = NonZeroUsize::new(len);
    }

    /// Links created from now on fail their `index`th write (zero-based)
    pub fn fail_write_at(&self, index: usize) {
        *self.state.fail_write_at.lock().unwrap() = Some(index);
    }

    /// The next link drops as soon as notifications are requested, and the request
    /// never completes
    pub fn drop_during_setup(&self) {
        self.state.drop_during_setup.store(true, Ordering::SeqCst);
    }

    pub fn scans(&self) -> usize {
        self.state.scans.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn link_count(&self) -> usize {
        self.state.links.lock().unwrap().len()
    }

    pub fn link(&self, index: usize) -> Arc<LinkState> {
        Arc::clone(&self.state.links.lock().unwrap()[index])
    }
}

#[async_trait]
impl GattCentral for MockCentral {
    type Peripheral = MockDevice;
    type Link = MockLink;

    async fn scan(
        &self,
        identity: &PeripheralIdentity,
        timeout: Duration,
    ) -> Result<Option<FoundDevice<MockDevice>>> {
        self.state.scans.fetch_add(1, Ordering::SeqCst);

        let plan = loop {
            let next = self.state.plans.lock().unwrap().pop_front();
            if let Some(plan) = next {
                break plan;
            }
            // Nothing planned: wait out the timeout unless a plan is pushed first
            tokio::select! {
                _ = tokio::time::sleep(timeout) => return Ok(None),
                _ = self.state.pushed.notified() => {}
            }
        };

        let (mut device, refuses_connect) = match plan {
            Plan::NotFound => return Ok(None),
            Plan::Found(device) => (device, false),
            Plan::ConnectFails(device) => (device, true),
        };
        if !identity.matches(device.name.as_deref(), &device.services) {
            return Ok(None);
        }
        device.refuses_connect = refuses_connect;

        Ok(Some(FoundDevice {
            name: device.name.clone(),
            address: format!("MOCK-{}", self.scans()),
            services: device.services.clone(),
            peripheral: device,
        }))
    }

    async fn connect(&self, device: &FoundDevice<MockDevice>) -> Result<MockLink> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if device.peripheral.refuses_connect {
            return Err(BleRelayError::ConnectionFailed("mock refused".to_string()));
        }

        let link = Arc::new(LinkState::new(
            device.address.clone(),
            LinkBehavior {
                max_write_len: *self.state.max_write_len.lock().unwrap(),
                fail_write_at: *self.state.fail_write_at.lock().unwrap(),
                drops_during_setup: self.state.drop_during_setup.swap(false, Ordering::SeqCst),
            },
        ));
        self.state.links.lock().unwrap().push(Arc::clone(&link));
        Ok(MockLink(link))
    }
}

// ----------------------------------------------------------------------------
// Link
// ----------------------------------------------------------------------------

/// Fixed at connect time from the central's knobs
struct LinkBehavior {
    max_write_len: Option<NonZeroUsize>,
    fail_write_at: Option<usize>,
    drops_during_setup: bool,
}

/// Observable state of one mock connection
pub struct LinkState {
    address: String,
    behavior: LinkBehavior,
    stalled: AtomicBool,
    write_calls: AtomicUsize,
    writes: Mutex<Vec<Vec<u8>>>,
    disconnects: AtomicUsize,
    dropped: watch::Sender<bool>,
    notify: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl LinkState {
    fn new(address: String, behavior: LinkBehavior) -> Self {
        let (dropped, _) = watch::channel(false);
        Self {
            address,
            behavior,
            stalled: AtomicBool::new(false),
            write_calls: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
            dropped,
            notify: Mutex::new(None),
        }
    }

    /// Chunks the peripheral accepted, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    /// Accepted chunks concatenated into text
    pub fn written_text(&self) -> String {
        String::from_utf8(self.writes().concat()).unwrap()
    }

    /// Writes issued from now on never complete
    pub fn stall_writes(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    /// Writes issued so far, including failed and stalled ones
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Simulate the peripheral going away
    pub fn drop_link(&self) {
        self.dropped.send_replace(true);
    }

    /// Push a notification from the peripheral; false if nobody subscribed
    pub fn notify(&self, data: &[u8]) -> bool {
        match &*self.notify.lock().unwrap() {
            Some(sender) => sender.unbounded_send(data.to_vec()).is_ok(),
            None => false,
        }
    }
}

pub struct MockLink(Arc<LinkState>);

#[async_trait]
impl GattLink for MockLink {
    fn address(&self) -> String {
        self.0.address.clone()
    }

    async fn subscribe(&self, _characteristic: Uuid) -> Result<NotificationStream> {
        if self.0.behavior.drops_during_setup {
            self.0.dropped.send_replace(true);
            std::future::pending::<()>().await;
        }
        let (sender, receiver) = mpsc::unbounded();
        *self.0.notify.lock().unwrap() = Some(sender);
        Ok(receiver.boxed())
    }

    async fn resolve_write_target(
        &self,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<WriteTarget> {
        Ok(WriteTarget {
            characteristic,
            max_write_len: self.0.behavior.max_write_len,
        })
    }

    async fn write_without_response(&self, _target: &WriteTarget, chunk: &[u8]) -> Result<()> {
        let call = self.0.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.0.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if *self.0.dropped.borrow() {
            return Err(BleRelayError::WriteFailed("link dropped".to_string()));
        }
        if self.0.behavior.fail_write_at == Some(call) {
            return Err(BleRelayError::WriteFailed("mock write error".to_string()));
        }
        self.0.writes.lock().unwrap().push(chunk.to_vec());
        Ok(())
    }

    async fn disconnected(&self) {
        let mut dropped = self.0.dropped.subscribe();
        let _ = dropped.wait_for(|gone| *gone).await;
    }

    async fn disconnect(&self) -> Result<()> {
        self.0.disconnects.fetch_add(1, Ordering::SeqCst);
        self.0.dropped.send_replace(true);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Blocking variant of [`wait_until`] for tests outside a runtime
pub fn wait_until_blocking(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if std::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
