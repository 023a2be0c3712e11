//! Transport tests against the in-memory backend
//!
//! Session lifecycle and supervisor restarts, plus chunked delivery through the submit
//! facade.

mod support;

use std::sync::Arc;
use std::time::Duration;

use hidrelay_ble::{
    BleRelayError, ConnectionState, EventPublisher, Relay, RelayCommand, RelayConfig,
    RelayEvent, RelayHandle, SessionOutcome, SessionSlot, TransportSession,
};
use hidrelay_core::{InputEvent, PeripheralIdentity, RELAY_SERVICE_UUID};
use support::{wait_until, wait_until_blocking, MockCentral, MockDevice, Plan};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

const FORTY_FIVE: &str = "ML:12345,23456;ML:12345,23456;ML:1234,2345;xy";

fn start(central: &MockCentral, config: RelayConfig) -> (RelayHandle, JoinHandle<()>) {
    let (handle, supervisor) = Relay::supervise(central.clone(), config).unwrap();
    (handle, tokio::spawn(supervisor.run()))
}

async fn ready(handle: &RelayHandle) {
    let became_ready = timeout(Duration::from_secs(2), handle.wait_ready())
        .await
        .expect("relay should become ready");
    assert!(became_ready);
}

async fn next_event(
    events: &mut broadcast::Receiver<RelayEvent>,
    mut wanted: impl FnMut(&RelayEvent) -> bool,
) -> RelayEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.unwrap();
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event should arrive")
}

async fn stop(handle: RelayHandle, supervisor: JoinHandle<()>) {
    handle.shutdown();
    timeout(Duration::from_secs(2), supervisor)
        .await
        .expect("supervisor should stop")
        .unwrap();
}

// ----------------------------------------------------------------------------
// Delivery
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_key_down_delivered_in_one_write() {
    let central = MockCentral::new([Plan::Found(MockDevice::relay())]);
    let (handle, supervisor) = start(&central, RelayConfig::default());
    ready(&handle).await;

    assert!(handle.submit(InputEvent::key_down(0x41)));

    let link = central.link(0);
    wait_until("key down write", || link.writes().len() == 1).await;
    assert_eq!(link.writes(), vec![b"P:0x41".to_vec()]);

    stop(handle, supervisor).await;
}

#[tokio::test]
async fn test_long_message_chunked_in_order() {
    assert_eq!(FORTY_FIVE.len(), 45);

    let central = MockCentral::new([Plan::Found(MockDevice::relay())]);
    let (handle, supervisor) = start(&central, RelayConfig::default());
    ready(&handle).await;
    let mut events = handle.subscribe();

    assert!(handle.submit_text(FORTY_FIVE));

    let sent = next_event(&mut events, |e| matches!(e, RelayEvent::MessageSent { .. })).await;
    assert_eq!(
        sent,
        RelayEvent::MessageSent {
            message: FORTY_FIVE.to_string(),
            chunks: 3
        }
    );

    let link = central.link(0);
    let lengths: Vec<usize> = link.writes().iter().map(Vec::len).collect();
    assert_eq!(lengths, vec![20, 20, 5]);
    assert_eq!(link.written_text(), FORTY_FIVE);

    stop(handle, supervisor).await;
}

#[tokio::test]
async fn test_negotiated_write_length_overrides_fallback() {
    let central = MockCentral::new([Plan::Found(MockDevice::relay())]);
    central.set_max_write_len(8);
    let (handle, supervisor) = start(&central, RelayConfig::default());
    let mut events = handle.subscribe();

    let ready_event = next_event(&mut events, |e| matches!(e, RelayEvent::Ready { .. })).await;
    assert_eq!(
        ready_event,
        RelayEvent::Ready {
            generation: 1,
            max_write_len: 8
        }
    );

    assert!(handle.submit_text("0123456789abcdefghij"));
    let link = central.link(0);
    wait_until("three chunks", || link.writes().len() == 3).await;
    let lengths: Vec<usize> = link.writes().iter().map(Vec::len).collect();
    assert_eq!(lengths, vec![8, 8, 4]);

    stop(handle, supervisor).await;
}

#[tokio::test]
async fn test_write_failure_abandons_rest_of_message_only() {
    let central = MockCentral::new([Plan::Found(MockDevice::relay())]);
    central.fail_write_at(1);
    let (handle, supervisor) = start(&central, RelayConfig::default());
    ready(&handle).await;
    let mut events = handle.subscribe();

    assert!(handle.submit_text(FORTY_FIVE));
    let failed = next_event(&mut events, |e| matches!(e, RelayEvent::WriteFailed { .. })).await;
    assert!(matches!(failed, RelayEvent::WriteFailed { message, .. } if message == FORTY_FIVE));

    // Session keeps serving
    assert_eq!(handle.state(), ConnectionState::Ready);
    assert!(handle.submit(InputEvent::key_down(0x41)));

    let link = central.link(0);
    wait_until("next message", || link.writes().len() == 2).await;
    assert_eq!(link.writes()[0], FORTY_FIVE.as_bytes()[..20].to_vec());
    assert_eq!(link.writes()[1], b"P:0x41".to_vec());
    assert_eq!(handle.generation(), 1);

    stop(handle, supervisor).await;
}

#[tokio::test]
async fn test_notifications_reach_subscribers() {
    let central = MockCentral::new([Plan::Found(MockDevice::relay())]);
    let (handle, supervisor) = start(&central, RelayConfig::default());
    ready(&handle).await;
    let mut events = handle.subscribe();

    assert!(central.link(0).notify(b"OK"));

    let notification =
        next_event(&mut events, |e| matches!(e, RelayEvent::Notification { .. })).await;
    assert_eq!(
        notification,
        RelayEvent::Notification {
            data: b"OK".to_vec()
        }
    );

    stop(handle, supervisor).await;
}

// ----------------------------------------------------------------------------
// Facade
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_submit_is_noop_while_not_ready() {
    // No plans: the scan just waits out its timeout
    let central = MockCentral::default();
    let (handle, supervisor) = start(&central, RelayConfig::default());
    wait_until("first scan", || central.scans() == 1).await;

    assert_eq!(handle.state(), ConnectionState::Scanning);
    assert!(!handle.submit(InputEvent::key_down(0x41)));
    assert!(!handle.submit_text("P:0x41"));
    assert_eq!(central.link_count(), 0);

    stop(handle, supervisor).await;
    assert_eq!(central.connects(), 0);
}

#[tokio::test]
async fn test_events_submitted_while_disconnected_are_not_replayed() {
    let central = MockCentral::new([Plan::Found(MockDevice::relay())]);
    let (handle, supervisor) = start(&central, RelayConfig::default());
    ready(&handle).await;

    central.link(0).drop_link();
    wait_until("session to leave ready", || !handle.is_ready()).await;
    assert!(!handle.submit(InputEvent::key_down(0x42)));

    central.push(Plan::Found(MockDevice::relay()));
    ready(&handle).await;
    assert!(handle.submit(InputEvent::key_up(0x43)));

    let second = central.link(1);
    wait_until("write on new link", || second.writes().len() == 1).await;
    assert_eq!(second.writes(), vec![b"R:0x43".to_vec()]);
    assert!(central.link(0).writes().is_empty());

    stop(handle, supervisor).await;
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let config = RelayConfig::new().with_identity(PeripheralIdentity {
        name_contains: None,
        required_service: None,
    });
    let result = Relay::supervise(MockCentral::default(), config);
    assert!(matches!(result, Err(BleRelayError::Configuration(_))));
}

// ----------------------------------------------------------------------------
// Supervisor
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_scan_timeouts_restart_with_new_generations() {
    let central = MockCentral::new([Plan::NotFound, Plan::NotFound, Plan::NotFound]);
    let (handle, supervisor) = start(&central, RelayConfig::default());

    wait_until("fourth scan", || central.scans() == 4).await;
    assert_eq!(handle.generation(), 4);
    assert_eq!(handle.state(), ConnectionState::Scanning);
    assert_eq!(central.connects(), 0);

    stop(handle, supervisor).await;
}

#[tokio::test]
async fn test_disconnect_restarts_on_a_new_link() {
    let central = MockCentral::new([
        Plan::Found(MockDevice::relay()),
        Plan::Found(MockDevice::relay()),
    ]);
    let (handle, supervisor) = start(&central, RelayConfig::default());
    ready(&handle).await;
    assert_eq!(handle.generation(), 1);

    let first = central.link(0);
    first.drop_link();

    wait_until("second session ready", || {
        handle.generation() == 2 && handle.is_ready()
    })
    .await;
    assert_eq!(first.disconnects(), 1);

    assert!(handle.submit(InputEvent::key_down(0x41)));
    let second = central.link(1);
    wait_until("write on second link", || second.writes().len() == 1).await;
    assert!(first.writes().is_empty());

    stop(handle, supervisor).await;
}

#[tokio::test]
async fn test_disconnect_during_stalled_write_restarts() {
    let central = MockCentral::new([
        Plan::Found(MockDevice::relay()),
        Plan::Found(MockDevice::relay()),
    ]);
    let (handle, supervisor) = start(&central, RelayConfig::default());
    ready(&handle).await;

    let first = central.link(0);
    first.stall_writes();
    assert!(handle.submit(InputEvent::key_down(0x41)));
    wait_until("write to stall", || first.write_calls() == 1).await;

    first.drop_link();
    wait_until("second session ready", || {
        handle.generation() == 2 && handle.is_ready()
    })
    .await;
    assert_eq!(central.scans(), 2);
    assert_eq!(first.disconnects(), 1);
    assert!(first.writes().is_empty());

    stop(handle, supervisor).await;
}

#[tokio::test]
async fn test_disconnect_during_setup_restarts_without_failure() {
    let central = MockCentral::new([
        Plan::Found(MockDevice::relay()),
        Plan::Found(MockDevice::relay()),
    ]);
    central.drop_during_setup();
    let (handle, supervisor) = start(&central, RelayConfig::default());
    let mut events = handle.subscribe();

    ready(&handle).await;
    assert_eq!(handle.generation(), 2);
    assert_eq!(central.link(0).disconnects(), 1);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen
        .iter()
        .any(|e| matches!(e, RelayEvent::Disconnected { generation: 1 })));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, RelayEvent::Ready { generation: 1, .. })));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, RelayEvent::SessionFailed { .. })));

    stop(handle, supervisor).await;
}

#[tokio::test]
async fn test_connect_failure_reported_and_retried() {
    let central = MockCentral::new([
        Plan::ConnectFails(MockDevice::relay()),
        Plan::Found(MockDevice::relay()),
    ]);
    let (handle, supervisor) = start(&central, RelayConfig::default());
    let mut events = handle.subscribe();

    let failed = next_event(&mut events, |e| matches!(e, RelayEvent::SessionFailed { .. })).await;
    assert!(matches!(failed, RelayEvent::SessionFailed { generation: 1, .. }));

    ready(&handle).await;
    assert_eq!(handle.generation(), 2);
    assert_eq!(central.connects(), 2);

    stop(handle, supervisor).await;
}

#[tokio::test]
async fn test_identity_mismatch_is_not_connected() {
    let central = MockCentral::new([
        Plan::Found(MockDevice::named("Keyboard", vec![RELAY_SERVICE_UUID])),
        Plan::Found(MockDevice::named("HID BLE Relay", vec![])),
        Plan::Found(MockDevice::relay()),
    ]);
    let (handle, supervisor) = start(&central, RelayConfig::default());
    ready(&handle).await;

    assert_eq!(handle.generation(), 3);
    assert_eq!(central.connects(), 1);

    stop(handle, supervisor).await;
}

#[tokio::test]
async fn test_shutdown_tears_down_current_session() {
    let central = MockCentral::new([Plan::Found(MockDevice::relay())]);
    let (handle, supervisor) = start(&central, RelayConfig::default());
    ready(&handle).await;
    let mut events = handle.subscribe();

    stop(handle.clone(), supervisor).await;

    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert_eq!(central.link(0).disconnects(), 1);
    assert_eq!(
        next_event(&mut events, |e| matches!(e, RelayEvent::Disconnected { .. })).await,
        RelayEvent::Disconnected { generation: 1 }
    );
    assert!(!handle.submit(InputEvent::key_down(0x41)));
}

#[tokio::test]
async fn test_shutdown_while_scanning() {
    let central = MockCentral::default();
    let (handle, supervisor) = start(&central, RelayConfig::default());
    wait_until("scan", || central.scans() == 1).await;

    stop(handle.clone(), supervisor).await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert_eq!(central.scans(), 1);
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

fn session(
    central: &MockCentral,
    slot: &Arc<SessionSlot>,
    events: &EventPublisher,
) -> TransportSession<MockCentral> {
    let generation = slot.begin_session();
    TransportSession::new(
        generation,
        Arc::new(central.clone()),
        Arc::new(RelayConfig::default()),
        Arc::clone(slot),
        events.clone(),
    )
}

#[tokio::test]
async fn test_teardown_twice_releases_link_once() {
    let central = MockCentral::new([Plan::Found(MockDevice::relay())]);
    let slot = Arc::new(SessionSlot::new());
    let events = EventPublisher::new(16);
    let mut observer = events.subscribe();
    let mut session = session(&central, &slot, &events);

    assert!(session.establish().await.unwrap().is_some());
    assert_eq!(slot.state(), ConnectionState::Ready);

    session.teardown().await;
    session.teardown().await;

    assert_eq!(central.link(0).disconnects(), 1);
    assert_eq!(slot.state(), ConnectionState::Disconnected);

    let mut disconnected = 0;
    while let Ok(event) = observer.try_recv() {
        if matches!(event, RelayEvent::Disconnected { .. }) {
            disconnected += 1;
        }
    }
    assert_eq!(disconnected, 1);
}

#[tokio::test]
async fn test_send_refused_after_teardown() {
    let central = MockCentral::new([Plan::Found(MockDevice::relay())]);
    let slot = Arc::new(SessionSlot::new());
    let mut session = session(&central, &slot, &EventPublisher::new(4));

    assert!(session.establish().await.unwrap().is_some());
    let message = hidrelay_core::encode(&InputEvent::key_down(0x41));
    assert_eq!(session.send(&message).await.unwrap(), 1);

    session.teardown().await;
    assert!(matches!(
        session.send(&message).await,
        Err(BleRelayError::NotReady)
    ));
}

#[tokio::test]
async fn test_scan_timeout_yields_no_stream() {
    let central = MockCentral::new([Plan::NotFound]);
    let slot = Arc::new(SessionSlot::new());
    let mut session = session(&central, &slot, &EventPublisher::new(4));

    assert!(session.establish().await.unwrap().is_none());
    assert!(!session.reached_ready());
    session.teardown().await;
    assert_eq!(slot.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_stale_generation_commands_are_dropped() {
    let central = MockCentral::new([Plan::Found(MockDevice::relay())]);
    let slot = Arc::new(SessionSlot::new());
    let mut session = session(&central, &slot, &EventPublisher::new(4));
    let generation = session.generation();

    let (commands_tx, mut commands_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    commands_tx
        .send(RelayCommand::Send {
            generation: generation + 7,
            event: InputEvent::key_down(0x01),
        })
        .unwrap();
    commands_tx
        .send(RelayCommand::Send {
            generation,
            event: InputEvent::key_down(0x41),
        })
        .unwrap();

    let running =
        tokio::spawn(async move { session.run(&mut commands_rx, &mut shutdown_rx).await });

    wait_until("link", || central.link_count() == 1).await;
    let link = central.link(0);
    wait_until("current write", || link.writes().len() == 1).await;
    assert_eq!(link.writes(), vec![b"P:0x41".to_vec()]);

    shutdown_tx.send_replace(true);
    let outcome = timeout(Duration::from_secs(2), running).await.unwrap().unwrap();
    assert!(matches!(outcome, SessionOutcome::Shutdown));
    assert_eq!(link.disconnects(), 1);
}

#[tokio::test]
async fn test_closed_command_channel_ends_session() {
    let central = MockCentral::new([Plan::Found(MockDevice::relay())]);
    let slot = Arc::new(SessionSlot::new());
    let mut session = session(&central, &slot, &EventPublisher::new(4));

    let (commands_tx, mut commands_rx) = mpsc::unbounded_channel::<RelayCommand>();
    let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
    drop(commands_tx);

    let outcome = timeout(
        Duration::from_secs(2),
        session.run(&mut commands_rx, &mut shutdown_rx),
    )
    .await
    .unwrap();
    assert!(matches!(outcome, SessionOutcome::Closed));
    assert!(!outcome.should_restart());
    assert_eq!(slot.state(), ConnectionState::Disconnected);
}

// ----------------------------------------------------------------------------
// Dedicated Thread
// ----------------------------------------------------------------------------

#[test]
fn test_spawned_relay_serves_plain_threads() {
    let central = MockCentral::new([Plan::Found(MockDevice::relay())]);
    let backend = central.clone();
    let relay = Relay::spawn(RelayConfig::default(), move || async move {
        Ok::<_, BleRelayError>(backend)
    })
    .unwrap();

    let handle = relay.handle();
    wait_until_blocking("ready", || handle.is_ready());

    let submitter = std::thread::spawn(move || handle.submit(InputEvent::key_down(0x41)));
    assert!(submitter.join().unwrap());

    wait_until_blocking("write", || {
        central.link_count() == 1 && central.link(0).writes().len() == 1
    });

    relay.shutdown();
    assert_eq!(central.link(0).disconnects(), 1);
}

#[test]
fn test_spawn_reports_backend_startup_failure() {
    let result = Relay::spawn(RelayConfig::default(), || async {
        Err::<MockCentral, _>(BleRelayError::AdapterNotAvailable)
    });
    assert!(matches!(result, Err(BleRelayError::AdapterNotAvailable)));
}
