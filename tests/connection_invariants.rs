//! Connection Invariant Tests
//!
//! Tests that the connection manager's guarantees hold:
//! - At most one physical channel is open per identity at any time
//! - Backoff delays double per failure, cap at the maximum, and reset on a
//!   successful connect
//! - disconnect() cancels a pending reconnect synchronously
//! - An identity swap tears down the old channel and no stale event from it
//!   is ever delivered
//! - Foregrounding reconnects exactly once from disconnected, never from
//!   connected

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use shiftwire::realtime::{
    ChannelHandle, ChannelSink, ChannelStatus, ConnectionManager, ConnectionStatus, EventType,
    LifecycleBridge, RealtimeConfig, RealtimeResult, RealtimeTransport, RowChange, StaffId, Topic,
    TopicFilter,
};

// =============================================================================
// Test Utilities
// =============================================================================

struct MockChannel {
    closed: Arc<AtomicBool>,
}

impl ChannelHandle for MockChannel {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct OpenedChannel {
    name: String,
    filters: Vec<TopicFilter>,
    sink: ChannelSink,
    closed: Arc<AtomicBool>,
}

/// Transport that records every open and lets the test drive the sinks
#[derive(Default)]
struct MockTransport {
    opened: Mutex<Vec<OpenedChannel>>,
}

impl MockTransport {
    fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    fn sink(&self, index: usize) -> ChannelSink {
        self.opened.lock().unwrap()[index].sink.clone()
    }

    fn is_closed(&self, index: usize) -> bool {
        self.opened.lock().unwrap()[index].closed.load(Ordering::SeqCst)
    }

    fn name(&self, index: usize) -> String {
        self.opened.lock().unwrap()[index].name.clone()
    }

    fn filters(&self, index: usize) -> Vec<TopicFilter> {
        self.opened.lock().unwrap()[index].filters.clone()
    }
}

impl RealtimeTransport for MockTransport {
    fn open_channel(
        &self,
        name: &str,
        filters: &[TopicFilter],
        sink: ChannelSink,
    ) -> RealtimeResult<Box<dyn ChannelHandle>> {
        let closed = Arc::new(AtomicBool::new(false));
        self.opened.lock().unwrap().push(OpenedChannel {
            name: name.to_string(),
            filters: filters.to_vec(),
            sink,
            closed: Arc::clone(&closed),
        });
        Ok(Box::new(MockChannel { closed }))
    }
}

fn manager_with_mock() -> (Arc<ConnectionManager>, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::default());
    let manager = ConnectionManager::new(RealtimeConfig::default(), transport.clone());
    (manager, transport)
}

fn assignment_insert_for(staff: &StaffId) -> RowChange {
    RowChange {
        table: "shift_assignments".to_string(),
        event_type: EventType::Insert,
        new: Some(json!({"staff_id": staff.to_string()})),
        old: None,
    }
}

// =============================================================================
// INVARIANT: Single Active Channel
// =============================================================================

/// Any sequence of connect() calls with the same identity opens at most one
/// physical channel.
#[tokio::test]
async fn test_single_channel_for_repeated_connects() {
    let (manager, transport) = manager_with_mock();
    let staff = StaffId::random();

    manager.connect_as(staff.clone());
    manager.connect_as(staff.clone());
    (transport.sink(0).on_status)(ChannelStatus::Subscribed);
    manager.connect_as(staff.clone());
    manager.connect();

    assert_eq!(transport.open_count(), 1);
    assert!(!transport.is_closed(0));
}

/// A reconnect after a channel error closes the failed channel before the
/// replacement opens.
#[tokio::test(start_paused = true)]
async fn test_reconnect_replaces_failed_channel() {
    let (manager, transport) = manager_with_mock();
    manager.connect_as(StaffId::random());

    (transport.sink(0).on_status)(ChannelStatus::ChannelError(None));
    assert_eq!(manager.status(), ConnectionStatus::Error);

    tokio::time::sleep(Duration::from_millis(1001)).await;

    assert_eq!(transport.open_count(), 2);
    assert!(!transport.is_closed(1));
}

// =============================================================================
// INVARIANT: Backoff Monotonicity, Cap, and Reset
// =============================================================================

/// Delays follow min(1000 * 2^n, 30000): nothing fires before the current
/// delay elapses, and each failure doubles it.
#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_per_failure() {
    let (manager, transport) = manager_with_mock();
    manager.connect_as(StaffId::random());

    // First failure: 1000ms delay
    (transport.sink(0).on_status)(ChannelStatus::ChannelError(None));
    tokio::time::sleep(Duration::from_millis(999)).await;
    assert_eq!(transport.open_count(), 1);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(transport.open_count(), 2);

    // Second consecutive failure: 2000ms delay
    (transport.sink(1).on_status)(ChannelStatus::TimedOut);
    tokio::time::sleep(Duration::from_millis(1999)).await;
    assert_eq!(transport.open_count(), 2);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(transport.open_count(), 3);

    // Third consecutive failure: 4000ms delay
    (transport.sink(2).on_status)(ChannelStatus::ChannelError(None));
    tokio::time::sleep(Duration::from_millis(3999)).await;
    assert_eq!(transport.open_count(), 3);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(transport.open_count(), 4);
}

/// The delay never exceeds the configured maximum however many failures
/// accumulate.
#[tokio::test(start_paused = true)]
async fn test_backoff_caps_at_max_delay() {
    let transport = Arc::new(MockTransport::default());
    let config = RealtimeConfig {
        initial_retry_delay: Duration::from_millis(100),
        max_retry_delay: Duration::from_millis(400),
        ..Default::default()
    };
    let manager = ConnectionManager::new(config, transport.clone());
    manager.connect_as(StaffId::random());

    // Climb past the cap: 100, 200, 400, 400, ...
    for failure in 0..6 {
        (transport.sink(failure).on_status)(ChannelStatus::ChannelError(None));
        tokio::time::sleep(Duration::from_millis(401)).await;
        assert_eq!(transport.open_count(), failure + 2);
    }
}

/// A successful connect resets the backoff to the initial delay.
#[tokio::test(start_paused = true)]
async fn test_backoff_resets_after_successful_connect() {
    let (manager, transport) = manager_with_mock();
    manager.connect_as(StaffId::random());

    // Two failures climb the backoff to 2000ms
    (transport.sink(0).on_status)(ChannelStatus::ChannelError(None));
    tokio::time::sleep(Duration::from_millis(1001)).await;
    (transport.sink(1).on_status)(ChannelStatus::ChannelError(None));
    tokio::time::sleep(Duration::from_millis(2001)).await;
    assert_eq!(transport.open_count(), 3);

    // Success resets the counter
    (transport.sink(2).on_status)(ChannelStatus::Subscribed);
    assert_eq!(manager.retry_attempts(), 0);

    // Next failure is back to the initial 1000ms delay
    (transport.sink(2).on_status)(ChannelStatus::ChannelError(None));
    tokio::time::sleep(Duration::from_millis(999)).await;
    assert_eq!(transport.open_count(), 3);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(transport.open_count(), 4);
}

// =============================================================================
// INVARIANT: Disconnect Cancels Pending Retry
// =============================================================================

/// A reconnect scheduled before disconnect() never executes after it.
#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_retry() {
    let (manager, transport) = manager_with_mock();
    manager.connect_as(StaffId::random());

    (transport.sink(0).on_status)(ChannelStatus::ChannelError(None));
    assert_eq!(manager.status(), ConnectionStatus::Error);

    manager.disconnect();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
}

// =============================================================================
// INVARIANT: Identity Swap
// =============================================================================

/// Switching identity while connected tears down the old channel, opens a
/// channel scoped to the new identity, and never delivers stale events.
#[tokio::test]
async fn test_identity_swap_replaces_channel() {
    let (manager, transport) = manager_with_mock();
    let alice = StaffId::random();
    let bob = StaffId::random();

    let delivered = Arc::new(AtomicUsize::new(0));
    {
        let delivered = Arc::clone(&delivered);
        manager.subscribe(
            Topic::ShiftAssignments,
            Arc::new(move |_| {
                delivered.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    manager.connect_as(alice.clone());
    let alice_sink = transport.sink(0);
    (alice_sink.on_status)(ChannelStatus::Subscribed);

    manager.connect_as(bob.clone());

    // Old channel released, new one scoped to the new identity
    assert!(transport.is_closed(0));
    assert_eq!(transport.open_count(), 2);
    assert_ne!(transport.name(0), transport.name(1));
    let predicate = &transport.filters(1)[0].predicate;
    assert_eq!(predicate.value, json!(bob.to_string()));

    // A late event from the torn-down channel is ignored entirely
    (alice_sink.on_event)(assignment_insert_for(&alice));
    assert_eq!(delivered.load(Ordering::SeqCst), 0);

    // A late status from it cannot corrupt the new connection's state
    (alice_sink.on_status)(ChannelStatus::ChannelError(None));
    assert_eq!(manager.status(), ConnectionStatus::Connecting);

    // The new channel delivers, and registrations survived the swap
    (transport.sink(1).on_status)(ChannelStatus::Subscribed);
    (transport.sink(1).on_event)(assignment_insert_for(&bob));
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

/// Every topic filter on the channel is scoped to the connecting identity.
#[tokio::test]
async fn test_channel_carries_one_filter_per_topic() {
    let (manager, transport) = manager_with_mock();
    let staff = StaffId::random();

    manager.connect_as(staff.clone());

    let filters = transport.filters(0);
    assert_eq!(filters.len(), Topic::ALL.len());
    for filter in &filters {
        assert_eq!(filter.predicate.value, json!(staff.to_string()));
    }
}

// =============================================================================
// SCENARIO: Foreground Recovery
// =============================================================================

/// Disconnected + identity present + foreground transition reconnects
/// exactly once; already connected reconnects zero times.
#[tokio::test]
async fn test_foreground_recovery() {
    let (manager, transport) = manager_with_mock();
    let bridge = LifecycleBridge::new(Arc::clone(&manager));

    bridge.on_identity_change(Some(StaffId::random()));
    (transport.sink(0).on_status)(ChannelStatus::Subscribed);

    // Backgrounded, then the OS silently killed the socket
    bridge.on_app_background();
    (transport.sink(0).on_status)(ChannelStatus::Closed);
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);

    bridge.on_app_foreground();
    assert_eq!(transport.open_count(), 2);
    assert_eq!(manager.status(), ConnectionStatus::Connecting);

    // Foregrounding while connected does nothing
    (transport.sink(1).on_status)(ChannelStatus::Subscribed);
    bridge.on_app_background();
    bridge.on_app_foreground();
    assert_eq!(transport.open_count(), 2);
}

/// A foreground error state is left to the retry scheduler, not the bridge.
#[tokio::test(start_paused = true)]
async fn test_foreground_does_not_preempt_retry() {
    let (manager, transport) = manager_with_mock();
    let bridge = LifecycleBridge::new(Arc::clone(&manager));

    bridge.on_identity_change(Some(StaffId::random()));
    (transport.sink(0).on_status)(ChannelStatus::ChannelError(None));
    assert_eq!(manager.status(), ConnectionStatus::Error);

    bridge.on_app_background();
    bridge.on_app_foreground();
    assert_eq!(transport.open_count(), 1);

    // The scheduled retry still recovers
    tokio::time::sleep(Duration::from_millis(1001)).await;
    assert_eq!(transport.open_count(), 2);
}

// =============================================================================
// SCENARIO: Logout
// =============================================================================

/// Identity loss disconnects, destroys registrations, and stays quiet.
#[tokio::test(start_paused = true)]
async fn test_logout_tears_everything_down() {
    let (manager, transport) = manager_with_mock();
    let bridge = LifecycleBridge::new(Arc::clone(&manager));
    let staff = StaffId::random();

    let delivered = Arc::new(AtomicUsize::new(0));
    {
        let delivered = Arc::clone(&delivered);
        manager.subscribe(
            Topic::ShiftAssignments,
            Arc::new(move |_| {
                delivered.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    bridge.on_identity_change(Some(staff.clone()));
    let sink = transport.sink(0);
    (sink.on_status)(ChannelStatus::Subscribed);

    bridge.on_identity_change(None);
    assert!(transport.is_closed(0));
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);

    // No stale delivery, no reconnect, ever
    (sink.on_event)(assignment_insert_for(&staff));
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(delivered.load(Ordering::SeqCst), 0);
    assert_eq!(transport.open_count(), 1);
}
