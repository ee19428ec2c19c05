//! # Connection Manager
//!
//! Owns the single physical channel for the signed-in staff member and
//! drives the connection state machine:
//!
//! ```text
//! disconnected -> connecting -> connected
//!       ^             |  ^         |
//!       |             v  |         v
//!       +---------- error <--------+
//! ```
//!
//! Incoming pushes are decoded against the payload contract, demultiplexed
//! into topics, and fanned out through the callback registry. Channel errors
//! and subscribe timeouts arm the retry scheduler; a successful subscribe
//! resets it. Every opened channel is tagged with an epoch so callbacks from
//! a torn-down channel can never touch current state.

use std::sync::{Arc, Mutex, Weak};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::observability::Logger;

use super::config::RealtimeConfig;
use super::event::{ChangeEvent, RowChange};
use super::identity::StaffId;
use super::registry::{CallbackRegistry, SubscriptionHandle, TopicCallback};
use super::retry::RetryScheduler;
use super::rows::{AttendanceRecord, RecurringShift, ShiftAssignment, SwapRequest};
use super::topic::Topic;
use super::transport::{ChannelHandle, ChannelSink, ChannelStatus, RealtimeTransport};

/// Logical connection state, scoped to the current identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No channel exists and none is wanted
    Disconnected,
    /// A channel open was requested; subscribe confirmation pending
    Connecting,
    /// All topic filters are live
    Connected,
    /// The channel failed; a reconnect is scheduled
    Error,
}

impl ConnectionStatus {
    /// Stable name for log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct ConnState {
    status: ConnectionStatus,
    identity: Option<StaffId>,
    channel: Option<Box<dyn ChannelHandle>>,
    /// Incremented on every channel open and every teardown; callbacks carry
    /// the epoch of the channel that produced them and are ignored when it
    /// no longer matches.
    epoch: u64,
}

/// Owns the single live channel and its state machine
pub struct ConnectionManager {
    config: RealtimeConfig,
    transport: Arc<dyn RealtimeTransport>,
    registry: Arc<CallbackRegistry>,
    retry: RetryScheduler,
    state: Mutex<ConnState>,
    weak_self: Weak<ConnectionManager>,
}

impl ConnectionManager {
    /// Create a manager. One instance per identity lifetime; all consumers
    /// share it by handle.
    pub fn new(config: RealtimeConfig, transport: Arc<dyn RealtimeTransport>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            retry: RetryScheduler::new(config.retry_policy()),
            config,
            transport,
            registry: CallbackRegistry::new(),
            state: Mutex::new(ConnState {
                status: ConnectionStatus::Disconnected,
                identity: None,
                channel: None,
                epoch: 0,
            }),
            weak_self: weak.clone(),
        })
    }

    /// Current logical connection state
    pub fn status(&self) -> ConnectionStatus {
        self.state
            .lock()
            .map(|s| s.status)
            .unwrap_or(ConnectionStatus::Disconnected)
    }

    /// Whether all topic filters are currently live
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Identity the channel is (or would be) scoped to
    pub fn identity(&self) -> Option<StaffId> {
        self.state.lock().ok().and_then(|s| s.identity.clone())
    }

    /// Failed attempts since the last successful connect
    pub fn retry_attempts(&self) -> u32 {
        self.retry.attempts()
    }

    /// Open the channel for the given identity.
    ///
    /// No-op while already connecting or connected for the same identity.
    /// For a different identity the old channel is torn down first; callback
    /// registrations survive the swap.
    pub fn connect_as(&self, staff: StaffId) {
        let (epoch, old_channel, name, filters) = {
            let Ok(mut st) = self.state.lock() else {
                return;
            };

            let same_identity = st.identity.as_ref() == Some(&staff);
            if same_identity
                && matches!(
                    st.status,
                    ConnectionStatus::Connecting | ConnectionStatus::Connected
                )
            {
                return;
            }

            let old_channel = st.channel.take();
            st.identity = Some(staff.clone());
            st.epoch += 1;
            st.status = ConnectionStatus::Connecting;

            let filters: Vec<_> = Topic::ALL.iter().map(|t| t.filter(&staff)).collect();
            (st.epoch, old_channel, self.config.channel_name(&staff), filters)
        };

        // A pending retry belongs to the superseded channel
        self.retry.cancel();
        if let Some(channel) = old_channel {
            channel.close();
        }

        Logger::info("REALTIME_CONNECTING", &[("channel", &name)]);

        match self.transport.open_channel(&name, &filters, self.sink(epoch)) {
            Ok(handle) => {
                let mut stale = Some(handle);
                if let Ok(mut st) = self.state.lock() {
                    // The sink may already have reported an error, or a newer
                    // connect may have superseded this one; only a channel
                    // that is still wanted gets stored.
                    let wanted = st.epoch == epoch
                        && matches!(
                            st.status,
                            ConnectionStatus::Connecting | ConnectionStatus::Connected
                        );
                    if wanted {
                        st.channel = stale.take();
                    }
                }
                if let Some(handle) = stale {
                    handle.close();
                }
            }
            Err(err) => {
                Logger::error(
                    "REALTIME_OPEN_FAILED",
                    &[("channel", &name), ("reason", &err.to_string())],
                );
                let mut arm_retry = false;
                if let Ok(mut st) = self.state.lock() {
                    if st.epoch == epoch {
                        st.status = ConnectionStatus::Error;
                        arm_retry = true;
                    }
                }
                if arm_retry {
                    self.schedule_retry();
                }
            }
        }
    }

    /// Reconnect using the current identity.
    ///
    /// Precondition failure (no identity) is a logged no-op, never an error.
    pub fn connect(&self) {
        match self.identity() {
            Some(staff) => self.connect_as(staff),
            None => Logger::warn("REALTIME_CONNECT_WITHOUT_IDENTITY", &[]),
        }
    }

    /// Tear down the channel and forget the identity (logout).
    ///
    /// Cancels any pending reconnect synchronously: no retry scheduled
    /// before this call will fire after it returns.
    pub fn disconnect(&self) {
        self.retry.cancel();

        let channel = match self.state.lock() {
            Ok(mut st) => {
                st.identity = None;
                st.status = ConnectionStatus::Disconnected;
                st.epoch += 1;
                st.channel.take()
            }
            Err(_) => None,
        };

        if let Some(channel) = channel {
            channel.close();
        }
        Logger::info("REALTIME_DISCONNECTED", &[]);
    }

    /// Full teardown on identity loss: disconnect and drop every callback
    /// registration.
    pub fn reset(&self) {
        self.disconnect();
        self.registry.clear();
    }

    // --- Consumer surface ---

    /// Register a raw callback for one topic
    pub fn subscribe(&self, topic: Topic, callback: TopicCallback) -> SubscriptionHandle {
        self.registry.subscribe(topic, callback)
    }

    /// Shift assignments for the signed-in staff member
    pub fn subscribe_to_shift_changes<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(ChangeEvent<ShiftAssignment>) + Send + Sync + 'static,
    {
        self.subscribe_typed(Topic::ShiftAssignments, callback)
    }

    /// Swap requests addressed to them
    pub fn subscribe_to_incoming_swap_requests<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(ChangeEvent<SwapRequest>) + Send + Sync + 'static,
    {
        self.subscribe_typed(Topic::IncomingSwapRequests, callback)
    }

    /// Swap requests they created
    pub fn subscribe_to_outgoing_swap_requests<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(ChangeEvent<SwapRequest>) + Send + Sync + 'static,
    {
        self.subscribe_typed(Topic::OutgoingSwapRequests, callback)
    }

    /// Their attendance records
    pub fn subscribe_to_attendance<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(ChangeEvent<AttendanceRecord>) + Send + Sync + 'static,
    {
        self.subscribe_typed(Topic::Attendance, callback)
    }

    /// Their recurring weekly patterns
    pub fn subscribe_to_recurring_shifts<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(ChangeEvent<RecurringShift>) + Send + Sync + 'static,
    {
        self.subscribe_typed(Topic::RecurringShifts, callback)
    }

    fn subscribe_typed<T, F>(&self, topic: Topic, callback: F) -> SubscriptionHandle
    where
        T: DeserializeOwned,
        F: Fn(ChangeEvent<T>) + Send + Sync + 'static,
    {
        let table = topic.table();
        self.registry.subscribe(
            topic,
            Arc::new(move |event: &ChangeEvent<Value>| {
                match event.clone().into_typed::<T>(table) {
                    Ok(typed) => callback(typed),
                    Err(err) => Logger::warn(
                        "REALTIME_ROW_DECODE_FAILED",
                        &[("table", table), ("reason", &err.to_string())],
                    ),
                }
            }),
        )
    }

    // --- Channel callbacks ---

    fn sink(&self, epoch: u64) -> ChannelSink {
        let on_event = {
            let weak = self.weak_self.clone();
            Arc::new(move |change: RowChange| {
                if let Some(manager) = weak.upgrade() {
                    manager.handle_event(epoch, change);
                }
            })
        };
        let on_status = {
            let weak = self.weak_self.clone();
            Arc::new(move |status: ChannelStatus| {
                if let Some(manager) = weak.upgrade() {
                    manager.handle_status(epoch, status);
                }
            })
        };
        ChannelSink {
            on_event,
            on_status,
        }
    }

    fn handle_status(&self, epoch: u64, status: ChannelStatus) {
        let mut became_connected = false;
        let mut arm_retry = false;
        let mut dead_channel = None;

        {
            let Ok(mut st) = self.state.lock() else {
                return;
            };
            if st.epoch != epoch {
                Logger::debug(
                    "REALTIME_STALE_CHANNEL_STATUS",
                    &[("status", status.as_str())],
                );
                return;
            }

            match status {
                ChannelStatus::Subscribed => {
                    if st.status == ConnectionStatus::Connecting {
                        st.status = ConnectionStatus::Connected;
                        became_connected = true;
                    }
                }
                ChannelStatus::ChannelError(_) | ChannelStatus::TimedOut => {
                    st.status = ConnectionStatus::Error;
                    dead_channel = st.channel.take();
                    arm_retry = true;
                }
                ChannelStatus::Closed => {
                    // Clean close: back to disconnected, no automatic retry.
                    // Recovery happens through the lifecycle bridge.
                    st.status = ConnectionStatus::Disconnected;
                    dead_channel = st.channel.take();
                }
            }
        }

        match &status {
            ChannelStatus::Subscribed => {
                if became_connected {
                    self.retry.reset();
                    Logger::info("REALTIME_CONNECTED", &[]);
                }
            }
            ChannelStatus::ChannelError(detail) => Logger::warn(
                "REALTIME_CHANNEL_ERROR",
                &[("detail", detail.as_deref().unwrap_or("none"))],
            ),
            ChannelStatus::TimedOut => Logger::warn("REALTIME_CHANNEL_TIMEOUT", &[]),
            ChannelStatus::Closed => {
                self.retry.cancel();
                Logger::info("REALTIME_CHANNEL_CLOSED", &[]);
            }
        }

        if let Some(channel) = dead_channel {
            channel.close();
        }
        if arm_retry {
            self.schedule_retry();
        }
    }

    fn handle_event(&self, epoch: u64, change: RowChange) {
        let staff = {
            let Ok(st) = self.state.lock() else {
                return;
            };
            if st.epoch != epoch {
                Logger::debug("REALTIME_STALE_CHANNEL_EVENT", &[("table", &change.table)]);
                return;
            }
            match &st.identity {
                Some(staff) => staff.clone(),
                None => return,
            }
        };

        let event = match ChangeEvent::decode(&change) {
            Ok(event) => event,
            Err(err) => {
                Logger::warn(
                    "REALTIME_PAYLOAD_DROPPED",
                    &[("table", &change.table), ("reason", &err.to_string())],
                );
                return;
            }
        };

        for topic in Topic::ALL {
            if topic.filter(&staff).matches(&change) {
                self.registry.dispatch(topic, &event);
            }
        }
    }

    fn schedule_retry(&self) {
        let weak = self.weak_self.clone();
        self.retry.schedule(move || {
            if let Some(manager) = weak.upgrade() {
                // disconnect() may have won the race with the timer
                if manager.status() == ConnectionStatus::Error {
                    manager.connect();
                }
            }
        });
    }
}
