//! # Realtime Subscription Core
//!
//! One logical live-update channel per signed-in staff member, demultiplexed
//! into topics and fanned out to independent consumer callbacks, with
//! transparent backoff-based reconnection.
//!
//! ## Architecture
//!
//! - **Payload contract** (`event`, `rows`): the shape of a change
//!   notification and each topic's typed row
//! - **Topics** (`topic`): named change categories sharing the channel
//! - **Callback registry** (`registry`): per-topic fan-out with snapshot
//!   dispatch and panic isolation
//! - **Retry** (`retry`): capped exponential backoff, one pending timer
//! - **Connection** (`connection`): the state machine owning the channel
//! - **Lifecycle** (`lifecycle`): identity and foreground/background signals
//! - **Transport** (`transport`, `websocket`): the push-transport seam and
//!   its WebSocket implementation

pub mod config;
pub mod connection;
pub mod errors;
pub mod event;
pub mod identity;
pub mod lifecycle;
pub mod registry;
pub mod retry;
pub mod rows;
pub mod topic;
pub mod transport;
pub mod websocket;

pub use config::RealtimeConfig;
pub use connection::{ConnectionManager, ConnectionStatus};
pub use errors::{RealtimeError, RealtimeResult};
pub use event::{ChangeEvent, EventType, RowChange};
pub use identity::StaffId;
pub use lifecycle::LifecycleBridge;
pub use registry::{CallbackRegistry, DispatchOutcome, SubscriptionHandle};
pub use retry::{RetryPolicy, RetryScheduler};
pub use rows::{AttendanceRecord, RecurringShift, ShiftAssignment, SwapRequest};
pub use topic::{EventFilter, Predicate, Topic, TopicFilter, WireFilter};
pub use transport::{ChannelHandle, ChannelSink, ChannelStatus, RealtimeTransport};
pub use websocket::{WebSocketConfig, WebSocketTransport};
