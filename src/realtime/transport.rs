//! # Transport Seam
//!
//! The push-transport primitive is an external collaborator; the core
//! depends only on this trait. A transport opens one physical channel with
//! an ordered list of topic filters and reports back through the sink: row
//! changes on the event callback, channel health on the status callback.
//! `open_channel` must not block; completion is signalled asynchronously via
//! `ChannelStatus`.

use std::sync::Arc;

use super::errors::RealtimeResult;
use super::event::RowChange;
use super::topic::TopicFilter;

/// Channel health as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Every registered filter is active; the channel is live
    Subscribed,
    /// The channel failed, with an optional transport-level detail
    ChannelError(Option<String>),
    /// The subscribe attempt did not complete in time
    TimedOut,
    /// The channel closed cleanly
    Closed,
}

impl ChannelStatus {
    /// Stable name for log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Subscribed => "subscribed",
            ChannelStatus::ChannelError(_) => "channel_error",
            ChannelStatus::TimedOut => "timed_out",
            ChannelStatus::Closed => "closed",
        }
    }
}

/// Callbacks wired into an open channel
#[derive(Clone)]
pub struct ChannelSink {
    /// Invoked for every row change matching any registered filter
    pub on_event: Arc<dyn Fn(RowChange) + Send + Sync>,
    /// Invoked on every channel status transition
    pub on_status: Arc<dyn Fn(ChannelStatus) + Send + Sync>,
}

/// Handle to one open physical channel
pub trait ChannelHandle: Send + Sync {
    /// Release the channel. Idempotent; no status callback obligations after
    /// close returns.
    fn close(&self);
}

/// The push-transport primitive
pub trait RealtimeTransport: Send + Sync {
    /// Open one physical channel carrying all given filters.
    ///
    /// Returns immediately; subscription success or failure arrives on the
    /// sink's status callback.
    fn open_channel(
        &self,
        name: &str,
        filters: &[TopicFilter],
        sink: ChannelSink,
    ) -> RealtimeResult<Box<dyn ChannelHandle>>;
}
