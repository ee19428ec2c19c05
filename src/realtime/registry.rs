//! # Callback Registry
//!
//! Per-topic fan-out of decoded change events to consumer callbacks.
//!
//! Dispatch iterates an immutable snapshot of the callback set, so a callback
//! may subscribe or unsubscribe (itself included) mid-dispatch without
//! corrupting iteration. A panicking callback is isolated, logged, and never
//! prevents the remaining callbacks from running.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;

use crate::observability::Logger;

use super::event::ChangeEvent;
use super::topic::Topic;

/// A consumer callback registered for one topic
pub type TopicCallback = Arc<dyn Fn(&ChangeEvent<Value>) + Send + Sync>;

/// Unique identifier for a registered callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Per-topic collections of interested callbacks
pub struct CallbackRegistry {
    /// Registration order matters: dispatch invokes callbacks in the order
    /// they subscribed.
    by_topic: RwLock<HashMap<Topic, Vec<(CallbackId, TopicCallback)>>>,
    next_id: AtomicU64,
    weak_self: Weak<CallbackRegistry>,
}

impl CallbackRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            by_topic: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            weak_self: weak.clone(),
        })
    }

    /// Register a callback for a topic.
    ///
    /// The registry holds a non-owning interest: dropping the returned handle
    /// does not unsubscribe, and calling `unsubscribe` removes the callback
    /// synchronously and completely.
    pub fn subscribe(&self, topic: Topic, callback: TopicCallback) -> SubscriptionHandle {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::SeqCst));

        if let Ok(mut topics) = self.by_topic.write() {
            topics.entry(topic).or_default().push((id, callback));
        }

        SubscriptionHandle {
            registry: self.weak_self.clone(),
            topic,
            id,
        }
    }

    /// Remove a callback. Safe to call for an id that is already gone.
    pub fn unsubscribe(&self, topic: Topic, id: CallbackId) {
        if let Ok(mut topics) = self.by_topic.write() {
            if let Some(callbacks) = topics.get_mut(&topic) {
                callbacks.retain(|(cb_id, _)| *cb_id != id);
            }
        }
    }

    /// Deliver one event to every callback currently registered for a topic.
    ///
    /// Callbacks run synchronously, in registration order, against a snapshot
    /// taken before the first invocation.
    pub fn dispatch(&self, topic: Topic, event: &ChangeEvent<Value>) -> DispatchOutcome {
        let snapshot: Vec<(CallbackId, TopicCallback)> = match self.by_topic.read() {
            Ok(topics) => topics.get(&topic).cloned().unwrap_or_default(),
            Err(_) => return DispatchOutcome::default(),
        };

        let mut outcome = DispatchOutcome::default();
        for (_, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => outcome.delivered += 1,
                Err(_) => {
                    outcome.panicked += 1;
                    Logger::error(
                        "REALTIME_CALLBACK_PANIC",
                        &[("topic", topic.as_str())],
                    );
                }
            }
        }
        outcome
    }

    /// Drop every registration (identity loss)
    pub fn clear(&self) {
        if let Ok(mut topics) = self.by_topic.write() {
            topics.clear();
        }
    }

    /// Number of callbacks registered for a topic
    pub fn topic_len(&self, topic: Topic) -> usize {
        self.by_topic
            .read()
            .map(|t| t.get(&topic).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total number of callbacks across all topics
    pub fn len(&self) -> usize {
        self.by_topic
            .read()
            .map(|t| t.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one dispatch call
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Callbacks that ran to completion
    pub delivered: usize,
    /// Callbacks that panicked and were isolated
    pub panicked: usize,
}

/// Disposer returned to the consumer.
///
/// `unsubscribe` is idempotent and safe to call from inside a callback while
/// a dispatch for the same topic is in flight.
pub struct SubscriptionHandle {
    registry: Weak<CallbackRegistry>,
    topic: Topic,
    id: CallbackId,
}

impl SubscriptionHandle {
    /// Remove the callback. After this returns, no dispatch that starts later
    /// will invoke it.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.topic, self.id);
        }
    }

    /// Topic this handle was registered on
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
