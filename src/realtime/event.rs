//! # Change Events
//!
//! The payload contract: the exact shape of a change notification, defined
//! once so decoding is mechanical and total. A payload that violates the
//! before/after invariant is rejected here and never reaches a callback.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{RealtimeError, RealtimeResult};

/// Type of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// New row inserted
    Insert,
    /// Existing row updated
    Update,
    /// Row deleted
    Delete,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Insert => write!(f, "INSERT"),
            EventType::Update => write!(f, "UPDATE"),
            EventType::Delete => write!(f, "DELETE"),
        }
    }
}

/// Raw change notification as the transport delivers it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowChange {
    /// Source table
    pub table: String,

    /// Change type
    pub event_type: EventType,

    /// New row state (for INSERT/UPDATE)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,

    /// Old row state (for UPDATE/DELETE)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
}

impl RowChange {
    /// The row state to evaluate predicates against.
    ///
    /// New state when present, otherwise the old state (deletes carry only
    /// the old row).
    pub fn row(&self) -> Option<&Value> {
        self.new.as_ref().or(self.old.as_ref())
    }
}

/// A decoded change notification with before/after snapshots.
///
/// Invariant: INSERT implies `before` is None and `after` is Some; DELETE
/// implies `after` is None and `before` is Some; UPDATE implies both Some.
/// The two states are the last-known snapshots, not one transaction.
#[derive(Debug, Clone)]
pub struct ChangeEvent<T> {
    /// Change type
    pub event_type: EventType,

    /// Row state before the change
    pub before: Option<T>,

    /// Row state after the change
    pub after: Option<T>,

    /// When this client received the notification
    pub received_at: DateTime<Utc>,
}

impl ChangeEvent<Value> {
    /// Decode a raw change, enforcing the before/after invariant.
    ///
    /// Returns an error for any shape the contract forbids; the caller drops
    /// and logs the event without delivering it.
    pub fn decode(change: &RowChange) -> RealtimeResult<Self> {
        match change.event_type {
            EventType::Insert => {
                if change.new.is_none() {
                    return Err(RealtimeError::MalformedPayload(
                        "INSERT without new row state".to_string(),
                    ));
                }
            }
            EventType::Update => {
                if change.new.is_none() || change.old.is_none() {
                    return Err(RealtimeError::MalformedPayload(
                        "UPDATE without both row states".to_string(),
                    ));
                }
            }
            EventType::Delete => {
                if change.old.is_none() {
                    return Err(RealtimeError::MalformedPayload(
                        "DELETE without old row state".to_string(),
                    ));
                }
            }
        }

        let (before, after) = match change.event_type {
            EventType::Insert => (None, change.new.clone()),
            EventType::Update => (change.old.clone(), change.new.clone()),
            EventType::Delete => (change.old.clone(), None),
        };

        Ok(Self {
            event_type: change.event_type,
            before,
            after,
            received_at: Utc::now(),
        })
    }

    /// Decode both row states into a typed contract
    pub fn into_typed<T: DeserializeOwned>(self, table: &str) -> RealtimeResult<ChangeEvent<T>> {
        let decode = |value: Value| -> RealtimeResult<T> {
            serde_json::from_value(value).map_err(|e| RealtimeError::RowDecode {
                table: table.to_string(),
                detail: e.to_string(),
            })
        };

        Ok(ChangeEvent {
            event_type: self.event_type,
            before: self.before.map(decode).transpose()?,
            after: self.after.map(decode).transpose()?,
            received_at: self.received_at,
        })
    }
}
