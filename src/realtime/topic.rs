//! # Topics
//!
//! A topic is one named category of change sharing the single physical
//! channel. Each topic maps to a server-side filter of the shape
//! (table, event types, predicate) scoped to the current staff identity,
//! and the same filter matches incoming rows locally so the channel can be
//! demultiplexed back into topics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::{EventType, RowChange};
use super::identity::StaffId;

/// Logical categories of change the client cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Shift assignments for the signed-in staff member
    ShiftAssignments,
    /// Swap requests addressed to them
    IncomingSwapRequests,
    /// Swap requests they created
    OutgoingSwapRequests,
    /// Their attendance records
    Attendance,
    /// Their recurring weekly patterns
    RecurringShifts,
}

impl Topic {
    /// All topics, in the order their filters are registered on the channel
    pub const ALL: [Topic; 5] = [
        Topic::ShiftAssignments,
        Topic::IncomingSwapRequests,
        Topic::OutgoingSwapRequests,
        Topic::Attendance,
        Topic::RecurringShifts,
    ];

    /// Stable name (log fields, diagnostics)
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ShiftAssignments => "shift_assignments",
            Topic::IncomingSwapRequests => "incoming_swap_requests",
            Topic::OutgoingSwapRequests => "outgoing_swap_requests",
            Topic::Attendance => "attendance",
            Topic::RecurringShifts => "recurring_shifts",
        }
    }

    /// Source table this topic watches
    pub fn table(&self) -> &'static str {
        match self {
            Topic::ShiftAssignments => "shift_assignments",
            Topic::IncomingSwapRequests | Topic::OutgoingSwapRequests => "swap_requests",
            Topic::Attendance => "attendance_records",
            Topic::RecurringShifts => "recurring_shifts",
        }
    }

    /// Server-side filter for this topic, scoped to one staff member
    pub fn filter(&self, staff: &StaffId) -> TopicFilter {
        let column = match self {
            Topic::IncomingSwapRequests => "recipient_staff_id",
            Topic::OutgoingSwapRequests => "requesting_staff_id",
            _ => "staff_id",
        };

        TopicFilter {
            table: self.table(),
            events: EventFilter::All,
            predicate: Predicate::eq(column, Value::String(staff.to_string())),
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which change types a filter accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Inserts, updates and deletes
    All,
    /// Exactly one change type
    Only(EventType),
}

impl EventFilter {
    /// Check a change type against this filter
    pub fn matches(&self, event_type: EventType) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(t) => *t == event_type,
        }
    }

    /// Wire representation understood by the server
    pub fn to_wire(&self) -> String {
        match self {
            EventFilter::All => "*".to_string(),
            EventFilter::Only(t) => t.to_string(),
        }
    }
}

/// Column equality predicate applied to the row state
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: &'static str,
    pub value: Value,
}

impl Predicate {
    /// Equality predicate on one column
    pub fn eq(column: &'static str, value: Value) -> Self {
        Self { column, value }
    }

    /// Evaluate against the change's row state (new, falling back to old)
    pub fn matches(&self, change: &RowChange) -> bool {
        let Some(row) = change.row() else {
            return false;
        };
        row.get(self.column) == Some(&self.value)
    }

    /// Wire representation, `column=eq.value`
    pub fn to_wire(&self) -> String {
        let value = match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        format!("{}=eq.{}", self.column, value)
    }
}

/// One topic's filter as registered on the physical channel
#[derive(Debug, Clone, PartialEq)]
pub struct TopicFilter {
    pub table: &'static str,
    pub events: EventFilter,
    pub predicate: Predicate,
}

impl TopicFilter {
    /// Local match: does this change belong to the topic?
    pub fn matches(&self, change: &RowChange) -> bool {
        change.table == self.table
            && self.events.matches(change.event_type)
            && self.predicate.matches(change)
    }

    /// Serializable form sent in the channel join request
    pub fn to_wire(&self) -> WireFilter {
        WireFilter {
            table: self.table.to_string(),
            event: self.events.to_wire(),
            filter: self.predicate.to_wire(),
        }
    }
}

/// Filter tuple as it travels in the subscribe request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFilter {
    pub table: String,
    pub event: String,
    pub filter: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change_for(table: &str, event_type: EventType, row: Value) -> RowChange {
        let (new, old) = match event_type {
            EventType::Insert => (Some(row), None),
            EventType::Update => (Some(row.clone()), Some(row)),
            EventType::Delete => (None, Some(row)),
        };
        RowChange {
            table: table.to_string(),
            event_type,
            new,
            old,
        }
    }

    #[test]
    fn test_swap_topics_share_a_table() {
        assert_eq!(Topic::IncomingSwapRequests.table(), "swap_requests");
        assert_eq!(Topic::OutgoingSwapRequests.table(), "swap_requests");
        assert_ne!(
            Topic::IncomingSwapRequests.as_str(),
            Topic::OutgoingSwapRequests.as_str()
        );
    }

    #[test]
    fn test_filter_scopes_to_identity() {
        let me = StaffId::random();
        let filter = Topic::ShiftAssignments.filter(&me);

        let mine = change_for(
            "shift_assignments",
            EventType::Insert,
            json!({"staff_id": me.to_string()}),
        );
        let theirs = change_for(
            "shift_assignments",
            EventType::Insert,
            json!({"staff_id": StaffId::random().to_string()}),
        );

        assert!(filter.matches(&mine));
        assert!(!filter.matches(&theirs));
    }

    #[test]
    fn test_incoming_and_outgoing_demux_by_column() {
        let me = StaffId::random();
        let other = StaffId::random();

        let addressed_to_me = change_for(
            "swap_requests",
            EventType::Insert,
            json!({
                "recipient_staff_id": me.to_string(),
                "requesting_staff_id": other.to_string(),
            }),
        );

        assert!(Topic::IncomingSwapRequests.filter(&me).matches(&addressed_to_me));
        assert!(!Topic::OutgoingSwapRequests.filter(&me).matches(&addressed_to_me));
    }

    #[test]
    fn test_delete_matches_against_old_row() {
        let me = StaffId::random();
        let filter = Topic::Attendance.filter(&me);

        let change = change_for(
            "attendance_records",
            EventType::Delete,
            json!({"staff_id": me.to_string()}),
        );
        assert!(filter.matches(&change));
    }

    #[test]
    fn test_wrong_table_never_matches() {
        let me = StaffId::random();
        let filter = Topic::RecurringShifts.filter(&me);

        let change = change_for(
            "shift_assignments",
            EventType::Insert,
            json!({"staff_id": me.to_string()}),
        );
        assert!(!filter.matches(&change));
    }

    #[test]
    fn test_event_filter_only() {
        let only_inserts = EventFilter::Only(EventType::Insert);
        assert!(only_inserts.matches(EventType::Insert));
        assert!(!only_inserts.matches(EventType::Delete));
        assert_eq!(only_inserts.to_wire(), "INSERT");
        assert_eq!(EventFilter::All.to_wire(), "*");
    }

    #[test]
    fn test_wire_filter_shape() {
        let me = StaffId::random();
        let wire = Topic::OutgoingSwapRequests.filter(&me).to_wire();

        assert_eq!(wire.table, "swap_requests");
        assert_eq!(wire.event, "*");
        assert_eq!(wire.filter, format!("requesting_staff_id=eq.{}", me));
    }
}
