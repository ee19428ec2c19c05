//! Typed row contracts for the scheduling tables.
//!
//! Pure data shapes; one struct per table a topic watches. Decoding happens
//! through `ChangeEvent::into_typed`, so a schema drift shows up as a logged
//! decode failure rather than a panic in a consumer.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One concrete shift assigned to a staff member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftAssignment {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub shift_date: NaiveDate,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Role worked during the shift, if the rota distinguishes roles
    #[serde(default)]
    pub role: Option<String>,
    pub status: String,
}

/// A request to swap one assignment between two staff members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub requesting_staff_id: Uuid,
    pub recipient_staff_id: Uuid,
    /// pending | accepted | declined | cancelled
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Clock-in/clock-out record for one worked shift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub staff_id: Uuid,
    #[serde(default)]
    pub assignment_id: Option<Uuid>,
    pub clock_in: DateTime<Utc>,
    #[serde(default)]
    pub clock_out: Option<DateTime<Utc>>,
    pub status: String,
}

/// A repeating weekly shift pattern for a staff member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringShift {
    pub id: Uuid,
    pub staff_id: Uuid,
    /// 0 = Monday .. 6 = Sunday
    pub weekday: u8,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    pub effective_from: NaiveDate,
    #[serde(default)]
    pub effective_until: Option<NaiveDate>,
}
