//! Identity of the staff member whose updates are streamed.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for the signed-in staff record.
///
/// Owned by the auth collaborator; the realtime core only reads it. Its
/// absence means no connection should exist, and a change of identity
/// invalidates any existing channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaffId(pub Uuid);

impl StaffId {
    /// Generate a fresh id (test fixtures, local development)
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for StaffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for StaffId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}
