//! shiftwire - realtime subscription core for the staff scheduling client
//!
//! One logical live-update channel per signed-in staff member, fanned out to
//! many independent feature subscribers, with transparent reconnection.

pub mod observability;
pub mod realtime;
