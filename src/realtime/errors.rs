//! # Real-Time Errors
//!
//! Error types for the realtime subscription core. Nothing in this module
//! crosses the crate's public boundary as a panic; failures either become
//! connection state or are logged and absorbed.

use thiserror::Error;

/// Result type for realtime operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Realtime errors
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    /// A change payload violated the before/after shape contract.
    /// The event is dropped; the channel is unaffected.
    #[error("Malformed change payload: {0}")]
    MalformedPayload(String),

    /// A row matched a topic but failed to decode into its typed contract
    #[error("Row decode failed for table '{table}': {detail}")]
    RowDecode { table: String, detail: String },

    /// The transport could not open a channel
    #[error("Transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RealtimeError::MalformedPayload("insert without new row".to_string());
        assert!(err.to_string().contains("insert without new row"));

        let err = RealtimeError::RowDecode {
            table: "shift_assignments".to_string(),
            detail: "missing field `id`".to_string(),
        };
        assert!(err.to_string().contains("shift_assignments"));
    }
}
