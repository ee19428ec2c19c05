//! Observability for the realtime core
//!
//! Structured, synchronous JSON logging. Observability is read-only and must
//! never affect connection state; a logging failure is silently ignored.

mod logger;

pub use logger::{Logger, Severity};
