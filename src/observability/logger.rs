//! Structured JSON logger
//!
//! One log line = one event. Writes are synchronous and unbuffered, field
//! ordering is deterministic (event, then severity, then fields sorted by
//! key), so log output can be asserted on byte-for-byte in tests.

use std::fmt;
use std::io::{self, Write};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Diagnostic detail (per-event traffic)
    Debug = 0,
    /// Normal lifecycle transitions
    Info = 1,
    /// Recoverable issues (dropped payloads, retries)
    Warn = 2,
    /// Operation failures
    Error = 3,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured logger emitting one JSON object per line
pub struct Logger;

impl Logger {
    /// Log an event with the given severity and fields
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity >= Severity::Error {
            Self::write_line(severity, event, fields, &mut io::stderr());
        } else {
            Self::write_line(severity, event, fields, &mut io::stdout());
        }
    }

    /// Log at DEBUG level
    pub fn debug(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Debug, event, fields);
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }

    fn write_line<W: Write>(
        severity: Severity,
        event: &str,
        fields: &[(&str, &str)],
        writer: &mut W,
    ) {
        let mut line = String::with_capacity(128);
        line.push_str("{\"event\":\"");
        escape_into(&mut line, event);
        line.push_str("\",\"severity\":\"");
        line.push_str(severity.as_str());
        line.push('"');

        let mut sorted: Vec<_> = fields.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);
        for (key, value) in sorted {
            line.push_str(",\"");
            escape_into(&mut line, key);
            line.push_str("\":\"");
            escape_into(&mut line, value);
            line.push('"');
        }

        line.push_str("}\n");

        // One write_all call so concurrent lines do not interleave
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }
}

/// Escape special characters for JSON string content
fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
fn capture(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut buffer = Vec::new();
    Logger::write_line(severity, event, fields, &mut buffer);
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
    }

    #[test]
    fn test_line_is_valid_json() {
        let output = capture(Severity::Info, "REALTIME_CONNECTED", &[("channel", "x")]);

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["event"], "REALTIME_CONNECTED");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["channel"], "x");
    }

    #[test]
    fn test_fields_sorted_deterministically() {
        let a = capture(Severity::Warn, "E", &[("b", "2"), ("a", "1")]);
        let b = capture(Severity::Warn, "E", &[("a", "1"), ("b", "2")]);
        assert_eq!(a, b);
        assert!(a.find("\"a\"").unwrap() < a.find("\"b\"").unwrap());
    }

    #[test]
    fn test_event_comes_first() {
        let output = capture(Severity::Info, "E", &[("aaa", "1")]);
        assert!(output.find("\"event\"").unwrap() < output.find("\"aaa\"").unwrap());
    }

    #[test]
    fn test_escapes_special_characters() {
        let output = capture(Severity::Info, "E", &[("msg", "a \"b\"\nc")]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["msg"], "a \"b\"\nc");
    }

    #[test]
    fn test_single_line_output() {
        let output = capture(Severity::Info, "E", &[("a", "1"), ("b", "2")]);
        assert_eq!(output.chars().filter(|c| *c == '\n').count(), 1);
        assert!(output.ends_with('\n'));
    }
}
