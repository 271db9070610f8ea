//! Structured event sink for server diagnostics
//!
//! The server reports lifecycle events (`accepted`, `closed`, `request`,
//! `response`, `timeout`, `parse_error`, `io_error`) through this interface
//! rather than writing anywhere itself. Attribute values are anything
//! displayable, so implementations can render them as text or feed them to a
//! structured backend.

use std::fmt::Display;

/// Sink for server events
///
/// Implementations must be cheap when disabled: every call site checks
/// `enabled()` before building the attribute list.
pub trait Logger: Send + Sync {
    /// Whether events should be delivered at all
    fn enabled(&self) -> bool;
    /// Deliver one event with its attributes
    fn log(&self, event: &str, attrs: &[(&str, &dyn Display)]);
}

/// Logger that discards everything
pub struct NopLogger;

impl Logger for NopLogger {
    fn enabled(&self) -> bool {
        false
    }
    fn log(&self, _event: &str, _attrs: &[(&str, &dyn Display)]) {}
}

/// Logger that forwards events to the `log` crate at debug level
///
/// This is the default sink. It emits nothing unless a `log` backend is
/// installed and debug output is enabled for this crate.
pub struct DebugLogger;

impl Logger for DebugLogger {
    fn enabled(&self) -> bool {
        log::log_enabled!(log::Level::Debug)
    }
    fn log(&self, event: &str, attrs: &[(&str, &dyn Display)]) {
        use std::fmt::Write;

        let mut line = String::with_capacity(64);
        line.push_str(event);
        for &(name, value) in attrs {
            let _ = write!(line, " {}={}", name, value);
        }
        log::debug!("{}", line);
    }
}
