//! The logging capability used to report the crate's own anomalies.
//!
//! The crate never decides *where* messages end up. It reports through a
//! [`LogSink`], and the default [`TracingSink`] forwards to `tracing`.

use std::fmt;

/// Severity of a message sent to a [`LogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Diagnostic detail
    Debug,
    /// Normal operation
    Info,
    /// Something unexpected but recoverable
    Warn,
    /// An operation failed
    Error,
    /// The host is unlikely to keep working correctly
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// A generic logging capability.
///
/// Implement this to route the crate's diagnostics into a host's own logger.
pub trait LogSink: Send + Sync {
    /// Emit a message with an optional error attached.
    fn log(&self, severity: Severity, message: &str, error: Option<&(dyn std::error::Error + 'static)>);

    /// Emit a debug message.
    fn debug(&self, message: &str) {
        self.log(Severity::Debug, message, None);
    }

    /// Emit an info message.
    fn info(&self, message: &str) {
        self.log(Severity::Info, message, None);
    }

    /// Emit a warning.
    fn warn(&self, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        self.log(Severity::Warn, message, error);
    }

    /// Emit an error.
    fn error(&self, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        self.log(Severity::Error, message, error);
    }

    /// Emit a fatal message.
    fn fatal(&self, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        self.log(Severity::Fatal, message, error);
    }
}

/// Default sink that forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, severity: Severity, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        let error = error.map(|e| e.to_string());
        match severity {
            Severity::Debug => tracing::debug!(target: "hotswap_verbosity", error, "{}", message),
            Severity::Info => tracing::info!(target: "hotswap_verbosity", error, "{}", message),
            Severity::Warn => tracing::warn!(target: "hotswap_verbosity", error, "{}", message),
            Severity::Error => tracing::error!(target: "hotswap_verbosity", error, "{}", message),
            Severity::Fatal => {
                tracing::error!(target: "hotswap_verbosity", fatal = true, error, "{}", message)
            }
        }
    }
}
