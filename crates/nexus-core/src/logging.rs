//! Structured logging seam.
//!
//! The container and RPC subsystem never print and never install a subscriber; they emit
//! through an injected [`Logger`], mirroring the workspace-wide pattern of treating
//! observability as a capability the host supplies rather than a global the library owns.
//! A `tracing`-backed implementation is the expected default; [`NoopLogger`] exists for tests
//! and for hosts that genuinely want silence.

use std::borrow::Cow;

/// Severity of a single structured record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// A single `key = value` structured field attached to a [`LogRecord`].
pub type Field<'a> = (&'a str, Cow<'a, str>);

/// One structured log record.
///
/// Fields are borrowed for the duration of the [`Logger::log`] call; implementations that
/// need to retain a record past that call must copy what they need out of it.
pub struct LogRecord<'a> {
    pub message: &'a str,
    pub severity: LogSeverity,
    pub fields: &'a [Field<'a>],
}

/// The logging capability the container and RPC subsystem depend on.
pub trait Logger: Send + Sync + 'static {
    /// Submits a structured record. Implementations should not block the caller on I/O.
    fn log(&self, record: &LogRecord<'_>);

    fn info(&self, message: &str, fields: &[Field<'_>]) {
        self.log(&LogRecord { message, severity: LogSeverity::Info, fields });
    }

    fn warn(&self, message: &str, fields: &[Field<'_>]) {
        self.log(&LogRecord { message, severity: LogSeverity::Warn, fields });
    }

    fn error(&self, message: &str, fields: &[Field<'_>]) {
        self.log(&LogRecord { message, severity: LogSeverity::Error, fields });
    }

    fn debug(&self, message: &str, fields: &[Field<'_>]) {
        self.log(&LogRecord { message, severity: LogSeverity::Debug, fields });
    }
}

/// Forwards every record to the `tracing` facade at the matching level.
///
/// This is the logger a real host wires up; `tracing`'s own subscriber installation remains
/// entirely the host's responsibility.
#[derive(Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, record: &LogRecord<'_>) {
        match record.severity {
            LogSeverity::Trace => tracing::trace!(fields = ?record.fields, "{}", record.message),
            LogSeverity::Debug => tracing::debug!(fields = ?record.fields, "{}", record.message),
            LogSeverity::Info => tracing::info!(fields = ?record.fields, "{}", record.message),
            LogSeverity::Warn => tracing::warn!(fields = ?record.fields, "{}", record.message),
            LogSeverity::Error => tracing::error!(fields = ?record.fields, "{}", record.message),
        }
    }
}

/// Discards every record. Used as the default logger in unit tests that do not assert on
/// log output.
#[derive(Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _record: &LogRecord<'_>) {}
}
