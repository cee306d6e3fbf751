//! Per-handle diagnostic sink.
//!
//! Every [`Store`](crate::Store) carries its own sink so several handles can
//! log independently. Messages are diagnostic only and never drive control flow.

use std::fmt;

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Tracing detail.
    Debug,
    /// Something degraded but the operation continues.
    Warning,
    /// An operation failed.
    Error,
    /// The handle should be treated as unusable by its caller.
    Fatal,
}

/// Destination for diagnostics emitted by a store.
pub trait LogSink: Send + Sync {
    /// Record one message.
    fn log(&self, severity: Severity, args: fmt::Arguments<'_>);
}

/// Forwards to the `log` facade under the `tdb_io` target.
///
/// `Fatal` has no `log` level of its own; it is emitted at `Error` with a
/// `FATAL:` prefix.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn log(&self, severity: Severity, args: fmt::Arguments<'_>) {
        match severity {
            Severity::Debug => log::debug!(target: "tdb_io", "{args}"),
            Severity::Warning => log::warn!(target: "tdb_io", "{args}"),
            Severity::Error => log::error!(target: "tdb_io", "{args}"),
            Severity::Fatal => log::error!(target: "tdb_io", "FATAL: {args}"),
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _severity: Severity, _args: fmt::Arguments<'_>) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Captures messages so tests can assert on severities.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) entries: Mutex<Vec<(Severity, String)>>,
    }

    impl RecordingSink {
        pub(crate) fn count(&self, severity: Severity) -> usize {
            self.entries.lock().iter().filter(|(s, _)| *s == severity).count()
        }

        pub(crate) fn last(&self) -> Option<(Severity, String)> {
            self.entries.lock().last().cloned()
        }
    }

    impl LogSink for RecordingSink {
        fn log(&self, severity: Severity, args: fmt::Arguments<'_>) {
            self.entries.lock().push((severity, args.to_string()));
        }
    }
}
