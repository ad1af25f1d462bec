//! Log records captured by a running context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a context log record.
///
/// Ordered from most to least verbose so that `level >= threshold` reads as
/// "at least as severe as".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TraceLevel::Trace => "TRACE",
            TraceLevel::Debug => "DEBUG",
            TraceLevel::Info => "INFO",
            TraceLevel::Warn => "WARN",
            TraceLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// A single message emitted through a context, keyed by scope depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Scope depth at the time of emission (the root scope is depth 1).
    pub depth: usize,
    pub level: TraceLevel,
    /// Message without the depth indentation.
    pub message: String,
    pub at: DateTime<Utc>,
}

impl LogRecord {
    /// Renders the record with two spaces of indentation per scope level.
    pub fn indented(&self) -> String {
        format!("{}{}", "  ".repeat(self.depth), self.message)
    }
}
