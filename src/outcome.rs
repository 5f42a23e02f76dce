//! Append-only audit log of terminal outcomes.
//!
//! Each ack or reject appends one JSON line to `{status}.{YYYY-MM-DD}.log`
//! inside the queue directory. The log is advisory: by the time an entry is
//! written the message file is already gone, so a failed append is reported
//! to a [`DiagnosticSink`] and otherwise ignored.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::model::{MessageId, Status};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// One line of an outcome log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeEntry {
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    pub message_id: String,
    pub message_type: String,
    pub status: Status,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// A log append that did not make it to disk.
#[derive(Debug)]
pub struct LogWriteFailure<'a> {
    pub path: &'a Path,
    /// The serialized entry that was lost.
    pub entry: &'a str,
    pub error: &'a std::io::Error,
}

/// Side channel for failures that must not reach the caller.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, failure: &LogWriteFailure<'_>);
}

/// Reports through `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, failure: &LogWriteFailure<'_>) {
        tracing::error!(
            path = %failure.path.display(),
            entry = failure.entry,
            error = %failure.error,
            "could not write outcome log entry"
        );
    }
}

// ---------------------------------------------------------------------------
// Outcome Log
// ---------------------------------------------------------------------------

/// Writer (and reader) for the per-status, per-day outcome files.
pub struct OutcomeLog {
    directory: PathBuf,
    enabled: bool,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn DiagnosticSink>,
}

impl OutcomeLog {
    pub fn new(
        directory: impl Into<PathBuf>,
        enabled: bool,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            directory: directory.into(),
            enabled,
            clock,
            sink,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Path of the log file for `status` on `date`.
    pub fn path_for(&self, status: Status, date: NaiveDate) -> PathBuf {
        self.directory
            .join(format!("{status}.{}.log", date.format(DATE_FORMAT)))
    }

    /// Append one entry. Never fails; see the module docs.
    pub fn record(&self, status: Status, id: &MessageId, message_type: &str) {
        if !self.enabled {
            return;
        }

        let now = self.clock.now();
        let entry = OutcomeEntry {
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            message_id: id.to_string(),
            message_type: message_type.to_string(),
            status,
        };
        let path = self.path_for(status, now.date_naive());

        let mut line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                // Only string fields; unreachable in practice.
                tracing::error!(error = %e, message_id = %id, "could not serialize outcome entry");
                return;
            }
        };
        line.push('\n');

        if let Err(error) = append(&path, &line) {
            self.sink.report(&LogWriteFailure {
                path: &path,
                entry: line.trim_end(),
                error: &error,
            });
        }
    }

    /// Read back all entries for `status` on `date`. A missing file is an
    /// empty day; unparseable lines are skipped.
    pub fn entries(&self, status: Status, date: NaiveDate) -> Result<Vec<OutcomeEntry>> {
        let path = self.path_for(status, date);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(Error::Read { path, source }),
        };

        let mut entries = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping malformed outcome entry"
                ),
            }
        }
        Ok(entries)
    }
}

fn append(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}
