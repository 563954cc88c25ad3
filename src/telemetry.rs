//! Error-reporting sinks receiving structured failure records.
//!
//! A [`TelemetrySink`] is told about every tool invocation that exited with a
//! nonzero status, before the error is handed back to the caller. Sinks must
//! never fail: whatever goes wrong inside a sink is logged and swallowed.
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, warn};

use crate::command::lock;
use crate::error::CommandError;
use crate::output::Output;

/// Structured record of a failed invocation.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Tool name
    pub command: String,
    /// Process exit code
    pub exit_code: i32,
    /// Output captured before the failure, byte for byte
    #[serde(serialize_with = "as_text")]
    pub command_output: Output,
}

fn as_text<S: Serializer>(output: &Output, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&output.to_string_lossy())
}

impl FailureRecord {
    /// Build the record for `err`, or `None` if `err` is not a process failure.
    pub fn from_error(err: &CommandError) -> Option<Self> {
        match err {
            CommandError::Failed {
                command,
                exit_code,
                output,
            } => Some(FailureRecord {
                command: command.clone(),
                exit_code: *exit_code,
                command_output: output.clone(),
            }),
            _ => None,
        }
    }
}

/// External collaborator receiving failure records.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySink: Send + Sync {
    /// Record one failed invocation.
    fn record_failure(&self, record: &FailureRecord);
}

/// Sink emitting failures as `tracing` error events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record_failure(&self, record: &FailureRecord) {
        error!(
            command = %record.command,
            exit_code = record.exit_code,
            command_output = %record.command_output,
            "Command failed"
        );
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    record: &'a FailureRecord,
}

/// Sink appending one JSON object per failure to a file.
#[derive(Debug)]
pub struct JsonFileSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileSink {
    /// Create a sink writing to `path`. The file is created on first failure.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, record: &FailureRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(&JsonLine {
            recorded_at: Utc::now(),
            record,
        })?;
        let _guard = lock(&self.lock);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

impl TelemetrySink for JsonFileSink {
    fn record_failure(&self, record: &FailureRecord) {
        if let Err(e) = self.append(record) {
            warn!("Unable to write failure record to {:?}: {:#}", self.path, e);
        }
    }
}
