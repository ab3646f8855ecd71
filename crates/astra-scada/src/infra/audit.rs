//! Audit trail for shutdown-relevant events.
//!
//! One JSON object per line: leak injections, emergency shutdowns, valve
//! closure, incident reports, operator commands and process start/stop.

use astra_core::TimeBase;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

/// Types of events that are logged in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// System startup
    SystemStart,
    /// System shutdown
    SystemShutdown,
    /// Leak started (operator command or scheduled)
    LeakInjected,
    /// Critical flow tripped the emergency latch
    EmergencyShutdown,
    /// Sequencer drove the valve to 0%
    ValveClosed,
    /// Completion service produced the incident report
    ReportGenerated,
    /// Local heuristic report used instead
    ReportFallback,
    /// Report arrived for a cycle that was already reset
    ReportDiscarded,
    /// Operator command refused in the current state
    CommandRejected,
    /// Operator reset to nominal
    SystemReset,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic timestamp in microseconds
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
}

/// Thread-safe audit logger that writes to a JSONL file
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Open `path` in append mode, creating parent directories.
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    pub fn log(&self, entry: AuditEntry) -> io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "audit writer poisoned"))?;
        serde_json::to_writer(&mut *writer, &entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    pub fn log_event(
        &self,
        timestamp_us: u64,
        unix_us: u64,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> io::Result<()> {
        self.log(AuditEntry {
            timestamp_us,
            unix_us,
            event_type,
            details,
        })
    }

    /// Stamp and write an event, warning instead of failing when the write
    /// does not go through. Returns whether the entry was written.
    pub fn record(
        &self,
        timebase: TimeBase,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> bool {
        match self.log_event(timebase.now_us(), timebase.unix_us(), event_type, details) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, ?event_type, "Failed to write audit entry");
                false
            }
        }
    }
}
