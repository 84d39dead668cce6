//! Event Logger - persists session events to JSONL files
//!
//! The EventLogger is attached to a session's bus and writes every event to
//! `<sessions-dir>/<session-id>/events.jsonl` for history, debugging and replay.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eyre::Context;
use tracing::{debug, warn};

use super::bus::{EventBus, EventListener};
use super::types::{Event, EventKind, EventLogEntry};

/// Name of the per-session log file
pub const EVENTS_FILE: &str = "events.jsonl";

/// Event logger for one session
pub struct EventLogger {
    session_id: String,
    log_path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl EventLogger {
    /// Open (or append to) the log for `session_id` under `sessions_dir`
    pub fn open(sessions_dir: impl AsRef<Path>, session_id: impl Into<String>) -> eyre::Result<Self> {
        let session_id = session_id.into();
        let session_dir = sessions_dir.as_ref().join(&session_id);
        fs::create_dir_all(&session_dir)
            .with_context(|| format!("Failed to create session dir {}", session_dir.display()))?;

        let log_path = session_dir.join(EVENTS_FILE);
        debug!(?log_path, "EventLogger::open: opening log file");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open {}", log_path.display()))?;

        Ok(Self {
            session_id,
            log_path,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    /// Open a logger and attach it to every event kind on `bus`
    pub fn attach(bus: &EventBus, sessions_dir: impl AsRef<Path>, session_id: &str) -> eyre::Result<Arc<Self>> {
        let logger = Arc::new(Self::open(sessions_dir, session_id)?);
        bus.on_many(&EventKind::ALL, logger.clone());
        Ok(logger)
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Write an event as one JSON line
    pub fn write_event(&self, event: &Event) -> eyre::Result<()> {
        debug!(session_id = %self.session_id, kind = %event.kind(), "EventLogger::write_event");
        let mut guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let Some(writer) = guard.as_mut() else {
            return Err(eyre::eyre!("event log for {} is closed", self.session_id));
        };

        let entry = EventLogEntry::new(&self.session_id, event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        Ok(())
    }

    /// Flush and release the file handle
    pub fn close(&self) {
        debug!(session_id = %self.session_id, "EventLogger::close");
        if let Some(mut writer) = self.writer.lock().unwrap_or_else(|p| p.into_inner()).take() {
            let _ = writer.flush();
        }
    }
}

#[async_trait]
impl EventListener for EventLogger {
    async fn on_event(&self, event: &Event) -> eyre::Result<()> {
        self.write_event(event)
    }
}

/// Read events from a session's log file
pub fn read_session_events(sessions_dir: impl AsRef<Path>, session_id: &str) -> eyre::Result<Vec<EventLogEntry>> {
    let log_path = sessions_dir.as_ref().join(session_id).join(EVENTS_FILE);
    debug!(?log_path, "read_session_events: reading log file");

    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_session_events: failed to parse line");
            }
        }
    }

    debug!(count = entries.len(), "read_session_events: loaded entries");
    Ok(entries)
}
