//! Per-agent JSONL audit files under `Logs/`, one file per UTC day.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use tracing::{debug, warn};

use super::{AuditEntry, AuditLogger};
use crate::models::AgentId;
use crate::{AppError, Result};

/// The file currently receiving entries.
struct DayFile {
    day: NaiveDate,
    out: BufWriter<File>,
}

/// Audit logger for a single agent.
///
/// Entries go to `<logs>/audit-<agent>-<YYYY-MM-DD>.jsonl`. No other agent
/// writes that file, so appends never interleave across processes.
pub struct JsonlAuditWriter {
    logs: PathBuf,
    agent: AgentId,
    open: Mutex<Option<DayFile>>,
}

impl JsonlAuditWriter {
    /// Writer for `agent` under `logs`, creating the folder if needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if `logs` cannot be created.
    pub fn new(logs: PathBuf, agent: AgentId) -> Result<Self> {
        fs::create_dir_all(&logs).map_err(|err| {
            AppError::Io(format!("cannot create {}: {err}", logs.display()))
        })?;
        Ok(Self {
            logs,
            agent,
            open: Mutex::new(None),
        })
    }

    /// Name of `agent`'s audit file for `day`.
    #[must_use]
    pub fn file_name_for(agent: &AgentId, day: NaiveDate) -> String {
        format!("audit-{agent}-{day}.jsonl")
    }

    fn open_day(&self, day: NaiveDate) -> Result<DayFile> {
        let path = self.logs.join(Self::file_name_for(&self.agent, day));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| AppError::Io(format!("cannot open {}: {err}", path.display())))?;
        debug!(path = %path.display(), "audit file opened");
        Ok(DayFile {
            day,
            out: BufWriter::new(file),
        })
    }
}

impl AuditLogger for JsonlAuditWriter {
    fn log_entry(&self, entry: AuditEntry) -> Result<()> {
        let line = serde_json::to_string(&entry)?;
        let today = Utc::now().date_naive();

        let mut open = self
            .open
            .lock()
            .map_err(|_| AppError::Io("audit writer lock poisoned".into()))?;
        let current = match open.take() {
            Some(file) if file.day == today => file,
            _ => self.open_day(today)?,
        };
        let file = open.insert(current);

        writeln!(file.out, "{line}")
            .and_then(|()| file.out.flush())
            .map_err(|err| {
                warn!(agent = %self.agent, %err, "audit append failed");
                AppError::Io(format!("audit append failed: {err}"))
            })
    }
}
