//! Weekly summary briefing, generated on a fixed weekday and time
//! independently of the polling cadence.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveTime, TimeDelta, Utc, Weekday};
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::models::{Queue, QueueName};
use crate::status_log::{StatusEntry, StatusLog};
use crate::vault::{self, Vault};
use crate::{AppError, Result};

const LOOKBACK_DAYS: i64 = 7;

/// A weekday and UTC wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklySchedule {
    /// Day of the week.
    pub weekday: Weekday,
    /// Time of day.
    pub time: NaiveTime,
}

impl WeeklySchedule {
    /// Parse `sun` / `Sunday` and `HH:MM`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an unknown weekday or malformed time.
    pub fn parse(weekday: &str, time: &str) -> Result<Self> {
        let weekday = weekday
            .trim()
            .parse::<Weekday>()
            .map_err(|_| AppError::Config(format!("invalid summary weekday '{weekday}'")))?;
        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
            .map_err(|err| AppError::Config(format!("invalid summary time '{time}': {err}")))?;
        Ok(Self { weekday, time })
    }

    /// First scheduled instant strictly after `now`.
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();
        let ahead = (7 + i64::from(self.weekday.num_days_from_monday())
            - i64::from(today.weekday().num_days_from_monday()))
            % 7;
        let candidate = (today + TimeDelta::days(ahead)).and_time(self.time).and_utc();
        if candidate > now {
            candidate
        } else {
            candidate + TimeDelta::days(7)
        }
    }
}

/// Write `Briefings/<date>_Weekly_Summary.md` for the week ending `now`.
///
/// # Errors
///
/// Returns `AppError::Vault` if a queue cannot be listed and
/// `AppError::Io` if the briefing cannot be written.
pub fn write_summary(vault: &Vault, now: DateTime<Utc>) -> Result<PathBuf> {
    let counts = vault.counts()?;
    let count = |name: QueueName| counts.get(&name).copied().unwrap_or_default();
    let since = now - TimeDelta::days(LOOKBACK_DAYS);

    let mut completed = Vec::new();
    for path in vault.list(&Queue::Done)? {
        let modified = DateTime::<Utc>::from(vault::modified_at(&path)?);
        if modified >= since {
            if let Some(name) = path.file_name() {
                completed.push(format!(
                    "- {} ({})",
                    name.to_string_lossy(),
                    modified.format("%Y-%m-%d")
                ));
            }
        }
    }

    let mut doc = format!(
        "---\ntype: weekly_summary\ncreated: {}\nperiod_start: {}\nperiod_end: {}\n---\n\n# Weekly Summary\n\n## Queue Status\n",
        now.to_rfc3339(),
        since.format("%Y-%m-%d"),
        now.format("%Y-%m-%d")
    );
    for (label, name) in [
        ("Inbox", QueueName::Inbox),
        ("Needs action", QueueName::NeedsAction),
        ("Pending approval", QueueName::PendingApproval),
        ("Approved", QueueName::Approved),
        ("In progress", QueueName::InProgress),
        ("Done", QueueName::Done),
        ("Rejected", QueueName::Rejected),
    ] {
        doc.push_str(&format!("- {label}: {}\n", count(name)));
    }
    doc.push_str(&format!(
        "\n## Completed in the Last {LOOKBACK_DAYS} Days ({})\n",
        completed.len()
    ));
    if completed.is_empty() {
        doc.push_str("- None\n");
    } else {
        for line in &completed {
            doc.push_str(line);
            doc.push('\n');
        }
    }

    let dir = vault.briefings_dir();
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}_Weekly_Summary.md", now.format("%Y-%m-%d")));
    let mut tmp = NamedTempFile::new_in(&dir)
        .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
    tmp.write_all(doc.as_bytes())
        .map_err(|err| AppError::Io(format!("failed to write summary: {err}")))?;
    tmp.persist(&path)
        .map_err(|err| AppError::Io(format!("failed to persist {}: {err}", path.display())))?;
    info!(path = %path.display(), completed = completed.len(), "weekly summary written");
    Ok(path)
}

/// Spawn the weekly summary background task.
///
/// Sleeps until the next scheduled instant, writes the briefing, records a
/// status row, and repeats until `cancel` fires.
#[must_use]
pub fn spawn_summary_task(
    vault: Vault,
    schedule: WeeklySchedule,
    status_log: Arc<dyn StatusLog>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = schedule.next_after(now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next = %next, "next weekly summary scheduled");
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("summary task shutting down");
                    break;
                }
                () = tokio::time::sleep(wait) => {
                    match write_summary(&vault, Utc::now()) {
                        Ok(path) => {
                            let entry = StatusEntry::success("generated weekly summary")
                                .with_detail(path.display().to_string());
                            if let Err(err) = status_log.append(&entry) {
                                error!(?err, "status log append failed");
                            }
                        }
                        Err(err) => error!(?err, "weekly summary failed"),
                    }
                }
            }
        }
    })
}
