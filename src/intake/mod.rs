//! Task intake: everything that creates new records in `Inbox`.
//!
//! Producers never write into any other queue, and never overwrite: a name
//! that is already taken anywhere in the vault gets a numeric suffix
//! (submissions) or is treated as already ingested (external identifiers).

pub mod drop_folder;

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info};

use crate::models::{FrontMatter, Priority, Queue, TaskRecord, TaskStatus};
use crate::vault::Vault;
use crate::{AppError, Result};

pub use drop_folder::DropFolderWatcher;

const MAX_TITLE_CHARS: usize = 100;
pub(crate) const MAX_SUFFIX_ATTEMPTS: u32 = 100;

/// A new task request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSubmission {
    /// Human title; also drives the file name.
    pub title: String,
    /// Free-text description.
    pub content: Option<String>,
    /// Urgency.
    pub priority: Priority,
    /// Who submitted it, e.g. `ctl` or an agent id.
    pub source: String,
}

impl TaskSubmission {
    /// Submission with normal priority and no content.
    #[must_use]
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: None,
            priority: Priority::Normal,
            source: source.into(),
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Reduce a title to file-name-safe characters.
///
/// Keeps alphanumerics, `-`, `_` and spaces, then turns spaces into `_`.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ' '))
        .collect();
    kept.trim().replace(' ', "_")
}

/// File name for a task derived from an external message identifier.
#[must_use]
pub fn external_task_filename(prefix: &str, external_id: &str) -> String {
    let id: String = external_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{id}.md", sanitize_title(prefix))
}

/// Write a new task into `Inbox` named `YYYYMMDD_HHMMSS_<Title>.md`.
///
/// # Errors
///
/// Returns `AppError::Conflict` if no free name is found, or
/// `AppError::Io`/`AppError::Vault` on filesystem failure.
pub fn submit_task(vault: &Vault, submission: &TaskSubmission, now: DateTime<Utc>) -> Result<PathBuf> {
    let mut title = sanitize_title(&submission.title);
    if title.is_empty() {
        title = "untitled_task".into();
    }
    let title: String = title.chars().take(MAX_TITLE_CHARS).collect();
    let base = format!("{}_{title}", now.format("%Y%m%d_%H%M%S"));

    let front_matter = FrontMatter::new()
        .with("title", submission.title.as_str())
        .with("created", now.to_rfc3339_opts(SecondsFormat::Secs, false))
        .with("source", submission.source.as_str())
        .with("status", TaskStatus::New.as_str())
        .with("priority", submission.priority.as_str());
    let content = submission
        .content
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or("No description provided.");
    let body = format!("\n# {}\n\n{content}\n", submission.title);

    for attempt in 1..=MAX_SUFFIX_ATTEMPTS {
        let filename = suffixed_filename(&base, attempt);
        if !vault.locate(&filename)?.is_empty() {
            debug!(%filename, "name taken, trying next suffix");
            continue;
        }

        let mut record = TaskRecord::new(filename.clone(), front_matter.clone(), body.clone());
        record.append_section(
            "Task Details",
            &[
                format!("- **Submitted by**: {}", submission.source),
                format!("- **Priority**: {}", submission.priority.as_str()),
            ],
        );
        match vault.create_task(&Queue::Inbox, &record) {
            Ok(path) => {
                info!(%filename, "task submitted");
                return Ok(path);
            }
            Err(AppError::Conflict(_)) => continue,
            Err(err) => return Err(err),
        }
    }

    Err(AppError::Conflict(format!(
        "no free file name for '{base}' after {MAX_SUFFIX_ATTEMPTS} attempts"
    )))
}

/// `<base>.md` for the first attempt, `<base>_<n>.md` after that.
pub(crate) fn suffixed_filename(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        format!("{base}.md")
    } else {
        format!("{base}_{attempt}.md")
    }
}

/// Write a task for an external identifier into `Inbox`, once.
///
/// Returns `None` when a task with the same identifier already exists in
/// any queue, so repeated polling of an external source is harmless.
///
/// # Errors
///
/// Returns `AppError::Io`/`AppError::Vault` on filesystem failure.
pub fn submit_external_task(
    vault: &Vault,
    prefix: &str,
    external_id: &str,
    submission: &TaskSubmission,
    now: DateTime<Utc>,
) -> Result<Option<PathBuf>> {
    let filename = external_task_filename(prefix, external_id);
    if !vault.locate(&filename)?.is_empty() {
        debug!(%filename, "external task already ingested");
        return Ok(None);
    }

    let front_matter = FrontMatter::new()
        .with("title", submission.title.as_str())
        .with("created", now.to_rfc3339_opts(SecondsFormat::Secs, false))
        .with("source", submission.source.as_str())
        .with("external_id", external_id)
        .with("status", TaskStatus::New.as_str())
        .with("priority", submission.priority.as_str());
    let content = submission
        .content
        .as_deref()
        .unwrap_or("No description provided.");
    let body = format!("\n# {}\n\n{content}\n", submission.title);
    let record = TaskRecord::new(filename.clone(), front_matter, body);

    match vault.create_task(&Queue::Inbox, &record) {
        Ok(path) => {
            info!(%filename, "external task submitted");
            Ok(Some(path))
        }
        Err(AppError::Conflict(_)) => Ok(None),
        Err(err) => Err(err),
    }
}
