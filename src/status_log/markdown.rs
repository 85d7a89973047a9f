//! Markdown dashboard writer.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;

use super::{StatusEntry, StatusLog};
use crate::{AppError, Result};

/// Header row that marks where new rows are inserted.
pub const ACTIVITY_MARKER: &str = "| Timestamp | Action | Result |";
const ACTIVITY_SEPARATOR: &str = "|-----------|--------|--------|";
const LAST_UPDATED_PREFIX: &str = "**Last Updated**:";

/// Status log stored as a markdown table in a dashboard document.
///
/// Newest rows go directly under the table header.
#[derive(Debug, Clone)]
pub struct MarkdownStatusLog {
    path: PathBuf,
}

impl MarkdownStatusLog {
    /// Log backed by the document at `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Document location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_or_default(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(default_document()),
            Err(err) => Err(AppError::Io(format!(
                "cannot read status log {}: {err}",
                self.path.display()
            ))),
        }
    }

    fn write(&self, content: &str) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            AppError::Io(format!("{} has no parent directory", self.path.display()))
        })?;
        let mut tmp = NamedTempFile::new_in(parent)
            .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
        tmp.write_all(content.as_bytes())
            .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;
        tmp.persist(&self.path).map_err(|err| {
            AppError::Io(format!(
                "failed to persist status log {}: {err}",
                self.path.display()
            ))
        })?;
        Ok(())
    }
}

impl StatusLog for MarkdownStatusLog {
    fn append(&self, entry: &StatusEntry) -> Result<()> {
        let current = self.read_or_default()?;
        let updated = insert_row(&current, entry);
        self.write(&updated)
    }
}

/// Skeleton used when the dashboard does not exist yet.
#[must_use]
pub fn default_document() -> String {
    format!(
        "# Agent Vault Dashboard\n\n{LAST_UPDATED_PREFIX} {}\n**Status**: Initialized\n\n---\n\n## Recent Activity\n\n{ACTIVITY_MARKER}\n{ACTIVITY_SEPARATOR}\n",
        Utc::now().format("%Y-%m-%d")
    )
}

/// Insert `entry` under the activity header and refresh the update date.
///
/// A document without the header gets a new activity table appended.
#[must_use]
pub fn insert_row(document: &str, entry: &StatusEntry) -> String {
    let row = render_row(entry);
    let today = entry.timestamp.format("%Y-%m-%d").to_string();

    let mut lines: Vec<String> = document
        .lines()
        .map(|line| {
            if line.starts_with(LAST_UPDATED_PREFIX) {
                format!("{LAST_UPDATED_PREFIX} {today}")
            } else {
                line.to_owned()
            }
        })
        .collect();

    match lines.iter().position(|line| line.contains(ACTIVITY_MARKER)) {
        Some(marker) => {
            let after_separator = lines
                .get(marker + 1)
                .is_some_and(|next| next.trim_start().starts_with("|-"));
            let at = if after_separator { marker + 2 } else { marker + 1 };
            lines.insert(at, row);
        }
        None => {
            lines.extend([
                String::new(),
                "## Recent Activity".to_owned(),
                String::new(),
                ACTIVITY_MARKER.to_owned(),
                ACTIVITY_SEPARATOR.to_owned(),
                row,
            ]);
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn render_row(entry: &StatusEntry) -> String {
    let result = match &entry.detail {
        Some(detail) => format!("{}: {}", entry.result.as_str(), cell(detail)),
        None => entry.result.as_str().to_owned(),
    };
    format!(
        "| {} | {} | {} |",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        cell(&entry.action),
        result
    )
}

fn cell(text: &str) -> String {
    text.replace(['\r', '\n'], " ").replace('|', "\\|")
}
