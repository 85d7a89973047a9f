//! Human-readable status log of lifecycle activity.
//!
//! Any agent process may append, and appends are an unsynchronized
//! read-modify-write of one shared document: two concurrent appends can
//! lose one row. The log is an audit convenience; the queue directories
//! remain the source of truth for task state.

pub mod markdown;

use chrono::{DateTime, Utc};

pub use markdown::MarkdownStatusLog;

/// Outcome column of a status row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusResult {
    /// The action completed.
    Success,
    /// The action failed; the row's detail says why.
    Failure,
}

impl StatusResult {
    /// Label written to the log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "error",
        }
    }
}

/// One row of the status log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// When the action happened.
    pub timestamp: DateTime<Utc>,
    /// What happened, e.g. `approved draft_email_x.md`.
    pub action: String,
    /// Success or failure.
    pub result: StatusResult,
    /// Failure reason or execution result.
    pub detail: Option<String>,
}

impl StatusEntry {
    /// A successful action stamped now.
    #[must_use]
    pub fn success(action: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.into(),
            result: StatusResult::Success,
            detail: None,
        }
    }

    /// A failed action stamped now.
    #[must_use]
    pub fn failure(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.into(),
            result: StatusResult::Failure,
            detail: Some(reason.into()),
        }
    }

    /// Attach a detail string.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Append-only sink for [`StatusEntry`] rows.
pub trait StatusLog: Send + Sync {
    /// Append one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or written. Callers
    /// treat this as non-fatal.
    fn append(&self, entry: &StatusEntry) -> crate::Result<()>;
}
