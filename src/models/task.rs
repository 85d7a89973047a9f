//! Task record model: front matter, typed envelope, and file codec.
//!
//! A task file is a `---` fenced block of `key: value` lines followed by a
//! free-text markdown body:
//!
//! ```text
//! ---
//! type: email_draft
//! created: 2026-01-15T10:30:00+00:00
//! status: pending_approval
//! recipient: ops@example.com
//! ---
//!
//! # Email Draft
//! ```
//!
//! Keys keep their original order so that rewriting a record only touches
//! the fields that actually changed.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{AppError, Result};

const FENCE: &str = "---";

/// Ordered `key: value` metadata header of a task record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    entries: Vec<(String, String)>,
}

impl FrontMatter {
    /// Empty header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Look up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace an existing value in place or append a new key.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = single_line(&value.into());
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key.to_owned(), value));
        }
    }

    /// Remove a key, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Iterate entries in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the header has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ").trim().to_owned()
}

/// Status label stored in the `status` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Submitted through the API or CLI.
    New,
    /// Produced by a watcher, not yet triaged.
    Pending,
    /// Claimed by an agent.
    InProgress,
    /// Draft waiting for a decision.
    PendingApproval,
    /// Draft approved for execution.
    Approved,
    /// Executed successfully.
    Done,
    /// Denied or failed.
    Rejected,
    /// Any label this version does not know.
    Other(String),
}

impl TaskStatus {
    /// Parse a status label; unknown labels are preserved.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "new" => Self::New,
            "pending" => Self::Pending,
            "in_progress" => Self::InProgress,
            "pending_approval" => Self::PendingApproval,
            "approved" => Self::Approved,
            "done" => Self::Done,
            "rejected" => Self::Rejected,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Label as written to the file.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "new",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Done => "done",
            Self::Rejected => "rejected",
            Self::Other(label) => label,
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Whenever convenient.
    Low,
    /// Default.
    Normal,
    /// Watcher default for dropped files.
    Medium,
    /// Ahead of normal work.
    High,
    /// Immediately.
    Urgent,
}

impl Priority {
    /// Parse a priority label, falling back to `Normal`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "urgent" => Self::Urgent,
            _ => Self::Normal,
        }
    }

    /// Label as written to the file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

/// Typed view over the task `type` key and its type-specific fields.
///
/// Unknown types stay representable so that newer producers do not break
/// older agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Free-form work item.
    General {
        /// Optional `title` key.
        title: Option<String>,
    },
    /// Outgoing email awaiting approval.
    EmailDraft {
        /// `recipient` key.
        recipient: String,
        /// `subject` key.
        subject: String,
    },
    /// Social media post awaiting approval.
    SocialPost {
        /// `platform` key (e.g. `linkedin`).
        platform: String,
    },
    /// File dropped into the watched folder.
    FileDrop {
        /// `original_name` key.
        original_name: String,
        /// `size` key in bytes.
        size: Option<u64>,
    },
    /// A `type` this version does not understand.
    Unknown {
        /// Raw `type` value.
        type_name: String,
    },
}

impl TaskKind {
    /// The `type` label for this kind.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::General { .. } => "task",
            Self::EmailDraft { .. } => "email_draft",
            Self::SocialPost { .. } => "social_post",
            Self::FileDrop { .. } => "file_drop",
            Self::Unknown { type_name } => type_name,
        }
    }

    /// Third-party system an approved task of this kind acts upon.
    #[must_use]
    pub fn default_target(&self) -> Option<&str> {
        match self {
            Self::EmailDraft { .. } => Some("email"),
            Self::SocialPost { platform } => Some(platform.as_str()),
            Self::General { .. } | Self::FileDrop { .. } | Self::Unknown { .. } => None,
        }
    }
}

/// One unit of work: a file name plus its parsed contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    /// Unique file name; the task identity across all queues.
    pub filename: String,
    /// Metadata header.
    pub front_matter: FrontMatter,
    /// Markdown body, preserved verbatim.
    pub body: String,
}

impl TaskRecord {
    /// Build a record from parts.
    #[must_use]
    pub fn new(filename: impl Into<String>, front_matter: FrontMatter, body: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            front_matter,
            body: body.into(),
        }
    }

    /// Parse file contents.
    ///
    /// # Errors
    ///
    /// Returns `AppError::TaskFormat` if the header fence is missing or
    /// unterminated, or a header line is not `key: value`.
    pub fn parse(filename: impl Into<String>, text: &str) -> Result<Self> {
        let filename = filename.into();
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut lines = text.split_inclusive('\n');
        let first = lines.next().unwrap_or_default();
        if first.trim_end() != FENCE {
            return Err(AppError::TaskFormat(format!(
                "{filename}: missing front matter fence"
            )));
        }

        let mut offset = first.len();
        let mut front_matter = FrontMatter::new();
        let mut closed = false;
        for line in lines {
            offset += line.len();
            let trimmed = line.trim_end();
            if trimmed == FENCE {
                closed = true;
                break;
            }
            if trimmed.trim().is_empty() || trimmed.trim_start().starts_with('#') {
                continue;
            }
            let (key, value) = trimmed.split_once(':').ok_or_else(|| {
                AppError::TaskFormat(format!("{filename}: malformed header line '{trimmed}'"))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(AppError::TaskFormat(format!(
                    "{filename}: empty header key"
                )));
            }
            front_matter.set(key, value.trim());
        }

        if !closed {
            return Err(AppError::TaskFormat(format!(
                "{filename}: unterminated front matter"
            )));
        }

        let body = text.get(offset..).unwrap_or_default().to_owned();
        Ok(Self {
            filename,
            front_matter,
            body,
        })
    }

    /// Serialize back to file contents.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 256);
        out.push_str(FENCE);
        out.push('\n');
        for (key, value) in self.front_matter.iter() {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out.push_str(FENCE);
        out.push('\n');
        out.push_str(&self.body);
        out
    }

    /// File name without its extension.
    #[must_use]
    pub fn stem(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map_or(self.filename.as_str(), |(stem, _)| stem)
    }

    /// Current status label, if any.
    #[must_use]
    pub fn status(&self) -> Option<TaskStatus> {
        self.front_matter.get("status").map(TaskStatus::parse)
    }

    /// Overwrite the status label.
    pub fn set_status(&mut self, status: &TaskStatus) {
        self.front_matter.set("status", status.as_str());
    }

    /// Priority, defaulting to `Normal`.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.front_matter
            .get("priority")
            .map_or(Priority::Normal, Priority::parse)
    }

    /// Creation timestamp from the `created` key.
    ///
    /// Accepts RFC 3339 and naive ISO timestamps (treated as UTC).
    #[must_use]
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.front_matter.get("created").and_then(parse_timestamp)
    }

    /// Typed view of the record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::TaskFormat` when a known type lacks one of its
    /// required keys.
    pub fn kind(&self) -> Result<TaskKind> {
        let fm = &self.front_matter;
        let type_name = fm.get("type").unwrap_or("task");
        let require = |key: &str| {
            fm.get(key).map(str::to_owned).ok_or_else(|| {
                AppError::TaskFormat(format!(
                    "{}: type '{type_name}' requires '{key}'",
                    self.filename
                ))
            })
        };

        let kind = match type_name {
            "task" | "general" => TaskKind::General {
                title: fm.get("title").map(str::to_owned),
            },
            "email_draft" | "email" => TaskKind::EmailDraft {
                recipient: require("recipient")?,
                subject: fm.get("subject").unwrap_or_default().to_owned(),
            },
            "social_post" => TaskKind::SocialPost {
                platform: require("platform")?,
            },
            "file_drop" => TaskKind::FileDrop {
                original_name: require("original_name")?,
                size: fm.get("size").and_then(|s| s.parse().ok()),
            },
            other => TaskKind::Unknown {
                type_name: other.to_owned(),
            },
        };
        Ok(kind)
    }

    /// Third-party system this task acts upon: the `target` key, or the
    /// default for its kind.
    #[must_use]
    pub fn target_system(&self) -> Option<String> {
        if let Some(target) = self.front_matter.get("target") {
            return Some(target.to_owned());
        }
        self.kind()
            .ok()
            .and_then(|kind| kind.default_target().map(str::to_owned))
    }

    /// Append a `## heading` section with the given lines to the body.
    pub fn append_section(&mut self, heading: &str, lines: &[String]) {
        if !self.body.is_empty() && !self.body.ends_with('\n') {
            self.body.push('\n');
        }
        self.body.push_str("\n## ");
        self.body.push_str(heading);
        self.body.push('\n');
        for line in lines {
            self.body.push_str(line);
            self.body.push('\n');
        }
    }
}

/// Parse an RFC 3339 or naive ISO-8601 timestamp.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
