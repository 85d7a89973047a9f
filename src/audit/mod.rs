//! Structured audit trail of lifecycle transitions.
//!
//! Provides the [`AuditLogger`] trait and associated types. The primary
//! implementation, [`JsonlAuditWriter`], appends JSONL records to
//! daily-rotating per-agent files in the vault's `Logs/` folder, so every
//! file has exactly one writer process.

pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type classification for audit log entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// `Inbox → Needs_Action`.
    Promoted,
    /// Task moved into this agent's claim area.
    Claimed,
    /// Claim attempt lost the race.
    ClaimLost,
    /// Draft moved into `Pending_Approval`.
    DraftSubmitted,
    /// Draft written directly into `Pending_Approval`.
    DraftCreated,
    /// `Pending_Approval → Approved`.
    Approved,
    /// Approval denied; task rejected.
    Denied,
    /// Approved action executed; task done.
    Executed,
    /// Processing or execution failed; task rejected.
    Failed,
    /// Stale claim returned to a shared queue.
    Reclaimed,
    /// Malformed task skipped.
    Skipped,
}

/// A structured record of one lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp with timezone.
    pub timestamp: DateTime<Utc>,
    /// Agent that performed the action.
    pub agent_id: Option<String>,
    /// Event classification.
    pub event_type: AuditEventType,
    /// Task file name.
    pub filename: Option<String>,
    /// Source location.
    pub from_queue: Option<String>,
    /// Destination location.
    pub to_queue: Option<String>,
    /// Brief result description.
    pub result_summary: Option<String>,
    /// Failure or denial reason.
    pub reason: Option<String>,
    /// Identifier of the orchestrator process run.
    pub run_id: Option<String>,
}

impl AuditEntry {
    /// Construct a minimal audit entry for the given event type.
    #[must_use]
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            timestamp: Utc::now(),
            agent_id: None,
            event_type,
            filename: None,
            from_queue: None,
            to_queue: None,
            result_summary: None,
            reason: None,
            run_id: None,
        }
    }

    /// Set the acting agent.
    #[must_use]
    pub fn with_agent(mut self, agent_id: String) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Set the task file name.
    #[must_use]
    pub fn with_filename(mut self, filename: String) -> Self {
        self.filename = Some(filename);
        self
    }

    /// Set source and destination locations.
    #[must_use]
    pub fn with_move(mut self, from: String, to: String) -> Self {
        self.from_queue = Some(from);
        self.to_queue = Some(to);
        self
    }

    /// Set the result summary for this entry.
    #[must_use]
    pub fn with_result(mut self, summary: String) -> Self {
        self.result_summary = Some(summary);
        self
    }

    /// Set the failure reason for this entry.
    #[must_use]
    pub fn with_reason(mut self, reason: String) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Set the run identifier for this entry.
    #[must_use]
    pub fn with_run_id(mut self, run_id: String) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

/// Writes structured audit entries to a persistent store.
///
/// Implementations must be [`Send`] and [`Sync`] to allow sharing across
/// async task boundaries via [`std::sync::Arc`].
pub trait AuditLogger: Send + Sync {
    /// Record a single audit entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn log_entry(&self, entry: AuditEntry) -> crate::Result<()>;
}

pub use writer::JsonlAuditWriter;
