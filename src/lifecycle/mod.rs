//! Lifecycle service: every task movement an agent performs.
//!
//! Each operation authorizes against [`state_machine`] first, then performs
//! exactly one relocation through the configured [`ClaimStrategy`]. Metadata
//! edits (status label, appended sections, claim stamps) are only ever made
//! while the file sits in this agent's own `In_Progress/<id>` area, where no
//! other agent touches it, and they are best-effort: a failed edit is logged
//! and the physical move still happens.

pub mod state_machine;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, info_span, warn};

use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::intake::{self, sanitize_title};
use crate::models::{AgentIdentity, FrontMatter, Queue, QueueName, TaskRecord, TaskStatus};
use crate::status_log::{StatusEntry, StatusLog};
use crate::vault::claim::{ClaimStrategy, MoveOutcome};
use crate::vault::{self, Vault};
use crate::{AppError, Result};

use self::state_machine::TransitionKind;

/// Front-matter key naming the agent holding a claim.
pub const CLAIMED_BY_KEY: &str = "claimed_by";
/// Front-matter key recording when a claim was taken.
pub const CLAIMED_AT_KEY: &str = "claimed_at";
/// Front-matter key recording the queue a claim was taken from.
pub const CLAIMED_FROM_KEY: &str = "claimed_from";

/// Result of a lifecycle move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The task now lives at this path.
    Moved(PathBuf),
    /// Another agent moved the task first; nothing was changed.
    AlreadyClaimed,
}

impl TransitionOutcome {
    /// New location, if the move happened.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Moved(path) => Some(path),
            Self::AlreadyClaimed => None,
        }
    }

    /// Whether the move happened.
    #[must_use]
    pub fn is_moved(&self) -> bool {
        matches!(self, Self::Moved(_))
    }
}

impl From<MoveOutcome> for TransitionOutcome {
    fn from(outcome: MoveOutcome) -> Self {
        match outcome {
            MoveOutcome::Moved(path) => Self::Moved(path),
            MoveOutcome::Vanished => Self::AlreadyClaimed,
        }
    }
}

/// Input for [`Lifecycle::create_draft`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRequest {
    /// Email recipient.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
}

/// A stale claim returned to a shared queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimedTask {
    /// Task file name.
    pub filename: String,
    /// Claim area it was taken from.
    pub from: Queue,
    /// Shared queue it was returned to.
    pub to: Queue,
}

/// Lifecycle operations performed on behalf of one agent.
#[derive(Clone)]
pub struct Lifecycle {
    vault: Vault,
    identity: AgentIdentity,
    claims: Arc<dyn ClaimStrategy>,
    status_log: Arc<dyn StatusLog>,
    audit: Option<Arc<dyn AuditLogger>>,
    run_id: Option<String>,
}

impl Lifecycle {
    /// Lifecycle for `identity` over `vault`.
    #[must_use]
    pub fn new(
        vault: Vault,
        identity: AgentIdentity,
        claims: Arc<dyn ClaimStrategy>,
        status_log: Arc<dyn StatusLog>,
    ) -> Self {
        Self {
            vault,
            identity,
            claims,
            status_log,
            audit: None,
            run_id: None,
        }
    }

    /// Record every transition to `audit` as well.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Tag audit entries with a process run identifier.
    #[must_use]
    pub fn with_run_id(mut self, run_id: String) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// The vault this lifecycle operates on.
    #[must_use]
    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// The acting agent.
    #[must_use]
    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// This agent's claim area.
    #[must_use]
    pub fn own_area(&self) -> Queue {
        Queue::InProgress(self.identity.id.clone())
    }

    /// Path of `filename` inside this agent's claim area.
    ///
    /// # Errors
    ///
    /// Returns `AppError::TaskFormat` for an invalid file name.
    pub fn held_path(&self, filename: &str) -> Result<PathBuf> {
        self.vault.task_path(&self.own_area(), filename)
    }

    /// `Inbox → Needs_Action`. The record itself is not modified.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` if `Needs_Action` already holds the
    /// name, or `AppError::Io` on filesystem failure.
    pub fn promote(&self, filename: &str) -> Result<TransitionOutcome> {
        let span = info_span!("promote", agent = %self.identity.id, filename);
        let _guard = span.enter();

        let outcome = self.relocate(filename, &Queue::Inbox, &Queue::NeedsAction)?;
        if outcome.is_moved() {
            info!("task promoted");
            self.record(
                AuditEventType::Promoted,
                filename,
                &Queue::Inbox,
                &Queue::NeedsAction,
                None,
            );
            self.report(StatusEntry::success(format!("promoted {filename}")));
        }
        Ok(outcome)
    }

    /// Claim-by-move from `from` into this agent's claim area.
    ///
    /// Losing the race is [`TransitionOutcome::AlreadyClaimed`], not an
    /// error; callers must not retry the same file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` if the role may not claim from
    /// `from`, `AppError::Conflict` if the claim area already holds the
    /// name, or `AppError::Io` on filesystem failure.
    pub fn claim(&self, filename: &str, from: &Queue) -> Result<TransitionOutcome> {
        let span = info_span!("claim", agent = %self.identity.id, filename, from = %from);
        let _guard = span.enter();

        let own = self.own_area();
        let outcome = self.relocate(filename, from, &own)?;
        match &outcome {
            TransitionOutcome::Moved(path) => {
                info!("task claimed");
                let agent = self.identity.id.to_string();
                let origin = from.name().as_str();
                self.annotate(path, |record| {
                    record.front_matter.set(CLAIMED_BY_KEY, agent.as_str());
                    record.front_matter.set(CLAIMED_AT_KEY, now_rfc3339());
                    record.front_matter.set(CLAIMED_FROM_KEY, origin);
                });
                self.record(AuditEventType::Claimed, filename, from, &own, None);
            }
            TransitionOutcome::AlreadyClaimed => {
                debug!("claim lost to another agent");
                self.record(AuditEventType::ClaimLost, filename, from, &own, None);
            }
        }
        Ok(outcome)
    }

    /// Move a held draft into `Pending_Approval`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` if the role cannot draft,
    /// `AppError::Conflict` on a name collision, or `AppError::Io`.
    pub fn submit_draft(&self, filename: &str) -> Result<TransitionOutcome> {
        let span = info_span!("submit_draft", agent = %self.identity.id, filename);
        let _guard = span.enter();

        let own = self.own_area();
        state_machine::authorize(&self.identity, &own, &Queue::PendingApproval)?;
        self.annotate(&self.held_path(filename)?, |record| {
            release_claim(record);
            record.set_status(&TaskStatus::PendingApproval);
        });

        let outcome = self.relocate(filename, &own, &Queue::PendingApproval)?;
        if outcome.is_moved() {
            info!("draft submitted for approval");
            self.record(
                AuditEventType::DraftSubmitted,
                filename,
                &own,
                &Queue::PendingApproval,
                None,
            );
            self.report(StatusEntry::success(format!("drafted {filename}")));
        }
        Ok(outcome)
    }

    /// Write a new email draft straight into `Pending_Approval`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` if the role cannot draft,
    /// `AppError::Conflict` if no free name is found, or `AppError::Io` on
    /// write failure. A taken name gets a numeric suffix.
    pub fn create_draft(&self, request: &DraftRequest) -> Result<PathBuf> {
        let span = info_span!("create_draft", agent = %self.identity.id);
        let _guard = span.enter();

        state_machine::authorize(
            &self.identity,
            &Queue::NeedsAction,
            &Queue::PendingApproval,
        )?;

        let now = Utc::now();
        let base = draft_stem(&request.recipient, now);
        for attempt in 1..=intake::MAX_SUFFIX_ATTEMPTS {
            let filename = intake::suffixed_filename(&base, attempt);
            if !self.vault.locate(&filename)?.is_empty() {
                debug!(%filename, "draft name taken, trying next suffix");
                continue;
            }
            let record = draft_record(&self.identity, request, filename.clone(), now);
            match self.vault.create_task(&Queue::PendingApproval, &record) {
                Ok(path) => {
                    info!(%filename, "draft created");
                    let audit = AuditEntry::new(AuditEventType::DraftCreated)
                        .with_filename(filename.clone())
                        .with_result(format!("to {}", request.recipient));
                    self.write_audit(audit);
                    self.report(StatusEntry::success(format!(
                        "drafted email {filename} for {}",
                        request.recipient
                    )));
                    return Ok(path);
                }
                Err(AppError::Conflict(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(AppError::Conflict(format!(
            "no free draft name for '{base}' after {} attempts",
            intake::MAX_SUFFIX_ATTEMPTS
        )))
    }

    /// Approve a pending draft: `Pending_Approval → Approved`.
    ///
    /// The draft passes through this agent's claim area so the approval
    /// annotation is written to a file nobody else can move.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` for draft-only agents (the task is
    /// left untouched), `AppError::Conflict` on a name collision, or
    /// `AppError::Io`.
    pub fn approve(&self, filename: &str) -> Result<TransitionOutcome> {
        let span = info_span!("approve", agent = %self.identity.id, filename);
        let _guard = span.enter();

        state_machine::authorize(&self.identity, &Queue::PendingApproval, &Queue::Approved)?;
        let own = self.own_area();
        let held = match self.relocate(filename, &Queue::PendingApproval, &own)? {
            TransitionOutcome::Moved(path) => path,
            TransitionOutcome::AlreadyClaimed => return Ok(TransitionOutcome::AlreadyClaimed),
        };

        let agent = self.identity.id.to_string();
        self.annotate(&held, |record| {
            record.set_status(&TaskStatus::Approved);
            record.append_section(
                &format!("Approved by {agent}"),
                &[format!("Approved at: {}", now_rfc3339())],
            );
        });

        let outcome = self.relocate(filename, &own, &Queue::Approved)?;
        if outcome.is_moved() {
            info!("draft approved");
            self.record(
                AuditEventType::Approved,
                filename,
                &Queue::PendingApproval,
                &Queue::Approved,
                None,
            );
            self.report(StatusEntry::success(format!("approved {filename}")));
        }
        Ok(outcome)
    }

    /// Deny a pending draft: `Pending_Approval → Rejected`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` for draft-only agents,
    /// `AppError::Conflict` on a name collision, or `AppError::Io`.
    pub fn deny(&self, filename: &str, reason: &str) -> Result<TransitionOutcome> {
        let span = info_span!("deny", agent = %self.identity.id, filename);
        let _guard = span.enter();

        let own = self.own_area();
        state_machine::authorize(&self.identity, &Queue::PendingApproval, &own)?;
        let held = match self.relocate(filename, &Queue::PendingApproval, &own)? {
            TransitionOutcome::Moved(path) => path,
            TransitionOutcome::AlreadyClaimed => return Ok(TransitionOutcome::AlreadyClaimed),
        };

        self.annotate(&held, |record| self.mark_rejected(record, reason));
        let outcome = self.relocate(filename, &own, &Queue::Rejected)?;
        if outcome.is_moved() {
            info!(reason, "draft denied");
            self.record(
                AuditEventType::Denied,
                filename,
                &Queue::PendingApproval,
                &Queue::Rejected,
                Some(reason),
            );
            self.report(StatusEntry::failure(format!("denied {filename}"), reason));
        }
        Ok(outcome)
    }

    /// Finish a held task after successful execution: `→ Done`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` unless the role may execute,
    /// `AppError::Conflict` on a name collision, or `AppError::Io`.
    pub fn complete(&self, filename: &str, result: &str) -> Result<TransitionOutcome> {
        let span = info_span!("complete", agent = %self.identity.id, filename);
        let _guard = span.enter();

        let own = self.own_area();
        state_machine::authorize(&self.identity, &own, &Queue::Done)?;
        let agent = self.identity.id.to_string();
        self.annotate(&self.held_path(filename)?, |record| {
            release_claim(record);
            record.set_status(&TaskStatus::Done);
            record.append_section(
                &format!("Executed by {agent}"),
                &[
                    format!("Execution result: {result}"),
                    format!("Executed at: {}", now_rfc3339()),
                ],
            );
        });

        let outcome = self.relocate(filename, &own, &Queue::Done)?;
        if outcome.is_moved() {
            info!(result, "task done");
            self.record(
                AuditEventType::Executed,
                filename,
                &own,
                &Queue::Done,
                None,
            );
            self.report(
                StatusEntry::success(format!("executed {filename}")).with_detail(result),
            );
        }
        Ok(outcome)
    }

    /// Give up on a held task: `→ Rejected`, with the failure recorded in
    /// the task and the status log.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` on a name collision or `AppError::Io`.
    pub fn fail(&self, filename: &str, reason: &str) -> Result<TransitionOutcome> {
        let span = info_span!("fail", agent = %self.identity.id, filename);
        let _guard = span.enter();

        let own = self.own_area();
        state_machine::authorize(&self.identity, &own, &Queue::Rejected)?;
        self.annotate(&self.held_path(filename)?, |record| {
            self.mark_rejected(record, reason);
        });

        let outcome = self.relocate(filename, &own, &Queue::Rejected)?;
        if outcome.is_moved() {
            warn!(reason, "task rejected");
            self.record(
                AuditEventType::Failed,
                filename,
                &own,
                &Queue::Rejected,
                Some(reason),
            );
            self.report(StatusEntry::failure(format!("processing {filename}"), reason));
        }
        Ok(outcome)
    }

    /// Return claims older than `max_age` to the queue they were taken from.
    ///
    /// Age is measured from the `claimed_at` stamp, or from when the file
    /// entered the claim area when the stamp is missing. Unstamped claims
    /// return to the queue their status label points at; claims taken from
    /// anywhere other than `Needs_Action`, `Pending_Approval` or `Approved`
    /// go back to `Needs_Action`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` for draft-only agents and
    /// `AppError::Vault` if the claim areas cannot be listed. Per-file
    /// failures are logged and skipped.
    pub fn reclaim_stale(&self, max_age: Duration, now: DateTime<Utc>) -> Result<Vec<ReclaimedTask>> {
        let span = info_span!("reclaim_stale", agent = %self.identity.id);
        let _guard = span.enter();

        if !self.identity.role.can_approve() {
            return Err(AppError::Unauthorized(format!(
                "{} agent {} may not reclaim claims",
                self.identity.role.as_str(),
                self.identity.id
            )));
        }

        let mut reclaimed = Vec::new();
        for agent in self.vault.in_progress_agents()? {
            let area = Queue::InProgress(agent);
            for path in self.vault.list(&area)? {
                match self.reclaim_one(&area, &path, max_age, now) {
                    Ok(Some(task)) => reclaimed.push(task),
                    Ok(None) => {}
                    Err(err) => warn!(path = %path.display(), %err, "reclaim skipped"),
                }
            }
        }
        Ok(reclaimed)
    }

    fn reclaim_one(
        &self,
        area: &Queue,
        path: &Path,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<ReclaimedTask>> {
        let filename = file_name(path)?;
        let record = self.vault.read_task(path).ok();
        let claimed_at = match record
            .as_ref()
            .and_then(|r| r.front_matter.get(CLAIMED_AT_KEY))
            .and_then(crate::models::task::parse_timestamp)
        {
            Some(ts) => ts,
            None => DateTime::<Utc>::from(vault::changed_at(path)?),
        };
        let age = now.signed_duration_since(claimed_at).to_std().unwrap_or_default();
        if age < max_age {
            return Ok(None);
        }

        let to = record
            .as_ref()
            .and_then(|r| r.front_matter.get(CLAIMED_FROM_KEY))
            .and_then(|raw| raw.parse::<QueueName>().ok())
            .and_then(Queue::shared)
            .filter(|q| {
                matches!(
                    q,
                    Queue::NeedsAction | Queue::PendingApproval | Queue::Approved
                )
            })
            .or_else(|| record.as_ref().and_then(queue_for_status))
            .unwrap_or(Queue::NeedsAction);

        match self.relocate(&filename, area, &to)? {
            TransitionOutcome::Moved(_) => {
                info!(%filename, from = %area, to = %to, age_secs = age.as_secs(), "stale claim reclaimed");
                self.record(AuditEventType::Reclaimed, &filename, area, &to, None);
                self.report(StatusEntry::success(format!("reclaimed {filename} to {to}")));
                Ok(Some(ReclaimedTask {
                    filename,
                    from: area.clone(),
                    to,
                }))
            }
            TransitionOutcome::AlreadyClaimed => Ok(None),
        }
    }

    fn relocate(&self, filename: &str, from: &Queue, to: &Queue) -> Result<TransitionOutcome> {
        let kind: TransitionKind = state_machine::authorize(&self.identity, from, to)?;
        let source = self.vault.task_path(from, filename)?;
        let dest_dir = self.vault.queue_dir(to);
        debug!(transition = kind.as_str(), from = %from, to = %to, "relocating");
        Ok(self.claims.relocate(&source, &dest_dir)?.into())
    }

    fn mark_rejected(&self, record: &mut TaskRecord, reason: &str) {
        release_claim(record);
        record.set_status(&TaskStatus::Rejected);
        record.append_section(
            &format!("Rejected by {}", self.identity.id),
            &[
                format!("Reason: {reason}"),
                format!("Rejected at: {}", now_rfc3339()),
            ],
        );
    }

    /// Best-effort edit of a held task.
    fn annotate(&self, path: &Path, edit: impl FnOnce(&mut TaskRecord)) {
        let result = self.vault.read_task(path).and_then(|mut record| {
            edit(&mut record);
            self.vault.rewrite_task(path, &record)
        });
        if let Err(err) = result {
            warn!(path = %path.display(), %err, "task metadata update failed");
        }
    }

    fn record(
        &self,
        event: AuditEventType,
        filename: &str,
        from: &Queue,
        to: &Queue,
        reason: Option<&str>,
    ) {
        let mut entry = AuditEntry::new(event)
            .with_filename(filename.to_owned())
            .with_move(from.to_string(), to.to_string());
        if let Some(reason) = reason {
            entry = entry.with_reason(reason.to_owned());
        }
        self.write_audit(entry);
    }

    fn write_audit(&self, entry: AuditEntry) {
        let Some(audit) = &self.audit else {
            return;
        };
        let mut entry = entry.with_agent(self.identity.id.to_string());
        if let Some(run_id) = &self.run_id {
            entry = entry.with_run_id(run_id.clone());
        }
        if let Err(err) = audit.log_entry(entry) {
            warn!(%err, "audit write failed");
        }
    }

    fn report(&self, entry: StatusEntry) {
        if let Err(err) = self.status_log.append(&entry) {
            warn!(%err, "status log append failed");
        }
    }
}

/// File name stem for a new email draft, before any collision suffix.
#[must_use]
pub fn draft_stem(recipient: &str, now: DateTime<Utc>) -> String {
    let recipient = recipient.replace('@', "_at_").replace('.', "_dot_");
    format!(
        "draft_email_{}_{}",
        now.format("%Y%m%d_%H%M%S"),
        sanitize_title(&recipient)
    )
}

fn draft_record(
    identity: &AgentIdentity,
    request: &DraftRequest,
    filename: String,
    now: DateTime<Utc>,
) -> TaskRecord {
    let front_matter = FrontMatter::new()
        .with("type", "email_draft")
        .with("created", now.to_rfc3339_opts(SecondsFormat::Secs, false))
        .with("source", identity.id.as_str())
        .with("status", TaskStatus::PendingApproval.as_str())
        .with("agent", identity.id.as_str())
        .with("target", "email")
        .with("recipient", request.recipient.as_str())
        .with("subject", request.subject.as_str());
    let body = format!(
        "\n# Email Draft\n\n**To**: {}\n**Subject**: {}\n\n{}\n",
        request.recipient, request.subject, request.body
    );
    let mut record = TaskRecord::new(filename, front_matter, body);
    record.append_section(
        "Approval Required",
        &[
            "This email draft requires approval before sending.".to_owned(),
            "Action: approve-send-email".to_owned(),
        ],
    );
    record
}

/// Queue a claimed task came from, judged by its untouched status label.
fn queue_for_status(record: &TaskRecord) -> Option<Queue> {
    match record.status()? {
        TaskStatus::Approved => Some(Queue::Approved),
        TaskStatus::PendingApproval => Some(Queue::PendingApproval),
        _ => None,
    }
}

fn release_claim(record: &mut TaskRecord) {
    for key in [CLAIMED_BY_KEY, CLAIMED_AT_KEY, CLAIMED_FROM_KEY] {
        record.front_matter.remove(key);
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::TaskFormat(format!("{} has no file name", path.display())))
}
