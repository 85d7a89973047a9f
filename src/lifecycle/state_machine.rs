//! Lifecycle transition table and role authorization.
//!
//! ```text
//! Inbox → Needs_Action → Pending_Approval → Approved → In_Progress/<agent> → Done | Rejected
//! ```
//!
//! Claims (`X → In_Progress/<self>`) are how an agent takes exclusive
//! ownership of a task before working on it. A draft-only agent can never
//! reach `Approved`, never claim from `Approved` or `Pending_Approval`, and
//! never finish a task into `Done`.

use tracing::warn;

use crate::models::{AgentIdentity, Queue};
use crate::{AppError, Result};

/// Named lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// `Inbox → Needs_Action` by any agent.
    Promote,
    /// `Needs_Action → In_Progress/<self>` to draft.
    ClaimForDraft,
    /// `Needs_Action | In_Progress/<self> → Pending_Approval`.
    SubmitDraft,
    /// `Pending_Approval | In_Progress/<self> → Approved`.
    Approve,
    /// `Pending_Approval → In_Progress/<self>` to record a decision.
    ClaimForDecision,
    /// `Approved → In_Progress/<self>` to execute.
    ClaimForExecution,
    /// `In_Progress/<self> → Done`.
    Complete,
    /// `In_Progress/<self> → Rejected`.
    Reject,
    /// `In_Progress/<any> → Needs_Action | Pending_Approval | Approved`
    /// after the claim went stale.
    Reclaim,
}

impl TransitionKind {
    /// Snake-case label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Promote => "promote",
            Self::ClaimForDraft => "claim_for_draft",
            Self::SubmitDraft => "submit_draft",
            Self::Approve => "approve",
            Self::ClaimForDecision => "claim_for_decision",
            Self::ClaimForExecution => "claim_for_execution",
            Self::Complete => "complete",
            Self::Reject => "reject",
            Self::Reclaim => "reclaim",
        }
    }
}

/// Classify `from → to` without looking at who asks.
///
/// # Errors
///
/// Returns `AppError::InvalidTransition` if the pair is not in the table.
pub fn classify(agent: &AgentIdentity, from: &Queue, to: &Queue) -> Result<TransitionKind> {
    let own = |queue: &Queue| queue.owner() == Some(&agent.id);

    let kind = match (from, to) {
        (Queue::Inbox, Queue::NeedsAction) => TransitionKind::Promote,
        (Queue::NeedsAction, claim) if own(claim) => TransitionKind::ClaimForDraft,
        (Queue::NeedsAction, Queue::PendingApproval) => TransitionKind::SubmitDraft,
        (held, Queue::PendingApproval) if own(held) => TransitionKind::SubmitDraft,
        (Queue::PendingApproval, Queue::Approved) => TransitionKind::Approve,
        (held, Queue::Approved) if own(held) => TransitionKind::Approve,
        (Queue::PendingApproval, claim) if own(claim) => TransitionKind::ClaimForDecision,
        (Queue::Approved, claim) if own(claim) => TransitionKind::ClaimForExecution,
        (held, Queue::Done) if own(held) => TransitionKind::Complete,
        (held, Queue::Rejected) if own(held) => TransitionKind::Reject,
        (
            Queue::InProgress(_),
            Queue::NeedsAction | Queue::PendingApproval | Queue::Approved,
        ) => TransitionKind::Reclaim,
        _ => {
            return Err(AppError::InvalidTransition(format!(
                "{from} -> {to} for agent {}",
                agent.id
            )))
        }
    };
    Ok(kind)
}

/// Check that `agent` may move a task from `from` to `to`.
///
/// # Errors
///
/// Returns `AppError::InvalidTransition` for pairs outside the table and
/// `AppError::Unauthorized` when the agent's role lacks the capability.
pub fn authorize(agent: &AgentIdentity, from: &Queue, to: &Queue) -> Result<TransitionKind> {
    let kind = classify(agent, from, to)?;
    let role = agent.role;

    let allowed = match kind {
        TransitionKind::Promote => true,
        TransitionKind::ClaimForDraft | TransitionKind::SubmitDraft => role.can_draft(),
        TransitionKind::Approve | TransitionKind::ClaimForDecision | TransitionKind::Reclaim => {
            role.can_approve()
        }
        TransitionKind::ClaimForExecution | TransitionKind::Complete => role.can_execute(),
        // A drafter may fail its own draft claim; an executor may reject
        // anything it holds.
        TransitionKind::Reject => true,
    };

    if allowed {
        Ok(kind)
    } else {
        warn!(
            agent = %agent.id,
            role = role.as_str(),
            transition = kind.as_str(),
            "transition refused by role policy"
        );
        Err(AppError::Unauthorized(format!(
            "{} agent {} may not {} ({from} -> {to})",
            role.as_str(),
            agent.id,
            kind.as_str()
        )))
    }
}
