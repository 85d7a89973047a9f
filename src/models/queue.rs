//! Queue vocabulary: symbolic names and physical locations.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::agent::AgentId;
use crate::AppError;

/// Symbolic queue name as used in configuration and the operator CLI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    /// Freshly produced tasks awaiting promotion.
    Inbox,
    /// Promoted tasks awaiting a draft.
    NeedsAction,
    /// Drafts awaiting an approval decision.
    PendingApproval,
    /// Approved drafts awaiting execution.
    Approved,
    /// Parent of the per-agent claim directories.
    InProgress,
    /// Successfully executed tasks.
    Done,
    /// Denied or failed tasks.
    Rejected,
}

impl QueueName {
    /// Every queue in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Inbox,
        Self::NeedsAction,
        Self::PendingApproval,
        Self::Approved,
        Self::InProgress,
        Self::Done,
        Self::Rejected,
    ];

    /// Directory name of this queue inside the vault.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Inbox => "Inbox",
            Self::NeedsAction => "Needs_Action",
            Self::PendingApproval => "Pending_Approval",
            Self::Approved => "Approved",
            Self::InProgress => "In_Progress",
            Self::Done => "Done",
            Self::Rejected => "Rejected",
        }
    }

    /// Snake-case key used in config files and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::NeedsAction => "needs_action",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Rejected => "rejected",
        }
    }

    /// Whether a task in this queue can never move again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Rejected)
    }
}

impl Display for QueueName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|q| q.as_str() == s || q.dir_name() == s)
            .ok_or_else(|| AppError::NotFound(format!("unknown queue '{s}'")))
    }
}

/// Physical location of a task: a shared queue or one agent's claim area.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Queue {
    /// `Inbox/`
    Inbox,
    /// `Needs_Action/`
    NeedsAction,
    /// `Pending_Approval/`
    PendingApproval,
    /// `Approved/`
    Approved,
    /// `In_Progress/<agent>/`
    InProgress(AgentId),
    /// `Done/`
    Done,
    /// `Rejected/`
    Rejected,
}

impl Queue {
    /// Symbolic name of this location.
    #[must_use]
    pub const fn name(&self) -> QueueName {
        match self {
            Self::Inbox => QueueName::Inbox,
            Self::NeedsAction => QueueName::NeedsAction,
            Self::PendingApproval => QueueName::PendingApproval,
            Self::Approved => QueueName::Approved,
            Self::InProgress(_) => QueueName::InProgress,
            Self::Done => QueueName::Done,
            Self::Rejected => QueueName::Rejected,
        }
    }

    /// Convert a symbolic shared queue into a location.
    ///
    /// Returns `None` for [`QueueName::InProgress`], which needs an owner.
    #[must_use]
    pub const fn shared(name: QueueName) -> Option<Self> {
        match name {
            QueueName::Inbox => Some(Self::Inbox),
            QueueName::NeedsAction => Some(Self::NeedsAction),
            QueueName::PendingApproval => Some(Self::PendingApproval),
            QueueName::Approved => Some(Self::Approved),
            QueueName::InProgress => None,
            QueueName::Done => Some(Self::Done),
            QueueName::Rejected => Some(Self::Rejected),
        }
    }

    /// Owner of a claim area, if this is one.
    #[must_use]
    pub const fn owner(&self) -> Option<&AgentId> {
        match self {
            Self::InProgress(agent) => Some(agent),
            _ => None,
        }
    }

    /// Whether the location is a terminal queue.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.name().is_terminal()
    }
}

impl Display for Queue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress(agent) => write!(f, "{}/{agent}", QueueName::InProgress.dir_name()),
            other => f.write_str(other.name().dir_name()),
        }
    }
}
