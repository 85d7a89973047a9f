//! Agent identity and role capabilities.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Name of a worker process; doubles as its `In_Progress/<id>` directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    /// Validate and wrap an agent identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the id is empty or contains anything
    /// other than ASCII alphanumerics, `-` and `_`.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(AppError::Config("agent id must not be empty".into()));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::Config(format!(
                "agent id '{raw}' may only contain [A-Za-z0-9_-]"
            )));
        }
        Ok(Self(raw))
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AgentId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<AgentId> for String {
    fn from(value: AgentId) -> Self {
        value.0
    }
}

impl Display for AgentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an agent process is permitted to do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Creates drafts only; never approves or touches third-party systems.
    Drafter,
    /// Approves and executes actions; may also draft.
    Executor,
}

impl AgentRole {
    /// Whether the role may turn a task into a draft.
    #[must_use]
    pub const fn can_draft(self) -> bool {
        matches!(self, Self::Drafter | Self::Executor)
    }

    /// Whether the role may move a draft into `Approved`.
    #[must_use]
    pub const fn can_approve(self) -> bool {
        matches!(self, Self::Executor)
    }

    /// Whether the role may perform real-world side effects.
    #[must_use]
    pub const fn can_execute(self) -> bool {
        matches!(self, Self::Executor)
    }

    /// Snake-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Drafter => "drafter",
            Self::Executor => "executor",
        }
    }
}

/// A running agent: who it is and what it may do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    /// Directory-safe identifier.
    pub id: AgentId,
    /// Capability set.
    pub role: AgentRole,
}

impl AgentIdentity {
    /// Pair an id with a role.
    #[must_use]
    pub fn new(id: AgentId, role: AgentRole) -> Self {
        Self { id, role }
    }

    /// Fail unless this agent may execute approved actions.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` for draft-only agents.
    pub fn ensure_can_execute(&self) -> Result<()> {
        if self.role.can_execute() {
            Ok(())
        } else {
            Err(AppError::Unauthorized(format!(
                "agent {} ({}) may not execute actions",
                self.id,
                self.role.as_str()
            )))
        }
    }
}
