//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// A lost claim race is not represented here: it is reported through
/// [`crate::vault::claim::MoveOutcome::Vanished`].
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Vault layout is missing or unusable.
    Vault(String),
    /// Task record could not be parsed or rendered.
    TaskFormat(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Agent role is not allowed to perform the requested transition.
    Unauthorized(String),
    /// Requested queue transition is not part of the lifecycle.
    InvalidTransition(String),
    /// Destination already holds a task with the same file name.
    Conflict(String),
    /// An approved action failed while being executed.
    Execution(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Vault(msg) => write!(f, "vault: {msg}"),
            Self::TaskFormat(msg) => write!(f, "task format: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::InvalidTransition(msg) => write!(f, "invalid transition: {msg}"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::Execution(msg) => write!(f, "execution: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(format!("json: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Execution(err.to_string())
    }
}
