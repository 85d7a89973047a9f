//! Agent configuration parsing, validation, and credential loading.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::models::{AgentId, AgentIdentity, AgentRole, QueueName};
use crate::orchestrator::summary::WeeklySchedule;
use crate::{AppError, Result};

/// Keychain service holding agent credentials.
pub const KEYRING_SERVICE: &str = "agent-vault";
/// Keychain entry for the executor bearer token.
pub const EXECUTOR_TOKEN_KEY: &str = "executor_token";
/// Environment fallback for the executor bearer token.
pub const EXECUTOR_TOKEN_ENV: &str = "AGENT_VAULT_EXECUTOR_TOKEN";

/// Identity and responsibilities of this agent process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent identifier; names the `In_Progress/<id>` claim area.
    pub id: AgentId,
    /// Capability set.
    pub role: AgentRole,
    /// Queues this agent polls; empty means the role default.
    #[serde(default)]
    pub input_queues: Vec<QueueName>,
}

/// Location of the shared status document.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StatusLogConfig {
    /// Path of the dashboard; relative paths resolve against the vault.
    #[serde(default = "default_status_log_path")]
    pub path: PathBuf,
}

impl Default for StatusLogConfig {
    fn default() -> Self {
        Self {
            path: default_status_log_path(),
        }
    }
}

fn default_status_log_path() -> PathBuf {
    PathBuf::from("Dashboard.md")
}

/// Weekly summary scheduling.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SummaryConfig {
    /// Whether this agent writes weekly summaries.
    #[serde(default)]
    pub enabled: bool,
    /// Day of week, e.g. `sun`.
    #[serde(default = "default_summary_weekday")]
    pub weekday: String,
    /// Local wall-clock time in `HH:MM`, interpreted as UTC.
    #[serde(default = "default_summary_time")]
    pub time: String,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            weekday: default_summary_weekday(),
            time: default_summary_time(),
        }
    }
}

fn default_summary_weekday() -> String {
    "sun".into()
}

fn default_summary_time() -> String {
    "23:00".into()
}

/// Executor used for targets without a webhook.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DefaultExecutor {
    /// Report a simulated success.
    #[default]
    Simulated,
    /// Fail the task: nothing can execute it.
    None,
}

/// Action executor settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ExecutorsConfig {
    /// Fallback for targets without a webhook.
    #[serde(default)]
    pub default: DefaultExecutor,
    /// Target system name to webhook URL.
    #[serde(default)]
    pub webhooks: BTreeMap<String, String>,
    /// Bearer token sent to webhooks (populated at runtime).
    #[serde(skip)]
    pub token: String,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Root of the shared vault.
    pub vault_root: PathBuf,
    /// File-name pattern selecting task files inside a queue.
    #[serde(default = "default_task_glob")]
    pub task_glob: String,
    /// Seconds between orchestrator passes.
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// Claims older than this are reclaimed; 0 disables the sweep.
    #[serde(default)]
    pub stale_claim_seconds: u64,
    /// Simulate every execution.
    #[serde(default)]
    pub dry_run: bool,
    /// Folder watched for dropped files.
    #[serde(default)]
    pub drop_folder: Option<PathBuf>,
    /// Agent identity and input queues.
    pub agent: AgentConfig,
    /// Status document location.
    #[serde(default)]
    pub status_log: StatusLogConfig,
    /// Weekly summary scheduling.
    #[serde(default)]
    pub summary: SummaryConfig,
    /// Action executors.
    #[serde(default)]
    pub executors: ExecutorsConfig,
}

fn default_task_glob() -> String {
    crate::vault::DEFAULT_TASK_GLOB.into()
}

fn default_poll_interval_seconds() -> u64 {
    30
}

/// Command-line values that replace configured ones before validation.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Replacement vault root.
    pub vault_root: Option<PathBuf>,
    /// Replacement agent id.
    pub agent_id: Option<AgentId>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(path, &ConfigOverrides::default())
    }

    /// Load a TOML file, apply `overrides`, then validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or parsed, or
    /// if the overridden configuration is invalid.
    pub fn load(path: impl AsRef<Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        let mut config: Self = toml::from_str(&raw)?;
        if let Some(root) = &overrides.vault_root {
            config.vault_root.clone_from(root);
        }
        if let Some(id) = &overrides.agent_id {
            config.agent.id = id.clone();
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the executor bearer token when webhooks will be called.
    ///
    /// Tries the `agent-vault` keyring service first, then falls back to
    /// the `AGENT_VAULT_EXECUTOR_TOKEN` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the token is required and neither the
    /// keychain nor the environment provides it.
    pub async fn load_credentials(&mut self) -> Result<()> {
        if self.needs_credentials() {
            self.executors.token = load_credential(EXECUTOR_TOKEN_KEY, EXECUTOR_TOKEN_ENV).await?;
        }
        Ok(())
    }

    /// Whether startup must obtain an executor token.
    #[must_use]
    pub fn needs_credentials(&self) -> bool {
        self.agent.role.can_execute() && !self.dry_run && !self.executors.webhooks.is_empty()
    }

    /// Identity of this agent.
    #[must_use]
    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity::new(self.agent.id.clone(), self.agent.role)
    }

    /// Queues polled each pass, in configured order.
    #[must_use]
    pub fn input_queues(&self) -> Vec<QueueName> {
        if !self.agent.input_queues.is_empty() {
            return self.agent.input_queues.clone();
        }
        match self.agent.role {
            AgentRole::Drafter => vec![QueueName::Inbox, QueueName::NeedsAction],
            AgentRole::Executor => vec![QueueName::Inbox, QueueName::Approved],
        }
    }

    /// Delay between passes.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Age after which claims are reclaimed, if the sweep is enabled.
    #[must_use]
    pub fn stale_claim_timeout(&self) -> Option<Duration> {
        (self.stale_claim_seconds > 0).then(|| Duration::from_secs(self.stale_claim_seconds))
    }

    /// Absolute path of the status document.
    #[must_use]
    pub fn status_log_path(&self) -> PathBuf {
        if self.status_log.path.is_absolute() {
            self.status_log.path.clone()
        } else {
            self.vault_root.join(&self.status_log.path)
        }
    }

    /// Parsed summary schedule, if summaries are enabled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the weekday or time is malformed.
    pub fn summary_schedule(&self) -> Result<Option<WeeklySchedule>> {
        if !self.summary.enabled {
            return Ok(None);
        }
        WeeklySchedule::parse(&self.summary.weekday, &self.summary.time).map(Some)
    }

    fn validate(&mut self) -> Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "poll_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.task_glob.contains(['/', '\\']) {
            return Err(AppError::Config(format!(
                "task_glob '{}' must match file names only",
                self.task_glob
            )));
        }
        glob::Pattern::new(&self.task_glob)
            .map_err(|err| AppError::Config(format!("invalid task_glob: {err}")))?;

        for queue in &self.agent.input_queues {
            let pollable = matches!(
                queue,
                QueueName::Inbox | QueueName::NeedsAction | QueueName::Approved
            );
            if !pollable {
                return Err(AppError::Config(format!(
                    "input queue '{queue}' cannot be polled"
                )));
            }
            if *queue == QueueName::Approved && !self.agent.role.can_execute() {
                return Err(AppError::Config(format!(
                    "a {} agent may not poll '{queue}'",
                    self.agent.role.as_str()
                )));
            }
        }

        self.summary_schedule()?;

        for (target, url) in &self.executors.webhooks {
            let parsed = reqwest::Url::parse(url).map_err(|err| {
                AppError::Config(format!("webhook for '{target}' is not a valid URL: {err}"))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppError::Config(format!(
                    "webhook for '{target}' must use http or https"
                )));
            }
        }

        let canonical_root = self
            .vault_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("vault_root invalid: {err}")))?;
        self.vault_root = canonical_root;

        if let Some(drop) = &self.drop_folder {
            if !drop.is_dir() {
                return Err(AppError::Config(format!(
                    "drop_folder {} is not a directory",
                    drop.display()
                )));
            }
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
