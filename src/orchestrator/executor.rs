//! Action executors: the only code that touches third-party systems.
//!
//! Executors run only for tasks an execution-capable agent has claimed out
//! of `Approved`; the orchestrator never hands them anything else.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::config::{DefaultExecutor, ExecutorsConfig};
use crate::models::TaskRecord;
use crate::{AppError, Result};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Performs the real-world side effect of an approved task.
pub trait ActionExecutor: Send + Sync {
    /// Target system this executor serves, e.g. `email`.
    fn target(&self) -> &str;

    /// Execute `task`, returning a one-line result description.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Execution` when the side effect failed.
    fn execute<'a>(
        &'a self,
        task: &'a TaskRecord,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

/// Executor that performs nothing and reports success.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    target: String,
}

impl SimulatedExecutor {
    /// Simulated executor for `target`.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl ActionExecutor for SimulatedExecutor {
    fn target(&self) -> &str {
        &self.target
    }

    fn execute<'a>(
        &'a self,
        task: &'a TaskRecord,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            debug!(target_system = %self.target, filename = %task.filename, "simulating execution");
            Ok(format!(
                "SIMULATED_EXECUTION: {} action executed for task {}",
                self.target,
                task.stem()
            ))
        })
    }
}

/// Executor that POSTs the task to an HTTP endpoint.
///
/// The body is `{"filename", "target", "metadata", "body"}`; any non-2xx
/// response fails the task.
#[derive(Clone)]
pub struct WebhookExecutor {
    target: String,
    url: String,
    token: String,
    client: reqwest::Client,
}

impl WebhookExecutor {
    /// Webhook executor for `target` posting to `url` with a bearer token.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Execution` if the HTTP client cannot be built.
    pub fn new(target: impl Into<String>, url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        Ok(Self {
            target: target.into(),
            url: url.into(),
            token: token.into(),
            client,
        })
    }

    fn payload(&self, task: &TaskRecord) -> Value {
        let metadata: Map<String, Value> = task
            .front_matter
            .iter()
            .map(|(k, v)| (k.to_owned(), Value::String(v.to_owned())))
            .collect();
        json!({
            "filename": task.filename,
            "target": self.target,
            "metadata": metadata,
            "body": task.body,
        })
    }
}

impl ActionExecutor for WebhookExecutor {
    fn target(&self) -> &str {
        &self.target
    }

    fn execute<'a>(
        &'a self,
        task: &'a TaskRecord,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .bearer_auth(&self.token)
                .json(&self.payload(task))
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(AppError::Execution(format!(
                    "{} webhook returned {status}: {}",
                    self.target,
                    detail.trim()
                )));
            }
            info!(target_system = %self.target, filename = %task.filename, %status, "webhook executed");
            Ok(format!("{} webhook accepted task ({status})", self.target))
        })
    }
}

/// Maps target systems to executors.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn ActionExecutor>>,
    fallback: Option<DefaultExecutor>,
    dry_run: bool,
}

impl ExecutorRegistry {
    /// Empty registry with no fallback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry built from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Execution` if an HTTP client cannot be built.
    pub fn from_config(config: &ExecutorsConfig, dry_run: bool) -> Result<Self> {
        let mut registry = Self::new()
            .with_fallback(config.default)
            .with_dry_run(dry_run);
        if dry_run {
            return Ok(registry);
        }
        for (target, url) in &config.webhooks {
            let executor = WebhookExecutor::new(target.as_str(), url.as_str(), config.token.as_str())?;
            registry = registry.with_executor(Arc::new(executor));
        }
        Ok(registry)
    }

    /// Register `executor` for its target.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executors.insert(executor.target().to_owned(), executor);
        self
    }

    /// Behavior for unregistered targets.
    #[must_use]
    pub fn with_fallback(mut self, fallback: DefaultExecutor) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Route every target to the simulated executor.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Executor for `target`; tasks without a target use `general`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Execution` if nothing can execute the target.
    pub fn resolve(&self, target: Option<&str>) -> Result<Arc<dyn ActionExecutor>> {
        let target = target.unwrap_or("general");
        if self.dry_run {
            return Ok(Arc::new(SimulatedExecutor::new(target)));
        }
        if let Some(executor) = self.executors.get(target) {
            return Ok(Arc::clone(executor));
        }
        match self.fallback {
            Some(DefaultExecutor::Simulated) => Ok(Arc::new(SimulatedExecutor::new(target))),
            Some(DefaultExecutor::None) | None => Err(AppError::Execution(format!(
                "no executor configured for target '{target}'"
            ))),
        }
    }
}
