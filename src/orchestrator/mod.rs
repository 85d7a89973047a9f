//! Per-agent polling loop.
//!
//! Each pass snapshots every input queue first and only then works through
//! the snapshot, one task at a time. A task promoted into `Needs_Action`
//! during a pass is therefore picked up on the next pass, never the same
//! one. Errors local to one task are logged and counted; only a queue that
//! cannot be listed aborts the pass, and the loop retries on the next tick.

pub mod drafter;
pub mod executor;
pub mod summary;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::lifecycle::{Lifecycle, TransitionOutcome};
use crate::models::{Queue, QueueName, TaskRecord};
use crate::{AppError, Result};

use self::drafter::Drafter;
use self::executor::ExecutorRegistry;

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// `Inbox → Needs_Action` moves.
    pub promoted: usize,
    /// Drafts submitted for approval.
    pub drafted: usize,
    /// Tasks executed into `Done`.
    pub executed: usize,
    /// Tasks moved to `Rejected` after a failure.
    pub rejected: usize,
    /// Claims lost to other agents.
    pub already_claimed: usize,
    /// Malformed tasks left in place.
    pub skipped: usize,
    /// Stale claims returned to a shared queue.
    pub reclaimed: usize,
    /// Per-task errors that left a task where it was.
    pub errors: usize,
}

impl PassReport {
    /// Whether the pass changed nothing.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.promoted + self.drafted + self.executed + self.rejected + self.reclaimed == 0
    }
}

/// One agent's polling loop.
pub struct Orchestrator {
    lifecycle: Lifecycle,
    input_queues: Vec<QueueName>,
    drafter: Arc<dyn Drafter>,
    executors: ExecutorRegistry,
    poll_interval: Duration,
    stale_claim_timeout: Option<Duration>,
    audit: Option<Arc<dyn AuditLogger>>,
    cancel: CancellationToken,
    warned: HashSet<PathBuf>,
    passes: u64,
}

impl Orchestrator {
    /// Loop over `input_queues` using `lifecycle` for every move.
    #[must_use]
    pub fn new(
        lifecycle: Lifecycle,
        input_queues: Vec<QueueName>,
        drafter: Arc<dyn Drafter>,
        executors: ExecutorRegistry,
    ) -> Self {
        Self {
            lifecycle,
            input_queues,
            drafter,
            executors,
            poll_interval: Duration::from_secs(30),
            stale_claim_timeout: None,
            audit: None,
            cancel: CancellationToken::new(),
            warned: HashSet::new(),
            passes: 0,
        }
    }

    /// Delay between passes.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Reclaim claims older than `timeout` at the start of every pass.
    #[must_use]
    pub fn with_stale_claim_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stale_claim_timeout = timeout;
        self
    }

    /// Record skipped tasks to `audit`.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// The lifecycle used for moves.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Poll until `cancel` fires.
    ///
    /// A failed pass is logged and retried after the normal interval. A
    /// task being processed when `cancel` fires is finished first; tasks
    /// not yet started stay where they are.
    pub async fn run(mut self, cancel: CancellationToken) {
        self.cancel = cancel;
        info!(
            agent = %self.lifecycle.identity().id,
            role = self.lifecycle.identity().role.as_str(),
            interval_secs = self.poll_interval.as_secs(),
            "orchestrator started"
        );
        loop {
            match self.run_pass().await {
                Ok(report) if report.is_idle() => debug!("idle pass"),
                Ok(report) => info!(?report, "pass complete"),
                Err(err) => error!(%err, "pass failed"),
            }
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("orchestrator shutting down");
                    break;
                }
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Run one pass over every input queue.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Vault` if an input queue cannot be listed; no
    /// task is touched in that case.
    pub async fn run_pass(&mut self) -> Result<PassReport> {
        self.passes += 1;
        let span = info_span!(
            "orchestrator_pass",
            agent = %self.lifecycle.identity().id,
            pass = self.passes
        );
        self.pass().instrument(span).await
    }

    async fn pass(&mut self) -> Result<PassReport> {
        let mut report = PassReport::default();

        if let Some(timeout) = self.stale_claim_timeout {
            match self.lifecycle.reclaim_stale(timeout, Utc::now()) {
                Ok(reclaimed) => report.reclaimed = reclaimed.len(),
                Err(AppError::Unauthorized(_)) => {}
                Err(err) => warn!(%err, "stale claim sweep failed"),
            }
        }

        let mut snapshot = Vec::new();
        for name in &self.input_queues {
            let Some(queue) = Queue::shared(*name) else {
                continue;
            };
            let files = self.lifecycle.vault().list(&queue)?;
            snapshot.push((queue, files));
        }

        for (queue, files) in snapshot {
            for path in files {
                if self.cancel.is_cancelled() {
                    info!("cancellation requested, ending pass early");
                    return Ok(report);
                }
                self.handle(&queue, &path, &mut report).await;
            }
        }
        Ok(report)
    }

    async fn handle(&mut self, queue: &Queue, path: &Path, report: &mut PassReport) {
        let Some(filename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return;
        };

        // Peek before claiming so a malformed file never leaves its queue.
        match self.lifecycle.vault().read_task(path).and_then(|r| r.kind().map(|_| r)) {
            Ok(_) => {
                self.warned.remove(path);
            }
            Err(AppError::NotFound(_)) => {
                report.already_claimed += 1;
                return;
            }
            Err(err) => {
                report.skipped += 1;
                if self.warned.insert(path.to_path_buf()) {
                    warn!(%filename, %err, "skipping malformed task");
                    self.audit_skip(&filename, queue, &err);
                }
                return;
            }
        }

        let result = match queue {
            Queue::Inbox => self.promote(&filename, report),
            Queue::NeedsAction => self.draft(&filename, report),
            Queue::Approved => self.execute(&filename, report).await,
            other => {
                debug!(queue = %other, "queue is not processed by the orchestrator");
                Ok(())
            }
        };
        if let Err(err) = result {
            report.errors += 1;
            error!(%filename, %err, "task handling failed");
        }
    }

    fn promote(&self, filename: &str, report: &mut PassReport) -> Result<()> {
        match self.lifecycle.promote(filename)? {
            TransitionOutcome::Moved(_) => report.promoted += 1,
            TransitionOutcome::AlreadyClaimed => report.already_claimed += 1,
        }
        Ok(())
    }

    fn draft(&self, filename: &str, report: &mut PassReport) -> Result<()> {
        let held = match self.lifecycle.claim(filename, &Queue::NeedsAction)? {
            TransitionOutcome::Moved(path) => path,
            TransitionOutcome::AlreadyClaimed => {
                report.already_claimed += 1;
                return Ok(());
            }
        };

        let vault = self.lifecycle.vault();
        let drafted = vault.read_task(&held).and_then(|mut record| {
            self.drafter.draft(vault, &mut record, Utc::now())?;
            vault.rewrite_task(&held, &record)
        });
        match drafted {
            Ok(()) => {
                if self.lifecycle.submit_draft(filename)?.is_moved() {
                    report.drafted += 1;
                }
            }
            Err(err) => {
                if self.lifecycle.fail(filename, &err.to_string())?.is_moved() {
                    report.rejected += 1;
                }
            }
        }
        Ok(())
    }

    async fn execute(&self, filename: &str, report: &mut PassReport) -> Result<()> {
        let held = match self.lifecycle.claim(filename, &Queue::Approved)? {
            TransitionOutcome::Moved(path) => path,
            TransitionOutcome::AlreadyClaimed => {
                report.already_claimed += 1;
                return Ok(());
            }
        };

        let outcome = match self.lifecycle.vault().read_task(&held) {
            Ok(record) => self.run_executor(&record).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(result) => {
                if self.lifecycle.complete(filename, &result)?.is_moved() {
                    report.executed += 1;
                }
            }
            Err(err) => {
                if self.lifecycle.fail(filename, &err.to_string())?.is_moved() {
                    report.rejected += 1;
                }
            }
        }
        Ok(())
    }

    async fn run_executor(&self, record: &TaskRecord) -> Result<String> {
        self.lifecycle.identity().ensure_can_execute()?;
        let target = record.target_system();
        let executor = self.executors.resolve(target.as_deref())?;
        executor.execute(record).await
    }

    fn audit_skip(&self, filename: &str, queue: &Queue, err: &AppError) {
        let Some(audit) = &self.audit else {
            return;
        };
        let entry = AuditEntry::new(AuditEventType::Skipped)
            .with_agent(self.lifecycle.identity().id.to_string())
            .with_filename(filename.to_owned())
            .with_move(queue.to_string(), queue.to_string())
            .with_reason(err.to_string());
        if let Err(err) = audit.log_entry(entry) {
            warn!(%err, "audit write failed");
        }
    }
}
