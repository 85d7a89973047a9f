//! Shared helpers for lifecycle and orchestrator integration tests.
//!
//! Provides a throwaway vault with the full queue layout plus lifecycle
//! handles for any number of agents sharing it, so individual tests can
//! focus on behaviour rather than setup.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use agent_vault::audit::JsonlAuditWriter;
use agent_vault::lifecycle::{DraftRequest, Lifecycle};
use agent_vault::models::{AgentId, AgentIdentity, AgentRole, Queue, TaskRecord};
use agent_vault::status_log::MarkdownStatusLog;
use agent_vault::vault::claim::RenameClaim;
use agent_vault::vault::Vault;

/// A vault in a temporary directory, removed on drop.
pub struct TestVault {
    _dir: tempfile::TempDir,
    pub vault: Vault,
}

impl TestVault {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = Vault::open(dir.path()).expect("open vault");
        vault.ensure_layout().expect("layout");
        Self { _dir: dir, vault }
    }

    /// Lifecycle for agent `id` writing to the shared dashboard and its own
    /// audit file.
    pub fn lifecycle(&self, id: &str, role: AgentRole) -> Lifecycle {
        let agent = AgentId::new(id).expect("agent id");
        let audit = JsonlAuditWriter::new(self.vault.logs_dir(), agent.clone()).expect("audit");
        Lifecycle::new(
            self.vault.clone(),
            AgentIdentity::new(agent, role),
            Arc::new(RenameClaim),
            Arc::new(MarkdownStatusLog::new(self.dashboard_path())),
        )
        .with_audit(Arc::new(audit))
        .with_run_id("test-run".to_owned())
    }

    pub fn dashboard_path(&self) -> PathBuf {
        self.vault.root().join("Dashboard.md")
    }

    pub fn dashboard(&self) -> String {
        fs::read_to_string(self.dashboard_path()).unwrap_or_default()
    }

    /// Write raw file contents straight into a queue.
    pub fn put(&self, queue: &Queue, filename: &str, text: &str) -> PathBuf {
        let dir = self.vault.queue_dir(queue);
        fs::create_dir_all(&dir).expect("queue dir");
        let path = dir.join(filename);
        fs::write(&path, text).expect("write task");
        path
    }

    /// Write a general task into a queue.
    pub fn put_task(&self, queue: &Queue, filename: &str, title: &str) -> PathBuf {
        self.put(
            queue,
            filename,
            &format!(
                "---\ntitle: {title}\ncreated: 2026-01-15T10:30:00+00:00\nsource: test\nstatus: new\npriority: normal\n---\n\n# {title}\n\nOriginal request text.\n"
            ),
        )
    }

    /// Every location holding `filename`.
    pub fn locations(&self, filename: &str) -> Vec<Queue> {
        self.vault.locate(filename).expect("locate")
    }

    /// Parse `filename` from `queue`.
    pub fn read(&self, queue: &Queue, filename: &str) -> TaskRecord {
        let path = self.vault.task_path(queue, filename).expect("task path");
        self.vault.read_task(&path).expect("read task")
    }

    /// Draft an email into `Pending_Approval` as `drafter` and return its
    /// file name.
    pub fn pending_draft(&self, drafter: &Lifecycle, recipient: &str) -> String {
        let path = drafter
            .create_draft(&DraftRequest {
                recipient: recipient.to_owned(),
                subject: "Quarterly numbers".to_owned(),
                body: "Hi, the numbers are attached.".to_owned(),
            })
            .expect("create draft");
        path.file_name()
            .expect("file name")
            .to_string_lossy()
            .into_owned()
    }

    /// Audit lines written today by `agent`.
    pub fn audit_lines(&self, agent: &str) -> Vec<String> {
        let name = JsonlAuditWriter::file_name_for(
            &AgentId::new(agent).expect("agent id"),
            chrono::Utc::now().date_naive(),
        );
        fs::read_to_string(self.vault.logs_dir().join(name))
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

pub fn own_area(id: &str) -> Queue {
    Queue::InProgress(AgentId::new(id).expect("agent id"))
}
