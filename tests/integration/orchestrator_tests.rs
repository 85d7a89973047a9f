//! Integration tests for the polling orchestrator.
//!
//! # Scenarios covered
//!
//! | Scenario |
//! |----------|
//! | A pass only promotes what it saw in Inbox at the start |
//! | A drafter pass drafts claimed tasks into Pending_Approval |
//! | An executor pass runs approved tasks into Done |
//! | A failing executor sends the task to Rejected with a dashboard row |
//! | Malformed tasks are skipped and left in place |
//! | Two agents racing for one approved task produce one winner |
//! | A drafter never executes, even if pointed at Approved |
//! | Cancellation stops the loop |

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use agent_vault::config::DefaultExecutor;
use agent_vault::lifecycle::{Lifecycle, TransitionOutcome};
use agent_vault::models::{AgentRole, Queue, QueueName, TaskRecord, TaskStatus};
use agent_vault::orchestrator::drafter::PlanDrafter;
use agent_vault::orchestrator::executor::{ActionExecutor, ExecutorRegistry};
use agent_vault::orchestrator::Orchestrator;
use agent_vault::{AppError, Result};
use tokio_util::sync::CancellationToken;

use super::test_helpers::{own_area, TestVault};

struct FailingExecutor;

impl ActionExecutor for FailingExecutor {
    fn target(&self) -> &str {
        "email"
    }

    fn execute<'a>(
        &'a self,
        _task: &'a TaskRecord,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async { Err(AppError::Execution("smtp down".into())) })
    }
}

fn simulated() -> ExecutorRegistry {
    ExecutorRegistry::new().with_fallback(DefaultExecutor::Simulated)
}

fn orchestrator(lifecycle: Lifecycle, queues: &[QueueName], executors: ExecutorRegistry) -> Orchestrator {
    Orchestrator::new(lifecycle, queues.to_vec(), Arc::new(PlanDrafter), executors)
        .with_poll_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn pass_promotes_without_processing() {
    let env = TestVault::new();
    env.put_task(&Queue::Inbox, "20260115_103000_ReviewReport.md", "Review Report");
    let cloud = env.lifecycle("cloud", AgentRole::Drafter);
    let mut orch = orchestrator(cloud, &[QueueName::Inbox, QueueName::NeedsAction], simulated());

    let report = orch.run_pass().await.expect("pass");

    assert_eq!(report.promoted, 1);
    assert_eq!(report.drafted, 0);
    assert_eq!(env.locations("20260115_103000_ReviewReport.md"), vec![Queue::NeedsAction]);
    assert_eq!(
        env.read(&Queue::NeedsAction, "20260115_103000_ReviewReport.md").status(),
        Some(TaskStatus::New)
    );

    let report = orch.run_pass().await.expect("second pass");
    assert_eq!(report.drafted, 1);
    assert_eq!(env.locations("20260115_103000_ReviewReport.md"), vec![Queue::PendingApproval]);
}

#[tokio::test]
async fn drafter_pass_writes_plan_and_submits() {
    let env = TestVault::new();
    env.put_task(&Queue::NeedsAction, "plan-me.md", "Plan me");
    let mut orch = orchestrator(
        env.lifecycle("cloud", AgentRole::Drafter),
        &[QueueName::NeedsAction],
        simulated(),
    );

    let report = orch.run_pass().await.expect("pass");

    assert_eq!(report.drafted, 1);
    let record = env.read(&Queue::PendingApproval, "plan-me.md");
    assert_eq!(record.status(), Some(TaskStatus::PendingApproval));
    assert!(record.body.contains("Original request text."));
    assert!(record.body.contains("- [ ] Review task"));
    let plans: Vec<_> = std::fs::read_dir(env.vault.plans_dir())
        .expect("plans")
        .filter_map(std::result::Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(plans.len(), 1);
    assert!(plans[0].starts_with("PLAN_plan-me_"));
}

#[tokio::test]
async fn executor_pass_completes_approved_tasks() {
    let env = TestVault::new();
    let cloud = env.lifecycle("cloud", AgentRole::Drafter);
    let local = env.lifecycle("local", AgentRole::Executor);
    let filename = env.pending_draft(&cloud, "ops@example.com");
    local.approve(&filename).expect("approve");

    let mut orch = orchestrator(local, &[QueueName::Inbox, QueueName::Approved], simulated());
    let report = orch.run_pass().await.expect("pass");

    assert_eq!(report.executed, 1);
    assert_eq!(env.locations(&filename), vec![Queue::Done]);
    let done = env.read(&Queue::Done, &filename);
    assert_eq!(done.status(), Some(TaskStatus::Done));
    assert!(done.body.contains("SIMULATED_EXECUTION: email action executed"));
}

#[tokio::test]
async fn failing_executor_rejects_with_reason() {
    let env = TestVault::new();
    let cloud = env.lifecycle("cloud", AgentRole::Drafter);
    let local = env.lifecycle("local", AgentRole::Executor);
    let filename = env.pending_draft(&cloud, "ops@example.com");
    local.approve(&filename).expect("approve");

    let registry = simulated().with_executor(Arc::new(FailingExecutor));
    let mut orch = orchestrator(local, &[QueueName::Approved], registry);
    let report = orch.run_pass().await.expect("pass");

    assert_eq!(report.rejected, 1);
    assert_eq!(report.executed, 0);
    assert_eq!(env.locations(&filename), vec![Queue::Rejected]);
    let record = env.read(&Queue::Rejected, &filename);
    assert!(record.body.contains("Reason: execution: smtp down"));
    assert!(env
        .dashboard()
        .contains(&format!("| processing {filename} | error: execution: smtp down |")));
}

#[tokio::test]
async fn unroutable_target_is_rejected() {
    let env = TestVault::new();
    env.put(
        &Queue::Approved,
        "post.md",
        "---\ntype: social_post\nplatform: linkedin\nstatus: approved\n---\n\nHello\n",
    );
    let registry = ExecutorRegistry::new().with_fallback(DefaultExecutor::None);
    let mut orch = orchestrator(
        env.lifecycle("local", AgentRole::Executor),
        &[QueueName::Approved],
        registry,
    );

    let report = orch.run_pass().await.expect("pass");

    assert_eq!(report.rejected, 1);
    assert!(env
        .read(&Queue::Rejected, "post.md")
        .body
        .contains("no executor configured for target 'linkedin'"));
}

#[tokio::test]
async fn malformed_task_is_skipped_in_place() {
    let env = TestVault::new();
    env.put(&Queue::Approved, "broken.md", "no front matter here\n");
    env.put(&Queue::Approved, "typed.md", "---\ntype: email_draft\n---\n");
    let mut orch = orchestrator(
        env.lifecycle("local", AgentRole::Executor),
        &[QueueName::Approved],
        simulated(),
    );

    for _ in 0..2 {
        let report = orch.run_pass().await.expect("pass");
        assert_eq!(report.skipped, 2);
        assert_eq!(report.executed, 0);
    }
    assert_eq!(env.locations("broken.md"), vec![Queue::Approved]);
    assert_eq!(env.locations("typed.md"), vec![Queue::Approved]);
}

#[tokio::test]
async fn racing_claims_have_one_winner() {
    let env = TestVault::new();
    env.put_task(&Queue::Approved, "draft_email_x.md", "Draft");
    let first = env.lifecycle("agent-1", AgentRole::Executor);
    let second = env.lifecycle("agent-2", AgentRole::Executor);

    let a = first.claim("draft_email_x.md", &Queue::Approved).expect("first");
    let b = second.claim("draft_email_x.md", &Queue::Approved).expect("second");

    assert!(a
        .path()
        .expect("winner path")
        .ends_with("In_Progress/agent-1/draft_email_x.md"));
    assert_eq!(b, TransitionOutcome::AlreadyClaimed);
    assert_eq!(env.locations("draft_email_x.md"), vec![own_area("agent-1")]);

    // The loser's next pass finds nothing to do.
    let mut orch = orchestrator(second, &[QueueName::Approved], simulated());
    let report = orch.run_pass().await.expect("pass");
    assert!(report.is_idle());
    assert_eq!(env.locations("draft_email_x.md"), vec![own_area("agent-1")]);
}

#[tokio::test]
async fn drafter_never_executes() {
    let env = TestVault::new();
    env.put_task(&Queue::Approved, "approved.md", "Approved");
    let mut orch = orchestrator(
        env.lifecycle("cloud", AgentRole::Drafter),
        &[QueueName::Approved],
        simulated(),
    );

    let report = orch.run_pass().await.expect("pass");

    assert_eq!(report.errors, 1);
    assert_eq!(report.executed, 0);
    assert_eq!(env.locations("approved.md"), vec![Queue::Approved]);
}

#[tokio::test]
async fn pass_reclaims_stale_claims_first() {
    let env = TestVault::new();
    env.put_task(&Queue::Approved, "abandoned.md", "Abandoned");
    let crashed = env.lifecycle("local-a", AgentRole::Executor);
    crashed.claim("abandoned.md", &Queue::Approved).expect("claim");

    let mut orch = orchestrator(
        env.lifecycle("local-b", AgentRole::Executor),
        &[QueueName::Approved],
        simulated(),
    )
    .with_stale_claim_timeout(Some(Duration::ZERO));
    let report = orch.run_pass().await.expect("pass");

    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.executed, 1);
    assert_eq!(env.locations("abandoned.md"), vec![Queue::Done]);
    assert!(env.dashboard().contains("reclaimed abandoned.md to Approved"));
}

#[tokio::test]
async fn missing_input_queue_fails_the_pass() {
    let env = TestVault::new();
    std::fs::remove_dir(env.vault.queue_dir(&Queue::Inbox)).expect("remove inbox");
    let mut orch = orchestrator(
        env.lifecycle("local", AgentRole::Executor),
        &[QueueName::Inbox],
        simulated(),
    );
    assert!(matches!(orch.run_pass().await, Err(AppError::Vault(_))));
}

#[tokio::test]
async fn cancellation_stops_the_loop() {
    let env = TestVault::new();
    env.put_task(&Queue::Inbox, "late.md", "Late");
    let orch = orchestrator(
        env.lifecycle("local", AgentRole::Executor),
        &[QueueName::Inbox],
        simulated(),
    )
    .with_poll_interval(Duration::from_secs(3600));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(orch.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stopped")
        .expect("join");
    assert_eq!(env.locations("late.md"), vec![Queue::NeedsAction]);
}
