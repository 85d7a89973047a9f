//! Unit tests for executor routing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use agent_vault::config::{DefaultExecutor, ExecutorsConfig};
use agent_vault::models::{FrontMatter, TaskRecord};
use agent_vault::orchestrator::executor::{ActionExecutor, ExecutorRegistry, SimulatedExecutor};
use agent_vault::{AppError, Result};

struct FixedExecutor;

impl ActionExecutor for FixedExecutor {
    fn target(&self) -> &str {
        "email"
    }

    fn execute<'a>(
        &'a self,
        _task: &'a TaskRecord,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async { Ok("sent".to_owned()) })
    }
}

fn task() -> TaskRecord {
    TaskRecord::new(
        "draft_email_x.md",
        FrontMatter::new().with("type", "email_draft").with("recipient", "a@b.c"),
        "\n",
    )
}

#[tokio::test]
async fn simulated_executor_reports_target_and_task() {
    let result = SimulatedExecutor::new("email").execute(&task()).await.expect("execute");
    assert_eq!(
        result,
        "SIMULATED_EXECUTION: email action executed for task draft_email_x"
    );
}

#[tokio::test]
async fn registered_executor_wins() {
    let registry = ExecutorRegistry::new()
        .with_fallback(DefaultExecutor::Simulated)
        .with_executor(Arc::new(FixedExecutor));
    let executor = registry.resolve(Some("email")).expect("resolve");
    assert_eq!(executor.execute(&task()).await.expect("execute"), "sent");
}

#[tokio::test]
async fn dry_run_simulates_registered_targets() {
    let registry = ExecutorRegistry::new()
        .with_executor(Arc::new(FixedExecutor))
        .with_dry_run(true);
    let result = registry
        .resolve(Some("email"))
        .expect("resolve")
        .execute(&task())
        .await
        .expect("execute");
    assert!(result.starts_with("SIMULATED_EXECUTION"));
}

#[test]
fn missing_target_defaults_to_general() {
    let registry = ExecutorRegistry::new().with_fallback(DefaultExecutor::Simulated);
    assert_eq!(registry.resolve(None).expect("resolve").target(), "general");
}

#[test]
fn no_fallback_is_an_execution_error() {
    let registry = ExecutorRegistry::new().with_fallback(DefaultExecutor::None);
    let err = registry.resolve(Some("linkedin")).err().expect("unroutable");
    assert!(matches!(err, AppError::Execution(_)));
}

#[test]
fn config_builds_webhook_executors() {
    let mut config = ExecutorsConfig::default();
    config
        .webhooks
        .insert("email".into(), "https://hooks.example.com/email".into());
    config.token = "secret".into();

    let registry = ExecutorRegistry::from_config(&config, false).expect("registry");
    assert_eq!(registry.resolve(Some("email")).expect("resolve").target(), "email");
}
