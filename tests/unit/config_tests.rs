//! Unit tests for configuration parsing and validation.
//!
//! # Scenarios covered
//!
//! | Scenario |
//! |----------|
//! | Minimal config fills every default |
//! | Role determines the default input queues |
//! | Invalid queues, roles, intervals and URLs are rejected |
//! | Command-line overrides replace file values before validation |
//! | Executor token falls back to the environment |

use std::fs;
use std::path::Path;
use std::time::Duration;

use agent_vault::config::{
    ConfigOverrides, DefaultExecutor, GlobalConfig, EXECUTOR_TOKEN_ENV,
};
use agent_vault::models::{AgentId, AgentRole, QueueName};
use agent_vault::AppError;
use chrono::{NaiveTime, Weekday};

fn sample_toml(vault: &Path, agent: &str) -> String {
    format!(
        r#"
vault_root = '{}'

{agent}
"#,
        vault.display()
    )
}

const EXECUTOR: &str = "[agent]\nid = \"local\"\nrole = \"executor\"\n";
const DRAFTER: &str = "[agent]\nid = \"cloud\"\nrole = \"drafter\"\n";

#[test]
fn minimal_config_uses_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&sample_toml(dir.path(), EXECUTOR)).expect("config");

    assert_eq!(config.vault_root, dir.path().canonicalize().expect("canonical"));
    assert_eq!(config.task_glob, "*.md");
    assert_eq!(config.poll_interval(), Duration::from_secs(30));
    assert_eq!(config.stale_claim_timeout(), None);
    assert!(!config.dry_run);
    assert_eq!(config.executors.default, DefaultExecutor::Simulated);
    assert_eq!(config.summary_schedule().expect("schedule"), None);
    assert_eq!(config.status_log_path(), config.vault_root.join("Dashboard.md"));
    assert!(!config.needs_credentials());
}

#[test]
fn role_selects_default_input_queues() {
    let dir = tempfile::tempdir().expect("tempdir");
    let executor = GlobalConfig::from_toml_str(&sample_toml(dir.path(), EXECUTOR)).expect("executor");
    assert_eq!(executor.input_queues(), [QueueName::Inbox, QueueName::Approved]);
    assert_eq!(executor.identity().role, AgentRole::Executor);

    let drafter = GlobalConfig::from_toml_str(&sample_toml(dir.path(), DRAFTER)).expect("drafter");
    assert_eq!(drafter.input_queues(), [QueueName::Inbox, QueueName::NeedsAction]);
    assert_eq!(drafter.identity().id.as_str(), "cloud");
}

#[test]
fn full_config_parses() {
    let dir = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        r#"
vault_root = '{}'
task_glob = "*.task.md"
poll_interval_seconds = 5
stale_claim_seconds = 600
dry_run = true

[agent]
id = "local-1"
role = "executor"
input_queues = ["approved"]

[status_log]
path = "/tmp/status.md"

[summary]
enabled = true
weekday = "mon"
time = "07:30"

[executors]
default = "none"

[executors.webhooks]
email = "https://hooks.example.com/email"
"#,
        dir.path().display()
    );
    let config = GlobalConfig::from_toml_str(&toml).expect("config");

    assert_eq!(config.input_queues(), [QueueName::Approved]);
    assert_eq!(config.poll_interval(), Duration::from_secs(5));
    assert_eq!(config.stale_claim_timeout(), Some(Duration::from_secs(600)));
    assert_eq!(config.status_log_path(), Path::new("/tmp/status.md"));
    assert_eq!(config.executors.default, DefaultExecutor::None);
    assert_eq!(config.executors.webhooks.len(), 1);
    let schedule = config.summary_schedule().expect("schedule").expect("enabled");
    assert_eq!(schedule.weekday, Weekday::Mon);
    assert_eq!(schedule.time, NaiveTime::from_hms_opt(7, 30, 0).expect("time"));
    // dry run never calls webhooks
    assert!(!config.needs_credentials());
}

#[test]
fn zero_poll_interval_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let toml = sample_toml(dir.path(), &format!("poll_interval_seconds = 0\n{EXECUTOR}"));
    assert!(matches!(GlobalConfig::from_toml_str(&toml), Err(AppError::Config(_))));
}

#[test]
fn unpollable_queue_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let agent = format!("{EXECUTOR}input_queues = [\"pending_approval\"]\n");
    let err = GlobalConfig::from_toml_str(&sample_toml(dir.path(), &agent)).expect_err("invalid");
    assert!(err.to_string().contains("cannot be polled"));
}

#[test]
fn drafter_may_not_poll_approved() {
    let dir = tempfile::tempdir().expect("tempdir");
    let agent = format!("{DRAFTER}input_queues = [\"inbox\", \"approved\"]\n");
    let err = GlobalConfig::from_toml_str(&sample_toml(dir.path(), &agent)).expect_err("invalid");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn invalid_agent_id_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let agent = "[agent]\nid = \"../escape\"\nrole = \"executor\"\n";
    assert!(GlobalConfig::from_toml_str(&sample_toml(dir.path(), agent)).is_err());
}

#[test]
fn missing_vault_root_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = GlobalConfig::from_toml_str(&sample_toml(&dir.path().join("missing"), EXECUTOR))
        .expect_err("missing root");
    assert!(err.to_string().contains("vault_root invalid"));
}

#[test]
fn webhook_must_be_http() {
    let dir = tempfile::tempdir().expect("tempdir");
    let agent = format!("{EXECUTOR}\n[executors.webhooks]\nemail = \"ftp://example.com/x\"\n");
    assert!(matches!(
        GlobalConfig::from_toml_str(&sample_toml(dir.path(), &agent)),
        Err(AppError::Config(_))
    ));
}

#[test]
fn bad_summary_schedule_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let agent = format!("{EXECUTOR}\n[summary]\nenabled = true\ntime = \"25:99\"\n");
    assert!(matches!(
        GlobalConfig::from_toml_str(&sample_toml(dir.path(), &agent)),
        Err(AppError::Config(_))
    ));
}

#[test]
fn overrides_apply_before_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let other = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    fs::write(&path, sample_toml(&dir.path().join("missing"), EXECUTOR)).expect("write");

    let overrides = ConfigOverrides {
        vault_root: Some(other.path().to_path_buf()),
        agent_id: Some(AgentId::new("local-2").expect("id")),
    };
    let config = GlobalConfig::load(&path, &overrides).expect("config");

    assert_eq!(config.vault_root, other.path().canonicalize().expect("canonical"));
    assert_eq!(config.agent.id.as_str(), "local-2");
}

#[test]
fn missing_config_file_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(matches!(
        GlobalConfig::load_from_path(dir.path().join("absent.toml")),
        Err(AppError::Config(_))
    ));
}

#[tokio::test]
#[serial_test::serial]
async fn executor_token_falls_back_to_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let agent = format!("{EXECUTOR}\n[executors.webhooks]\nemail = \"https://hooks.example.com/e\"\n");
    let mut config = GlobalConfig::from_toml_str(&sample_toml(dir.path(), &agent)).expect("config");
    assert!(config.needs_credentials());

    std::env::set_var(EXECUTOR_TOKEN_ENV, "env-token");
    let result = config.load_credentials().await;
    std::env::remove_var(EXECUTOR_TOKEN_ENV);

    result.expect("credentials");
    assert_eq!(config.executors.token, "env-token");
}

#[tokio::test]
#[serial_test::serial]
async fn missing_executor_token_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let agent = format!("{EXECUTOR}\n[executors.webhooks]\nemail = \"https://hooks.example.com/e\"\n");
    let mut config = GlobalConfig::from_toml_str(&sample_toml(dir.path(), &agent)).expect("config");

    std::env::remove_var(EXECUTOR_TOKEN_ENV);
    let err = config.load_credentials().await.expect_err("no token");
    assert!(matches!(err, AppError::Config(_)));
}

#[tokio::test]
async fn drafter_needs_no_credentials() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = GlobalConfig::from_toml_str(&sample_toml(dir.path(), DRAFTER)).expect("config");
    config.load_credentials().await.expect("no-op");
    assert!(config.executors.token.is_empty());
}
