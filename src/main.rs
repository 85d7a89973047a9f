#![forbid(unsafe_code)]

//! `agent-vault`: per-agent orchestrator daemon.
//!
//! Loads configuration, verifies the vault layout and credentials, then
//! polls the agent's input queues until Ctrl-C or SIGTERM. Optional
//! background work (weekly summary, drop-folder watcher) runs alongside.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_vault::audit::{AuditLogger, JsonlAuditWriter};
use agent_vault::config::{ConfigOverrides, GlobalConfig};
use agent_vault::intake::DropFolderWatcher;
use agent_vault::lifecycle::Lifecycle;
use agent_vault::models::AgentId;
use agent_vault::orchestrator::drafter::PlanDrafter;
use agent_vault::orchestrator::executor::ExecutorRegistry;
use agent_vault::orchestrator::{summary, Orchestrator};
use agent_vault::status_log::{MarkdownStatusLog, StatusLog};
use agent_vault::vault::claim::RenameClaim;
use agent_vault::vault::Vault;
use agent_vault::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-vault", about = "Filesystem task queue agent", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured vault root.
    #[arg(long)]
    vault: Option<PathBuf>,

    /// Override the configured agent id.
    #[arg(long)]
    agent_id: Option<String>,

    /// Run a single pass and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-vault bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let overrides = ConfigOverrides {
        vault_root: args.vault,
        agent_id: args.agent_id.map(AgentId::new).transpose()?,
    };
    let mut config = GlobalConfig::load(&args.config, &overrides)?;
    config.load_credentials().await?;
    let identity = config.identity();
    info!(
        agent = %identity.id,
        role = identity.role.as_str(),
        vault = %config.vault_root.display(),
        "configuration loaded"
    );

    // ── Open the vault ──────────────────────────────────
    let vault = Vault::open(&config.vault_root)?.with_task_glob(&config.task_glob)?;
    vault.check_layout()?;

    let status_log: Arc<dyn StatusLog> = Arc::new(MarkdownStatusLog::new(config.status_log_path()));
    let audit: Arc<dyn AuditLogger> =
        Arc::new(JsonlAuditWriter::new(vault.logs_dir(), identity.id.clone())?);
    let run_id = uuid::Uuid::new_v4().to_string();

    let lifecycle = Lifecycle::new(
        vault.clone(),
        identity.clone(),
        Arc::new(RenameClaim),
        Arc::clone(&status_log),
    )
    .with_audit(Arc::clone(&audit))
    .with_run_id(run_id.clone());

    let executors = ExecutorRegistry::from_config(&config.executors, config.dry_run)?;
    if config.dry_run {
        warn!("dry run: every execution is simulated");
    }

    let mut orchestrator = Orchestrator::new(
        lifecycle,
        config.input_queues(),
        Arc::new(PlanDrafter),
        executors,
    )
    .with_poll_interval(config.poll_interval())
    .with_stale_claim_timeout(config.stale_claim_timeout())
    .with_audit(audit);

    if args.once {
        let report = orchestrator.run_pass().await?;
        info!(?report, "single pass complete");
        return Ok(());
    }

    // ── Background services ─────────────────────────────
    let ct = CancellationToken::new();

    let summary_handle = match config.summary_schedule()? {
        Some(schedule) => {
            info!(weekday = %schedule.weekday, time = %schedule.time, "weekly summary scheduled");
            Some(summary::spawn_summary_task(
                vault.clone(),
                schedule,
                Arc::clone(&status_log),
                ct.clone(),
            ))
        }
        None => None,
    };

    let _drop_watcher = match &config.drop_folder {
        Some(folder) => Some(DropFolderWatcher::new(vault.clone(), folder.clone()).start()?),
        None => None,
    };

    let orchestrator_ct = ct.clone();
    let orchestrator_handle = tokio::spawn(async move {
        orchestrator.run(orchestrator_ct).await;
    });

    info!(%run_id, "agent ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    if let Err(err) = orchestrator_handle.await {
        error!(%err, "orchestrator task failed");
    }
    if let Some(handle) = summary_handle {
        if let Err(err) = handle.await {
            error!(%err, "summary task failed");
        }
    }
    info!("agent-vault shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
