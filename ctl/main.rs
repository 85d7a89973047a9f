#![forbid(unsafe_code)]

//! `agent-vault-ctl`: local operator CLI for an `agent-vault` vault.
//!
//! Performs one-shot lifecycle operations directly against the vault with
//! the same library and the same rules the daemon uses. Operator actions
//! act as an agent identity of their own and claim through their own
//! `In_Progress/<id>` area.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use agent_vault::audit::JsonlAuditWriter;
use agent_vault::config::{ConfigOverrides, GlobalConfig};
use agent_vault::intake::{self, TaskSubmission};
use agent_vault::lifecycle::{DraftRequest, Lifecycle, TransitionOutcome};
use agent_vault::models::{AgentId, AgentIdentity, AgentRole, Priority, Queue, QueueName};
use agent_vault::orchestrator::summary;
use agent_vault::status_log::MarkdownStatusLog;
use agent_vault::vault::claim::RenameClaim;
use agent_vault::vault::{self, Vault};
use agent_vault::{AppError, Result};

const DEFAULT_OPERATOR_ID: &str = "operator";

#[derive(Debug, Parser)]
#[command(
    name = "agent-vault-ctl",
    about = "Operator CLI for an agent-vault vault",
    version,
    long_about = None
)]
struct Cli {
    /// Agent configuration to act as; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Vault root (required without `--config`).
    #[arg(long)]
    vault: Option<PathBuf>,

    /// Identity used for claims and approvals.
    #[arg(long)]
    agent_id: Option<String>,

    /// Role of the acting identity when no config is given.
    #[arg(long, value_enum, default_value_t = RoleArg::Executor)]
    role: RoleArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum RoleArg {
    Drafter,
    Executor,
}

impl From<RoleArg> for AgentRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Drafter => Self::Drafter,
            RoleArg::Executor => Self::Executor,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create every missing queue folder.
    Init,

    /// Submit a new task into Inbox.
    Submit {
        /// Task title.
        title: String,
        /// Task description.
        #[arg(long)]
        content: Option<String>,
        /// low, normal, medium, high or urgent.
        #[arg(long, default_value = "normal")]
        priority: String,
        /// External message identifier; makes the submission idempotent.
        #[arg(long)]
        external_id: Option<String>,
        /// File name prefix for external tasks.
        #[arg(long, default_value = "EXT")]
        prefix: String,
    },

    /// Write an email draft straight into Pending_Approval.
    DraftEmail {
        /// Recipient address.
        #[arg(long)]
        to: String,
        /// Subject line.
        #[arg(long)]
        subject: String,
        /// Message body.
        #[arg(long)]
        body: String,
    },

    /// List task files in one queue or all of them.
    List {
        /// Queue name, e.g. `pending_approval` or `Pending_Approval`.
        queue: Option<QueueName>,
    },

    /// Show task counts per queue.
    Status,

    /// Show every queue holding a file name.
    Locate {
        /// Task file name.
        filename: String,
    },

    /// Claim a task into this identity's In_Progress area.
    Claim {
        /// Task file name.
        filename: String,
        /// Queue to claim from.
        #[arg(long)]
        from: QueueName,
    },

    /// Approve a pending draft.
    Approve {
        /// Task file name.
        filename: String,
    },

    /// Deny a pending draft.
    Deny {
        /// Task file name.
        filename: String,
        /// Reason recorded in the task and the status log.
        #[arg(long, default_value = "denied by operator")]
        reason: String,
    },

    /// Return claims older than the threshold to their source queue.
    Reclaim {
        /// Minimum claim age in seconds.
        #[arg(long, default_value_t = 3600)]
        older_than_secs: u64,
    },

    /// Write the weekly summary now.
    Summary,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();

    match execute(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn execute(args: Cli) -> Result<()> {
    let context = Context::from_args(&args)?;

    match args.command {
        Command::Init => {
            context.vault.ensure_layout()?;
            println!("initialized {}", context.vault.root().display());
        }
        Command::Submit {
            title,
            content,
            priority,
            external_id,
            prefix,
        } => {
            let mut submission = TaskSubmission::new(title, context.identity.id.to_string())
                .with_priority(Priority::parse(&priority));
            if let Some(content) = content {
                submission = submission.with_content(content);
            }
            let now = Utc::now();
            match external_id {
                Some(id) => {
                    match intake::submit_external_task(&context.vault, &prefix, &id, &submission, now)? {
                        Some(path) => println!("{}", path.display()),
                        None => println!("already ingested: {}", intake::external_task_filename(&prefix, &id)),
                    }
                }
                None => {
                    let path = intake::submit_task(&context.vault, &submission, now)?;
                    println!("{}", path.display());
                }
            }
        }
        Command::DraftEmail { to, subject, body } => {
            let path = context.lifecycle().create_draft(&DraftRequest {
                recipient: to,
                subject,
                body,
            })?;
            println!("{}", path.display());
        }
        Command::List { queue } => {
            let names: Vec<QueueName> = queue.map_or_else(|| QueueName::ALL.to_vec(), |q| vec![q]);
            for name in names {
                for queue in context.locations(name)? {
                    for path in context.vault.list(&queue)? {
                        print_task_line(&context.vault, &queue, &path);
                    }
                }
            }
        }
        Command::Status => {
            for (name, count) in context.vault.counts()? {
                println!("{:<18} {count}", name.dir_name());
            }
        }
        Command::Locate { filename } => {
            let found = context.vault.locate(&filename)?;
            if found.is_empty() {
                return Err(AppError::NotFound(filename));
            }
            for queue in &found {
                println!("{queue}");
            }
            if found.len() > 1 {
                return Err(AppError::Conflict(format!(
                    "{filename} is present in {} queues",
                    found.len()
                )));
            }
        }
        Command::Claim { filename, from } => {
            let from = Queue::shared(from).ok_or_else(|| {
                AppError::InvalidTransition("cannot claim out of another claim area".into())
            })?;
            print_outcome(&context.lifecycle().claim(&filename, &from)?, &filename);
        }
        Command::Approve { filename } => {
            print_outcome(&context.lifecycle().approve(&filename)?, &filename);
        }
        Command::Deny { filename, reason } => {
            print_outcome(&context.lifecycle().deny(&filename, &reason)?, &filename);
        }
        Command::Reclaim { older_than_secs } => {
            let reclaimed = context
                .lifecycle()
                .reclaim_stale(Duration::from_secs(older_than_secs), Utc::now())?;
            if reclaimed.is_empty() {
                println!("no stale claims");
            }
            for task in reclaimed {
                println!("{}: {} -> {}", task.filename, task.from, task.to);
            }
        }
        Command::Summary => {
            let path = summary::write_summary(&context.vault, Utc::now())?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Vault, identity and status log resolved from flags and config.
struct Context {
    vault: Vault,
    identity: AgentIdentity,
    status_log_path: PathBuf,
}

impl Context {
    fn from_args(args: &Cli) -> Result<Self> {
        let agent_id = args.agent_id.clone().map(AgentId::new).transpose()?;

        if let Some(config_path) = &args.config {
            let overrides = ConfigOverrides {
                vault_root: args.vault.clone(),
                agent_id,
            };
            let config = GlobalConfig::load(config_path, &overrides)?;
            let vault = Vault::open(&config.vault_root)?.with_task_glob(&config.task_glob)?;
            return Ok(Self {
                vault,
                identity: config.identity(),
                status_log_path: config.status_log_path(),
            });
        }

        let root = args
            .vault
            .clone()
            .ok_or_else(|| AppError::Config("either --config or --vault is required".into()))?;
        let vault = Vault::open(root)?;
        let id = match agent_id {
            Some(id) => id,
            None => AgentId::new(DEFAULT_OPERATOR_ID)?,
        };
        let status_log_path = vault.root().join("Dashboard.md");
        Ok(Self {
            vault,
            identity: AgentIdentity::new(id, args.role.into()),
            status_log_path,
        })
    }

    fn lifecycle(&self) -> Lifecycle {
        let lifecycle = Lifecycle::new(
            self.vault.clone(),
            self.identity.clone(),
            Arc::new(RenameClaim),
            Arc::new(MarkdownStatusLog::new(self.status_log_path.clone())),
        );
        match JsonlAuditWriter::new(self.vault.logs_dir(), self.identity.id.clone()) {
            Ok(writer) => lifecycle.with_audit(Arc::new(writer)),
            Err(err) => {
                eprintln!("warning: audit log unavailable: {err}");
                lifecycle
            }
        }
    }

    fn locations(&self, name: QueueName) -> Result<Vec<Queue>> {
        match Queue::shared(name) {
            Some(queue) => Ok(vec![queue]),
            None => Ok(self
                .vault
                .in_progress_agents()?
                .into_iter()
                .map(Queue::InProgress)
                .collect()),
        }
    }
}

fn print_task_line(vault: &Vault, queue: &Queue, path: &std::path::Path) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let status = vault
        .read_task(path)
        .ok()
        .and_then(|record| record.status())
        .map_or_else(|| "-".to_owned(), |s| s.to_string());
    let modified = vault::modified_at(path)
        .map(|t| chrono::DateTime::<Utc>::from(t).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    println!("{:<24} {:<18} {modified}  {name}", queue.to_string(), status);
}

fn print_outcome(outcome: &TransitionOutcome, filename: &str) {
    match outcome {
        TransitionOutcome::Moved(path) => println!("{}", path.display()),
        TransitionOutcome::AlreadyClaimed => println!("already claimed: {filename}"),
    }
}
