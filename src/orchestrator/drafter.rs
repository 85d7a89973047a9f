//! Drafting: turning a claimed `Needs_Action` task into something a human
//! can approve.

use std::fs;
use std::io::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use tempfile::NamedTempFile;
use tracing::info;

use crate::models::{TaskKind, TaskRecord};
use crate::vault::Vault;
use crate::{AppError, Result};

/// Produces a draft from a held task.
///
/// Implementations edit `record` in memory; the caller persists it into
/// its own claim area and submits it for approval.
pub trait Drafter: Send + Sync {
    /// Draft `record`.
    ///
    /// # Errors
    ///
    /// Any error moves the task to `Rejected`.
    fn draft(&self, vault: &Vault, record: &mut TaskRecord, now: DateTime<Utc>) -> Result<()>;
}

/// Default drafter: writes a plan note to `Plans/` and appends suggested
/// actions to the task.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanDrafter;

impl PlanDrafter {
    /// Companion note file name.
    #[must_use]
    pub fn plan_filename(record: &TaskRecord, now: DateTime<Utc>) -> String {
        format!("PLAN_{}_{}.md", record.stem(), now.format("%Y%m%d_%H%M%S"))
    }
}

impl Drafter for PlanDrafter {
    fn draft(&self, vault: &Vault, record: &mut TaskRecord, now: DateTime<Utc>) -> Result<()> {
        let kind = record.kind()?;
        let (steps, actions) = suggestions(&kind);

        let plans = vault.plans_dir();
        fs::create_dir_all(&plans)?;
        let plan_path = plans.join(Self::plan_filename(record, now));

        let mut plan = format!(
            "---\ntype: plan\ntask: {}\ncreated: {}\nstatus: draft\n---\n\n# Plan for {}\n\n## Original Task\n\n",
            record.filename,
            now.to_rfc3339_opts(SecondsFormat::Secs, false),
            record.stem()
        );
        plan.push_str(record.body.trim());
        plan.push_str("\n\n## Processing Steps\n");
        for (n, step) in steps.iter().enumerate() {
            plan.push_str(&format!("{}. {step}\n", n + 1));
        }

        let mut tmp = NamedTempFile::new_in(&plans)
            .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
        tmp.write_all(plan.as_bytes())
            .map_err(|err| AppError::Io(format!("failed to write plan: {err}")))?;
        tmp.persist(&plan_path).map_err(|err| {
            AppError::Io(format!("failed to persist {}: {err}", plan_path.display()))
        })?;

        let lines: Vec<String> = actions.iter().map(|a| format!("- [ ] {a}")).collect();
        record.append_section("Suggested Actions", &lines);
        info!(task = %record.filename, plan = %plan_path.display(), "plan written");
        Ok(())
    }
}

fn suggestions(kind: &TaskKind) -> (Vec<&'static str>, Vec<&'static str>) {
    match kind {
        TaskKind::EmailDraft { .. } => (
            vec!["Check recipient and subject", "Review message body", "Route for approval"],
            vec!["Review draft", "Approve to send email"],
        ),
        TaskKind::SocialPost { .. } => (
            vec!["Check platform guidelines", "Review post content", "Route for approval"],
            vec!["Review post", "Approve to publish"],
        ),
        TaskKind::FileDrop { .. } => (
            vec!["Inspect attached file", "Decide on processing", "Route for approval"],
            vec!["Review file content", "Determine appropriate processing"],
        ),
        TaskKind::General { .. } | TaskKind::Unknown { .. } => (
            vec!["Read task description", "Prepare response", "Route for approval"],
            vec!["Review task", "Approve to execute"],
        ),
    }
}
