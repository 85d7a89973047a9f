//! Drop-folder watcher.
//!
//! Files written into the watched folder are copied to
//! `Attachments/FILE_<name>` and announced by a `file_drop` task
//! `FILE_<stem>.md` in `Inbox`. Watcher events only mark a file as busy;
//! it is ingested once no event has touched it for the settle delay.
//! An attachment of the same size as the source means the file was
//! already ingested, which makes re-scanning the folder idempotent. A
//! size mismatch refreshes the copy, and the task too while it is still
//! in `Inbox`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::models::{FrontMatter, Priority, Queue, TaskRecord, TaskStatus};
use crate::vault::Vault;
use crate::{AppError, Result};

const FILE_PREFIX: &str = "FILE_";
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);
const EVENT_BUFFER: usize = 256;

/// Watches a folder and turns dropped files into `Inbox` tasks.
pub struct DropFolderWatcher {
    vault: Vault,
    drop_folder: PathBuf,
    settle_delay: Duration,
    watcher: Option<RecommendedWatcher>,
}

impl DropFolderWatcher {
    /// Watcher for `drop_folder` writing into `vault`; not yet started.
    #[must_use]
    pub fn new(vault: Vault, drop_folder: PathBuf) -> Self {
        Self {
            vault,
            drop_folder,
            settle_delay: DEFAULT_SETTLE_DELAY,
            watcher: None,
        }
    }

    /// Quiet period a file must see before it is ingested.
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Folder being watched.
    #[must_use]
    pub fn drop_folder(&self) -> &Path {
        &self.drop_folder
    }

    /// Ingest files already present, then watch for new ones.
    ///
    /// Must be called from within a tokio runtime; the settle loop runs as
    /// a task on it. Watching stops when the returned value is dropped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if there is no runtime, or if the folder
    /// cannot be read or watched.
    pub fn start(mut self) -> Result<Self> {
        let span = info_span!("drop_folder_watcher", folder = %self.drop_folder.display());
        let _guard = span.enter();

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| AppError::Io(format!("drop folder watcher needs a tokio runtime: {err}")))?;

        let existing = self.scan()?;
        if !existing.is_empty() {
            info!(count = existing.len(), "ingested files present at startup");
        }

        let (tx, rx) = mpsc::channel::<PathBuf>(EVENT_BUFFER);
        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if !is_write_activity(&event) {
                        return;
                    }
                    for path in event.paths {
                        // The callback runs on the notify thread, outside the runtime.
                        if tx.blocking_send(path).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "file watcher error");
                }
            },
        )
        .map_err(|err| AppError::Io(format!("failed to create watcher: {err}")))?;

        watcher
            .watch(&self.drop_folder, RecursiveMode::NonRecursive)
            .map_err(|err| AppError::Io(format!("failed to watch directory: {err}")))?;

        runtime.spawn(settle_loop(self.vault.clone(), rx, self.settle_delay).instrument(span.clone()));
        info!(settle_ms = self.settle_delay.as_millis(), "watching drop folder");

        self.watcher = Some(watcher);
        Ok(self)
    }

    /// Ingest every regular file currently in the drop folder.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the folder cannot be read. Per-file
    /// failures are logged and skipped.
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.drop_folder).map_err(|err| {
            AppError::Io(format!("cannot read {}: {err}", self.drop_folder.display()))
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .collect();
        paths.sort();

        let mut created = Vec::new();
        for path in paths {
            match self.ingest(&path) {
                Ok(Some(task)) => created.push(task),
                Ok(None) => {}
                Err(err) => warn!(path = %path.display(), %err, "failed to ingest dropped file"),
            }
        }
        Ok(created)
    }

    /// Ingest one dropped file, returning the new task path.
    ///
    /// Returns `None` for directories, hidden files, and files that were
    /// already ingested. A file whose attachment copy differs in size is
    /// copied again and also returns `None`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the copy or task write fails.
    pub fn ingest(&self, source: &Path) -> Result<Option<PathBuf>> {
        ingest_file(&self.vault, source, Utc::now())
    }
}

/// Events that may mean a file's contents are still changing.
fn is_write_activity(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(_)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

/// Ingest each reported path once it has been quiet for `settle`.
async fn settle_loop(vault: Vault, mut rx: mpsc::Receiver<PathBuf>, settle: Duration) {
    let mut busy: HashMap<PathBuf, Instant> = HashMap::new();
    loop {
        let next_due = busy.values().min().copied();
        tokio::select! {
            received = rx.recv() => match received {
                Some(path) => {
                    busy.insert(path, Instant::now() + settle);
                }
                None => {
                    debug!(pending = busy.len(), "watcher dropped, settle loop exiting");
                    break;
                }
            },
            () = wait_until(next_due) => {
                let now = Instant::now();
                let ready: Vec<PathBuf> = busy
                    .iter()
                    .filter(|(_, due)| **due <= now)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in ready {
                    busy.remove(&path);
                    if let Err(err) = ingest_file(&vault, &path, Utc::now()) {
                        warn!(path = %path.display(), %err, "failed to ingest dropped file");
                    }
                }
            }
        }
    }
}

async fn wait_until(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

fn ingest_file(vault: &Vault, source: &Path, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
    let Some(name) = source.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(None);
    };
    if name.starts_with('.') || !source.is_file() {
        return Ok(None);
    }

    let metadata = fs::metadata(source)
        .map_err(|err| AppError::Io(format!("cannot stat {}: {err}", source.display())))?;
    let attachment = vault.attachments_dir().join(format!("{FILE_PREFIX}{name}"));
    let stem = Path::new(&name)
        .file_stem()
        .map_or_else(|| name.clone(), |s| s.to_string_lossy().into_owned());
    let filename = format!("{FILE_PREFIX}{stem}.md");

    if let Ok(copied) = fs::metadata(&attachment) {
        if copied.len() == metadata.len() {
            debug!(%name, "dropped file already ingested");
        } else {
            refresh_ingested(vault, source, &attachment, &filename, now)?;
        }
        return Ok(None);
    }
    if !vault.locate(&filename)?.is_empty() {
        debug!(%filename, "task for dropped file already exists");
        return Ok(None);
    }

    copy_attachment(vault, source, &attachment)?;
    let record = drop_record(&name, &filename, source, &attachment, &metadata, now);
    let path = match vault.create_task(&Queue::Inbox, &record) {
        Ok(path) => path,
        Err(AppError::Conflict(_)) => return Ok(None),
        Err(err) => return Err(err),
    };
    info!(file = %name, task = %path.display(), "dropped file ingested");
    Ok(Some(path))
}

/// Re-copy a file that changed after it was first ingested.
fn refresh_ingested(
    vault: &Vault,
    source: &Path,
    attachment: &Path,
    filename: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    copy_attachment(vault, source, attachment)?;
    let metadata = fs::metadata(source)
        .map_err(|err| AppError::Io(format!("cannot stat {}: {err}", source.display())))?;
    info!(file = %source.display(), size = metadata.len(), "attachment refreshed");

    if !vault.locate(filename)?.contains(&Queue::Inbox) {
        return Ok(());
    }
    let task = vault.task_path(&Queue::Inbox, filename)?;
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut record = drop_record(&name, filename, source, attachment, &metadata, now);
    if let Ok(previous) = vault.read_task(&task) {
        if let Some(created) = previous.front_matter.get("created") {
            record.front_matter.set("created", created);
        }
    }
    vault.rewrite_task(&task, &record)
}

fn copy_attachment(vault: &Vault, source: &Path, attachment: &Path) -> Result<()> {
    fs::create_dir_all(vault.attachments_dir())?;
    fs::copy(source, attachment).map_err(|err| {
        AppError::Io(format!(
            "cannot copy {} to {}: {err}",
            source.display(),
            attachment.display()
        ))
    })?;
    Ok(())
}

fn drop_record(
    name: &str,
    filename: &str,
    source: &Path,
    attachment: &Path,
    metadata: &fs::Metadata,
    now: DateTime<Utc>,
) -> TaskRecord {
    let size = metadata.len();
    let extension = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let modified = metadata
        .modified()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, false))
        .unwrap_or_default();

    let front_matter = FrontMatter::new()
        .with("type", "file_drop")
        .with("original_name", name)
        .with("size", size.to_string())
        .with("created", now.to_rfc3339_opts(SecondsFormat::Secs, false))
        .with("source", "drop_folder")
        .with("priority", Priority::Medium.as_str())
        .with("status", TaskStatus::New.as_str());
    let mut record = TaskRecord::new(filename.to_owned(), front_matter, String::new());
    record.append_section(
        "File Information",
        &[
            format!("- Original Location: {}", source.display()),
            format!("- Copied To: {}", attachment.display()),
            format!("- Size: {size} bytes"),
            format!("- Extension: {extension}"),
            format!("- Modified: {modified}"),
        ],
    );
    record.append_section(
        "Suggested Actions",
        &[
            "- [ ] Review file content".to_owned(),
            "- [ ] Determine appropriate processing".to_owned(),
        ],
    );

    record
}
