//! The vault: a directory tree whose folders are the lifecycle queues.
//!
//! Queue membership is defined purely by where a file physically sits.
//! There is no index; every query re-reads the directories.

pub mod claim;

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::models::{AgentId, Queue, QueueName, TaskRecord};
use crate::{AppError, Result};

/// Companion folder for processing notes; never occupied by a task.
pub const PLANS_DIR: &str = "Plans";
/// Folder for structured audit logs.
pub const LOGS_DIR: &str = "Logs";
/// Folder for generated weekly summaries.
pub const BRIEFINGS_DIR: &str = "Briefings";
/// Folder holding copies of files ingested from the drop folder.
pub const ATTACHMENTS_DIR: &str = "Attachments";

/// Default pattern selecting task files inside a queue.
pub const DEFAULT_TASK_GLOB: &str = "*.md";

/// Handle on a vault root.
#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
    task_glob: String,
}

impl Vault {
    /// Open an existing vault directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Vault` if `root` does not exist or is not a
    /// directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .map_err(|err| AppError::Vault(format!("vault root {}: {err}", root.display())))?;
        if !canonical.is_dir() {
            return Err(AppError::Vault(format!(
                "vault root {} is not a directory",
                canonical.display()
            )));
        }
        Ok(Self {
            root: canonical,
            task_glob: DEFAULT_TASK_GLOB.to_owned(),
        })
    }

    /// Restrict listings to files matching `pattern` (e.g. `*.md`).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the pattern is not a valid glob or
    /// tries to reach outside a single queue directory.
    pub fn with_task_glob(mut self, pattern: &str) -> Result<Self> {
        if pattern.contains('/') || pattern.contains('\\') {
            return Err(AppError::Config(format!(
                "task_glob '{pattern}' must match file names only"
            )));
        }
        glob::Pattern::new(pattern)
            .map_err(|err| AppError::Config(format!("invalid task_glob '{pattern}': {err}")))?;
        self.task_glob = pattern.to_owned();
        Ok(self)
    }

    /// Vault root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create every queue and companion folder that is missing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Vault` if a directory cannot be created.
    pub fn ensure_layout(&self) -> Result<()> {
        let dirs = QueueName::ALL
            .iter()
            .map(|q| q.dir_name())
            .chain([PLANS_DIR, LOGS_DIR, BRIEFINGS_DIR, ATTACHMENTS_DIR]);
        for dir in dirs {
            let path = self.root.join(dir);
            fs::create_dir_all(&path)
                .map_err(|err| AppError::Vault(format!("cannot create {}: {err}", path.display())))?;
        }
        Ok(())
    }

    /// Verify every queue folder exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Vault` naming the first missing queue.
    pub fn check_layout(&self) -> Result<()> {
        for queue in QueueName::ALL {
            let path = self.root.join(queue.dir_name());
            if !path.is_dir() {
                return Err(AppError::Vault(format!(
                    "queue directory {} is missing",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Directory backing a queue location.
    #[must_use]
    pub fn queue_dir(&self, queue: &Queue) -> PathBuf {
        let base = self.root.join(queue.name().dir_name());
        match queue {
            Queue::InProgress(agent) => base.join(agent.as_str()),
            _ => base,
        }
    }

    /// `Plans/`
    #[must_use]
    pub fn plans_dir(&self) -> PathBuf {
        self.root.join(PLANS_DIR)
    }

    /// `Logs/`
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// `Briefings/`
    #[must_use]
    pub fn briefings_dir(&self) -> PathBuf {
        self.root.join(BRIEFINGS_DIR)
    }

    /// `Attachments/`
    #[must_use]
    pub fn attachments_dir(&self) -> PathBuf {
        self.root.join(ATTACHMENTS_DIR)
    }

    /// Path of `filename` inside `queue`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::TaskFormat` if `filename` is not a bare file name.
    pub fn task_path(&self, queue: &Queue, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        Ok(self.queue_dir(queue).join(filename))
    }

    /// Task files currently in `queue`, sorted by name.
    ///
    /// A missing claim area is an empty queue; a missing shared queue is a
    /// vault failure.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Vault` if a shared queue directory is missing or
    /// unreadable.
    pub fn list(&self, queue: &Queue) -> Result<Vec<PathBuf>> {
        let dir = self.queue_dir(queue);
        if !dir.is_dir() {
            if matches!(queue, Queue::InProgress(_)) {
                return Ok(Vec::new());
            }
            return Err(AppError::Vault(format!(
                "queue directory {} is missing",
                dir.display()
            )));
        }

        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&dir.to_string_lossy()),
            self.task_glob
        );
        let entries = glob::glob(&pattern)
            .map_err(|err| AppError::Vault(format!("bad listing pattern {pattern}: {err}")))?;

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                // An entry that vanishes mid-listing was claimed by someone else.
                Err(err) => debug!(%err, "skipping unreadable queue entry"),
            }
        }
        files.sort();
        Ok(files)
    }

    /// Agents that currently own a claim area.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Vault` if `In_Progress/` cannot be read.
    pub fn in_progress_agents(&self) -> Result<Vec<AgentId>> {
        let dir = self.root.join(QueueName::InProgress.dir_name());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AppError::Vault(format!("cannot read {}: {err}", dir.display())))
            }
        };

        let mut agents = Vec::new();
        for entry in entries.filter_map(std::result::Result::ok) {
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match AgentId::new(name.clone()) {
                Ok(agent) => agents.push(agent),
                Err(_) => warn!(dir = %name, "ignoring claim area with invalid agent name"),
            }
        }
        agents.sort();
        Ok(agents)
    }

    /// Every location currently holding `filename`.
    ///
    /// More than one entry means the single-membership invariant is broken.
    ///
    /// # Errors
    ///
    /// Returns `AppError::TaskFormat` for an invalid file name and
    /// `AppError::Vault` if `In_Progress/` cannot be read.
    pub fn locate(&self, filename: &str) -> Result<Vec<Queue>> {
        validate_filename(filename)?;
        let mut found = Vec::new();
        for name in QueueName::ALL {
            if let Some(queue) = Queue::shared(name) {
                if self.queue_dir(&queue).join(filename).is_file() {
                    found.push(queue);
                }
            }
        }
        for agent in self.in_progress_agents()? {
            let queue = Queue::InProgress(agent);
            if self.queue_dir(&queue).join(filename).is_file() {
                found.push(queue);
            }
        }
        Ok(found)
    }

    /// The single location holding `filename`, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` if the file is present in more than one
    /// queue.
    pub fn check_unique(&self, filename: &str) -> Result<Option<Queue>> {
        let mut found = self.locate(filename)?;
        if found.len() > 1 {
            let places: Vec<String> = found.iter().map(ToString::to_string).collect();
            return Err(AppError::Conflict(format!(
                "{filename} present in {}",
                places.join(", ")
            )));
        }
        Ok(found.pop())
    }

    /// Read and parse a task file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the file is gone, `AppError::Io` if
    /// it cannot be read, and `AppError::TaskFormat` if it does not parse.
    pub fn read_task(&self, path: &Path) -> Result<TaskRecord> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::TaskFormat(format!("{} has no file name", path.display())))?;
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!("{}", path.display())))
            }
            Err(err) => {
                return Err(AppError::Io(format!("cannot read {}: {err}", path.display())))
            }
        };
        TaskRecord::parse(filename, &text)
    }

    /// Replace the contents of an existing task file atomically.
    ///
    /// Only safe for files in the caller's own claim area: in a shared
    /// queue a concurrent claim could move the file away and this write
    /// would resurrect it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the temporary file cannot be written or
    /// persisted.
    pub fn rewrite_task(&self, path: &Path, record: &TaskRecord) -> Result<()> {
        let tmp = write_temp_beside(path, &record.render())?;
        tmp.persist(path)
            .map_err(|err| AppError::Io(format!("cannot persist {}: {err}", path.display())))?;
        Ok(())
    }

    /// Create a new task file in `queue`, refusing to overwrite.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` if the file name already exists in the
    /// queue, and `AppError::Io` on write failure.
    pub fn create_task(&self, queue: &Queue, record: &TaskRecord) -> Result<PathBuf> {
        let path = self.task_path(queue, &record.filename)?;
        let dir = self.queue_dir(queue);
        fs::create_dir_all(&dir)
            .map_err(|err| AppError::Io(format!("cannot create {}: {err}", dir.display())))?;
        let tmp = write_temp_beside(&path, &record.render())?;
        tmp.persist_noclobber(&path).map_err(|err| {
            if err.error.kind() == ErrorKind::AlreadyExists {
                AppError::Conflict(format!("{} already exists", path.display()))
            } else {
                AppError::Io(format!("cannot persist {}: {err}", path.display()))
            }
        })?;
        Ok(path)
    }

    /// Number of task files per queue; `in_progress` sums every agent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Vault` if a queue cannot be listed.
    pub fn counts(&self) -> Result<BTreeMap<QueueName, usize>> {
        let mut counts = BTreeMap::new();
        for name in QueueName::ALL {
            let count = match Queue::shared(name) {
                Some(queue) => self.list(&queue)?.len(),
                None => {
                    let mut total = 0;
                    for agent in self.in_progress_agents()? {
                        total += self.list(&Queue::InProgress(agent))?.len();
                    }
                    total
                }
            };
            counts.insert(name, count);
        }
        Ok(counts)
    }
}

/// Last modification time of a file.
///
/// # Errors
///
/// Returns `AppError::Io` if metadata cannot be read.
pub fn modified_at(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|err| AppError::Io(format!("cannot stat {}: {err}", path.display())))
}

/// Time a file last entered its current directory, as far as the platform
/// can tell.
///
/// A rename keeps the modification time but refreshes the inode change
/// time, so on Unix this is the later of the two. Elsewhere it falls back
/// to the modification time.
///
/// # Errors
///
/// Returns `AppError::Io` if metadata cannot be read.
pub fn changed_at(path: &Path) -> Result<SystemTime> {
    let meta = fs::metadata(path)
        .map_err(|err| AppError::Io(format!("cannot stat {}: {err}", path.display())))?;
    let modified = meta
        .modified()
        .map_err(|err| AppError::Io(format!("cannot stat {}: {err}", path.display())))?;
    Ok(inode_changed(&meta).map_or(modified, |changed| changed.max(modified)))
}

#[cfg(unix)]
fn inode_changed(meta: &fs::Metadata) -> Option<SystemTime> {
    use std::os::unix::fs::MetadataExt;

    let secs = u64::try_from(meta.ctime()).ok()?;
    let nanos = u32::try_from(meta.ctime_nsec()).ok()?;
    SystemTime::UNIX_EPOCH.checked_add(std::time::Duration::new(secs, nanos))
}

#[cfg(not(unix))]
fn inode_changed(_meta: &fs::Metadata) -> Option<SystemTime> {
    None
}

/// Reject anything that is not a plain, visible file name.
///
/// # Errors
///
/// Returns `AppError::TaskFormat` for empty names, hidden files, and names
/// containing path separators or traversal components.
pub fn validate_filename(filename: &str) -> Result<()> {
    let mut components = Path::new(filename).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if filename.is_empty()
        || !single_normal
        || filename.starts_with('.')
        || filename.contains(['/', '\\'])
    {
        return Err(AppError::TaskFormat(format!(
            "'{filename}' is not a valid task file name"
        )));
    }
    Ok(())
}

fn write_temp_beside(path: &Path, content: &str) -> Result<NamedTempFile> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Io(format!("{} has no parent directory", path.display())))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
    tmp.write_all(content.as_bytes())
        .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;
    Ok(tmp)
}
