//! Claim-by-move: atomic rename as the only mutual-exclusion primitive.
//!
//! A rename within one local filesystem is observed by every process as a
//! single event, so of N agents renaming the same source at once exactly
//! one succeeds and the rest see the source vanish. The guarantee does not
//! hold across distinct network mounts or if the platform falls back to
//! copy+delete; [`ClaimStrategy`] exists so a conditional-write backend can
//! replace [`RenameClaim`] without touching the lifecycle.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{AppError, Result};

/// Result of a relocation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The file now lives at this path and nowhere else.
    Moved(PathBuf),
    /// The source was gone: another agent moved it first.
    Vanished,
}

/// Exclusive relocation of a task file into a directory.
pub trait ClaimStrategy: Send + Sync {
    /// Move `source` into `dest_dir`, keeping its file name.
    ///
    /// At most one concurrent caller may receive [`MoveOutcome::Moved`] for
    /// a given source; the others must receive [`MoveOutcome::Vanished`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` if `dest_dir` already holds a file of
    /// the same name while `source` still exists, and `AppError::Io` for
    /// any other filesystem failure.
    fn relocate(&self, source: &Path, dest_dir: &Path) -> Result<MoveOutcome>;
}

/// [`ClaimStrategy`] backed by `std::fs::rename`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenameClaim;

impl ClaimStrategy for RenameClaim {
    fn relocate(&self, source: &Path, dest_dir: &Path) -> Result<MoveOutcome> {
        let file_name = source
            .file_name()
            .ok_or_else(|| AppError::Io(format!("{} has no file name", source.display())))?;

        fs::create_dir_all(dest_dir).map_err(|err| {
            AppError::Io(format!("cannot create {}: {err}", dest_dir.display()))
        })?;

        let dest = dest_dir.join(file_name);
        // rename(2) silently replaces an existing destination, which would
        // merge two tasks into one identity. A destination without a source
        // is the move that already happened, not a collision.
        if dest.exists() {
            if !source.exists() {
                debug!(from = %source.display(), to = %dest.display(), "already relocated");
                return Ok(MoveOutcome::Vanished);
            }
            return Err(AppError::Conflict(format!(
                "{} already exists",
                dest.display()
            )));
        }

        match fs::rename(source, &dest) {
            Ok(()) => {
                debug!(from = %source.display(), to = %dest.display(), "relocated");
                Ok(MoveOutcome::Moved(dest))
            }
            Err(err) if err.kind() == ErrorKind::NotFound && !source.exists() => {
                debug!(from = %source.display(), "source vanished before rename");
                Ok(MoveOutcome::Vanished)
            }
            Err(err) => Err(AppError::Io(format!(
                "rename {} -> {}: {err}",
                source.display(),
                dest.display()
            ))),
        }
    }
}
