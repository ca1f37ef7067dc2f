//! Working directory preparation
//!
//! Cleanup is best-effort: a directory that cannot be cleared is logged and
//! recorded in the [`CleanReport`], and the remaining directories are still
//! processed.

use crate::error::{HarnessError, HarnessResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A directory entry that could not be created or removed
#[derive(Debug)]
pub struct CleanFailure {
    /// Path that failed
    pub path: PathBuf,
    /// Underlying error
    pub error: io::Error,
}

/// Outcome of [`clean_dirs`]
#[derive(Debug, Default)]
pub struct CleanReport {
    /// Directories that did not exist and were created
    pub created: Vec<PathBuf>,
    /// Directories that existed and were emptied
    pub cleared: Vec<PathBuf>,
    /// Entries that could not be handled
    pub failures: Vec<CleanFailure>,
}

impl CleanReport {
    /// True when every directory was prepared without error
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn recorded failures into an error
    pub fn into_result(self) -> HarnessResult<Self> {
        if let Some(first) = self.failures.first() {
            return Err(HarnessError::config(format!(
                "failed to clean {} path(s), first: {}: {}",
                self.failures.len(),
                first.path.display(),
                first.error
            )));
        }
        Ok(self)
    }
}

/// Ensure every directory exists and is empty
pub fn clean_dirs<P: AsRef<Path>>(dirs: &[P]) -> CleanReport {
    let mut report = CleanReport::default();

    for dir in dirs {
        let dir = dir.as_ref();
        if dir.is_dir() {
            let before = report.failures.len();
            clear_dir(dir, &mut report.failures);
            if report.failures.len() == before {
                debug!(dir = %dir.display(), "cleared directory");
                report.cleared.push(dir.to_path_buf());
            }
        } else {
            match fs::create_dir_all(dir) {
                Ok(()) => {
                    debug!(dir = %dir.display(), "created directory");
                    report.created.push(dir.to_path_buf());
                }
                Err(error) => {
                    warn!(dir = %dir.display(), %error, "failed to create directory");
                    report.failures.push(CleanFailure {
                        path: dir.to_path_buf(),
                        error,
                    });
                }
            }
        }
    }

    report
}

fn clear_dir(dir: &Path, failures: &mut Vec<CleanFailure>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(dir = %dir.display(), %error, "failed to read directory");
            failures.push(CleanFailure {
                path: dir.to_path_buf(),
                error,
            });
            return;
        }
    };

    for entry in entries {
        let result = entry.and_then(|entry| {
            let path = entry.path();
            // Symlinks are removed, never followed.
            let removed = if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))
        });

        if let Err(error) = result {
            warn!(dir = %dir.display(), %error, "failed to remove entry");
            failures.push(CleanFailure {
                path: dir.to_path_buf(),
                error,
            });
        }
    }
}
