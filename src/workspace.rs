//! Scratch directories, unique publication of artifacts, and stale-file sweeping.
//!
//! Every job gets its own scratch directory (a [`tempfile::TempDir`]) that is
//! removed when the job ends, whatever the outcome. Backends write inside it,
//! so concurrent jobs never share an output path. The accepted artifact is
//! then moved into the output directory under a fresh name that cannot
//! collide with any other job's.

use crate::error::ConvertError;
use crate::format::DocumentFormat;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Per-job scratch space. Deleted recursively on drop.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    /// Create a fresh scratch directory under `work_root`.
    pub async fn create(work_root: &Path) -> Result<Self, ConvertError> {
        let root = work_root.to_path_buf();
        blocking(move || Self::create_in(&root)).await
    }

    fn create_in(work_root: &Path) -> Result<Self, ConvertError> {
        std::fs::create_dir_all(work_root).map_err(|source| ConvertError::Workspace {
            path: work_root.to_path_buf(),
            source,
        })?;
        let dir = tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(work_root)
            .map_err(|source| ConvertError::Workspace {
                path: work_root.to_path_buf(),
                source,
            })?;
        debug!("Job workspace: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Move a validated artifact into `output_dir` as `<stem>-XXXXXXXX.<ext>`.
///
/// The name is reserved atomically before the move, so two jobs converting
/// files with the same stem never overwrite each other. Falls back to a copy
/// when the scratch directory lives on another filesystem.
pub async fn publish(
    artifact: &Path,
    output_dir: &Path,
    stem: &str,
    format: DocumentFormat,
) -> Result<PathBuf, ConvertError> {
    let artifact = artifact.to_path_buf();
    let output_dir = output_dir.to_path_buf();
    let stem = stem.to_string();
    blocking(move || publish_in(&artifact, &output_dir, &stem, format)).await
}

fn publish_in(
    artifact: &Path,
    output_dir: &Path,
    stem: &str,
    format: DocumentFormat,
) -> Result<PathBuf, ConvertError> {
    let workspace_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ConvertError::Workspace { path, source }
    };

    std::fs::create_dir_all(output_dir).map_err(workspace_err(output_dir))?;

    let prefix = format!("{stem}-");
    let suffix = format!(".{}", format.extension());
    let reserved = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .rand_bytes(8)
        .tempfile_in(output_dir)
        .map_err(workspace_err(output_dir))?
        .into_temp_path();

    // Early returns drop `reserved`, deleting the reservation.
    if let Err(e) = std::fs::rename(artifact, &reserved) {
        debug!("rename failed ({}), copying instead", e);
        std::fs::copy(artifact, &reserved).map_err(workspace_err(&*reserved))?;
        if let Err(e) = std::fs::remove_file(artifact) {
            warn!("could not remove '{}': {}", artifact.display(), e);
        }
    }

    reserved
        .keep()
        .map_err(|e| ConvertError::Workspace {
            path: output_dir.to_path_buf(),
            source: e.error,
        })
}

/// Run filesystem work off the async worker threads.
async fn blocking<T, F>(f: F) -> Result<T, ConvertError>
where
    F: FnOnce() -> Result<T, ConvertError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConvertError::Internal(format!("workspace task failed: {e}")))?
}

/// Delete regular files in `dir` (not recursive) whose modification time is
/// older than `max_age`. Returns how many were removed.
///
/// Directories are left alone, so in-flight job scratch space under the
/// output directory is never touched.
pub fn sweep_stale(dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("skipping '{}': {}", entry.path().display(), e);
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::now());
        if modified < cutoff {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("swept {}", entry.path().display());
                    removed += 1;
                }
                Err(e) => warn!("could not sweep '{}': {}", entry.path().display(), e),
            }
        }
    }
    Ok(removed)
}
