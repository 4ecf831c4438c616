//! Job-scoped file deletion and disk accounting.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{info, warn};

use crate::error::{MediaError, MediaResult};

/// Disk occupancy of the filesystem holding the result directory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub percent: f64,
}

/// File store rooted at the service's working directories.
///
/// The registry delegates all file deletion here; upload saving lives in the
/// request layer and is not part of this crate.
#[derive(Debug, Clone)]
pub struct FileStore {
    upload_dir: PathBuf,
    temp_dir: PathBuf,
    result_dir: PathBuf,
}

impl FileStore {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
        result_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            temp_dir: temp_dir.into(),
            result_dir: result_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }

    /// Create the working directories if missing.
    pub async fn ensure_dirs(&self) -> MediaResult<()> {
        for dir in [&self.upload_dir, &self.temp_dir, &self.result_dir] {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Delete a single file. Returns whether a file was actually removed;
    /// failures are logged, never raised.
    pub async fn delete_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match fs::remove_file(path).await {
            Ok(()) => {
                info!("Deleted file: {}", path.display());
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!("Failed to delete file {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Delete every file belonging to a job: the explicitly listed paths,
    /// then, when `sweep_temp` is set, any leftover temp entries whose name
    /// starts with the job id. Callers preserving intermediates must skip
    /// the sweep, since those live under the same job-id prefix.
    /// Returns the number of entries removed.
    pub async fn delete_job_files(
        &self,
        job_id: &str,
        paths: &[PathBuf],
        sweep_temp: bool,
    ) -> usize {
        let mut deleted = 0;

        for path in paths {
            if self.delete_file(path).await {
                deleted += 1;
            }
        }

        if !sweep_temp {
            info!("Deleted {} files for job {}", deleted, job_id);
            return deleted;
        }

        // Sweep temp leftovers by job-id prefix (partial stage outputs,
        // scratch directories written by the tools).
        if let Ok(mut entries) = fs::read_dir(&self.temp_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if !name.starts_with(job_id) {
                    continue;
                }
                let path = entry.path();
                let removed = if path.is_dir() {
                    fs::remove_dir_all(&path).await.is_ok()
                } else {
                    fs::remove_file(&path).await.is_ok()
                };
                if removed {
                    info!("Deleted temp entry: {}", path.display());
                    deleted += 1;
                } else {
                    warn!("Failed to delete temp entry: {}", path.display());
                }
            }
        }

        info!("Deleted {} files for job {}", deleted, job_id);
        deleted
    }

    /// Disk occupancy of the filesystem backing the result directory.
    pub fn disk_usage(&self) -> MediaResult<DiskUsage> {
        let stat = nix::sys::statvfs::statvfs(&self.result_dir)
            .map_err(|e| MediaError::internal(format!("statvfs failed: {}", e)))?;

        let total = stat.blocks() as u64 * stat.fragment_size() as u64;
        let free = stat.blocks_available() as u64 * stat.fragment_size() as u64;
        let used = total.saturating_sub(free);
        let percent = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(DiskUsage {
            total,
            used,
            percent,
        })
    }
}

/// Age-based removal of leftover entries under a shared tool directory.
///
/// The tracker writes into a directory shared by all jobs, and its leftovers
/// (render previews, scratch subdirectories) are not tied to any job record,
/// so the retention sweep ages them out by modification time. Best effort:
/// unreadable or busy entries are skipped.
pub async fn sweep_stale_entries(dir: impl AsRef<Path>, older_than: Duration) -> usize {
    let dir = dir.as_ref();
    let Some(cutoff) = SystemTime::now().checked_sub(older_than) else {
        return 0;
    };

    let Ok(mut entries) = fs::read_dir(dir).await else {
        return 0;
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        let Ok(modified) = meta.modified() else {
            continue;
        };
        if modified > cutoff {
            continue;
        }
        let path = entry.path();
        let ok = if meta.is_dir() {
            fs::remove_dir_all(&path).await.is_ok()
        } else {
            fs::remove_file(&path).await.is_ok()
        };
        if ok {
            info!("Removed stale entry: {}", path.display());
            removed += 1;
        } else {
            warn!("Failed to remove stale entry: {}", path.display());
        }
    }

    if removed > 0 {
        info!("Swept {} stale entries from {}", removed, dir.display());
    }
    removed
}
